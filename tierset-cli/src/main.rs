//! Tierset binary.
//!
//! # Put
//!
//! Upload a local file to both tiers:
//!
//! ```bash
//! tierset put --file report.csv --permanent-bucket archive --cache-bucket hot \
//!     --cache-endpoint http://cache.local:9000 --cache-path-style --cache-key reports/report.csv
//! ```
//!
//! # Get
//!
//! Download through the cache, warming it on a miss:
//!
//! ```bash
//! tierset get --config tiers.json --file report.csv --cache-key reports/report.csv
//! ```
//!
//! # Local Tiers
//!
//! A `file:///dir` endpoint stores objects under `dir/<bucket>`:
//!
//! ```bash
//! tierset put --file report.csv --cache-endpoint file:///tmp/tiers --cache-bucket hot \
//!     --permanent-endpoint file:///tmp/tiers --permanent-bucket archive --cache-key report.csv
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use clap::Parser;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

use tierset_cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Err(e) = tierset_cli::run(cli.command).await {
        error!(error = %e, "Command failed");
        return Err(e.into());
    }

    Ok(())
}
