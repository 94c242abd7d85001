//! Property checks for tier contents.
//!
//! Each check inspects the simulated tiers directly and returns the
//! violations it finds, so a scenario can report all of them at once.

use tierset_tier::{KeyPair, SimulatedTier, Tier};

// ============================================================================
// Property Violation Types
// ============================================================================

/// A tier holding something other than what a scenario expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// The object should be in the tier but is not.
    Missing {
        /// Tier that was checked.
        tier: Tier,
        /// Key that was checked.
        key: String,
    },
    /// The tier holds different bytes than expected.
    ContentMismatch {
        /// Tier that was checked.
        tier: Tier,
        /// Key that was checked.
        key: String,
        /// Expected length.
        expected_len: usize,
        /// Stored length.
        actual_len: usize,
    },
    /// The object should not be in the tier but is.
    Unexpected {
        /// Tier that was checked.
        tier: Tier,
        /// Key that was checked.
        key: String,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { tier, key } => write!(f, "{tier} tier is missing '{key}'"),
            Self::ContentMismatch {
                tier,
                key,
                expected_len,
                actual_len,
            } => write!(
                f,
                "{tier} tier holds different bytes for '{key}' \
                 (expected {expected_len} bytes, found {actual_len})"
            ),
            Self::Unexpected { tier, key } => {
                write!(f, "{tier} tier unexpectedly holds '{key}'")
            }
        }
    }
}

// ============================================================================
// Checks
// ============================================================================

/// The two simulated tiers behind a store under test.
#[derive(Debug, Clone)]
pub struct TierPair {
    /// Cache tier handle.
    pub cache: SimulatedTier,
    /// Permanent tier handle.
    pub permanent: SimulatedTier,
}

impl TierPair {
    /// Returns the handle for `tier`.
    #[must_use]
    pub const fn tier(&self, tier: Tier) -> &SimulatedTier {
        match tier {
            Tier::Cache => &self.cache,
            Tier::Permanent => &self.permanent,
        }
    }

    /// Checks that `tier` holds exactly `expected` under its key.
    #[must_use]
    pub fn check_holds(
        &self,
        tier: Tier,
        keys: &KeyPair,
        expected: &[u8],
    ) -> Vec<PropertyViolation> {
        let key = keys.for_tier(tier);
        match self.tier(tier).get_raw_content(key) {
            None => vec![PropertyViolation::Missing {
                tier,
                key: key.to_string(),
            }],
            Some(actual) if actual != expected => vec![PropertyViolation::ContentMismatch {
                tier,
                key: key.to_string(),
                expected_len: expected.len(),
                actual_len: actual.len(),
            }],
            Some(_) => Vec::new(),
        }
    }

    /// Checks that `tier` holds nothing under its key.
    #[must_use]
    pub fn check_absent(&self, tier: Tier, keys: &KeyPair) -> Vec<PropertyViolation> {
        let key = keys.for_tier(tier);
        if self.tier(tier).get_raw_content(key).is_some() {
            vec![PropertyViolation::Unexpected {
                tier,
                key: key.to_string(),
            }]
        } else {
            Vec::new()
        }
    }

    /// Checks that both tiers hold exactly `expected`.
    #[must_use]
    pub fn check_both_hold(&self, keys: &KeyPair, expected: &[u8]) -> Vec<PropertyViolation> {
        let mut violations = self.check_holds(Tier::Permanent, keys, expected);
        violations.extend(self.check_holds(Tier::Cache, keys, expected));
        violations
    }

    /// Checks that neither tier holds the object.
    #[must_use]
    pub fn check_neither_holds(&self, keys: &KeyPair) -> Vec<PropertyViolation> {
        let mut violations = self.check_absent(Tier::Permanent, keys);
        violations.extend(self.check_absent(Tier::Cache, keys));
        violations
    }
}

/// Panics with every violation listed if there are any.
///
/// # Panics
///
/// Panics if `violations` is not empty.
pub fn assert_no_violations(violations: &[PropertyViolation]) {
    assert!(
        violations.is_empty(),
        "property violations:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_reported() {
        let pair = TierPair {
            cache: SimulatedTier::new(1),
            permanent: SimulatedTier::new(2),
        };
        let keys = KeyPair::same("object");
        pair.permanent.set_raw_content(&keys.permanent, vec![1u8, 2, 3]);

        let violations = pair.check_both_hold(&keys, &[1, 2]);
        assert_eq!(
            violations,
            vec![
                PropertyViolation::ContentMismatch {
                    tier: Tier::Permanent,
                    key: "object".to_string(),
                    expected_len: 2,
                    actual_len: 3,
                },
                PropertyViolation::Missing {
                    tier: Tier::Cache,
                    key: "object".to_string(),
                },
            ]
        );
        assert_eq!(
            pair.check_neither_holds(&keys),
            vec![PropertyViolation::Unexpected {
                tier: Tier::Permanent,
                key: "object".to_string(),
            }]
        );
    }
}
