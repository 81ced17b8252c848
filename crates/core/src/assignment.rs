//! Deterministic visitor bucketing.
//!
//! The same `(test_id, visitor_id)` pair always lands in the same arm, so a
//! returning visitor keeps seeing the same experience for the lifetime of a test.

use crate::error::AbTestError;
use crate::experiment::TrafficSplit;
use sha2::{Digest, Sha256};

/// Stable percentile in `0..100` for a visitor within a test.
#[must_use]
pub fn bucket(test_id: &str, visitor_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(visitor_id.as_bytes());
    hasher.update(b":");
    hasher.update(test_id.as_bytes());
    let hash = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash[..8]);
    u64::from_be_bytes(prefix) % 100
}

/// Assigns a visitor to an arm of the traffic split.
///
/// Walks the split in order, accumulating weights until the cumulative weight
/// exceeds the visitor's percentile. Falls back to the first arm when rounding
/// leaves the percentile uncovered.
///
/// # Errors
/// Returns `InvalidConfiguration` if the split is empty.
///
/// # Examples
/// ```
/// use autoani_core::assignment::assign;
/// use autoani_core::TrafficSplit;
///
/// let split = TrafficSplit::from_pairs([("A", 50.0), ("B", 50.0)]);
/// let first = assign("hero-banner", "visitor-42", &split).unwrap();
/// let again = assign("hero-banner", "visitor-42", &split).unwrap();
/// assert_eq!(first, again);
/// ```
pub fn assign(
    test_id: &str,
    visitor_id: &str,
    traffic_split: &TrafficSplit,
) -> Result<String, AbTestError> {
    let first = traffic_split.weights().first().ok_or_else(|| {
        AbTestError::InvalidConfiguration(format!("test {test_id} has an empty traffic split"))
    })?;

    let percentile = bucket(test_id, visitor_id) as f64;
    let mut cumulative = 0.0;
    for weight in traffic_split.weights() {
        cumulative += weight.percentage;
        if cumulative > percentile {
            return Ok(weight.arm_id.clone());
        }
    }

    Ok(first.arm_id.clone())
}
