use crate::experiment::{TestStatus, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of tracked visitor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Impression,
    Conversion,
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Conversion => "conversion",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an event was dropped without touching any counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IgnoreReason {
    UnknownTest,
    UnknownArm,
    NotRunning { test_status: TestStatus },
    /// Conversion with no unconverted impression left on the arm.
    ConversionWithoutImpression,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTest => f.write_str("unknown test"),
            Self::UnknownArm => f.write_str("unknown arm"),
            Self::NotRunning { test_status } => write!(f, "test is {test_status}"),
            Self::ConversionWithoutImpression => {
                f.write_str("conversion without a matching impression")
            }
        }
    }
}

/// Result of an event recording call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded { variant: Variant },
    Ignored(IgnoreReason),
}

impl RecordOutcome {
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ignored_outcome_serializes_flat() {
        let outcome = RecordOutcome::Ignored(IgnoreReason::NotRunning {
            test_status: TestStatus::Paused,
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({ "status": "ignored", "reason": "not_running", "test_status": "paused" })
        );
        assert!(!outcome.is_recorded());
    }

    #[test]
    fn recorded_outcome_carries_variant() {
        let outcome = RecordOutcome::Recorded {
            variant: Variant::new("B", serde_json::Value::Null),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "recorded");
        assert_eq!(value["variant"]["arm_id"], "B");
        assert!(outcome.is_recorded());
    }

    #[test]
    fn reason_display_is_readable() {
        assert_eq!(
            IgnoreReason::NotRunning {
                test_status: TestStatus::Completed
            }
            .to_string(),
            "test is completed"
        );
    }
}
