use crate::experiment::TestStatus;
use thiserror::Error;

/// Errors surfaced by the A/B testing engine.
#[derive(Error, Debug)]
pub enum AbTestError {
    /// Malformed test definition: bad traffic split, fewer than 2 arms, missing control.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Lifecycle operation not allowed from the test's current status. No state was mutated.
    #[error("cannot {action} test {test_id} while it is {from}")]
    InvalidStateTransition {
        test_id: String,
        from: TestStatus,
        action: &'static str,
    },

    /// The referenced test, or arm within it, does not exist.
    #[error("unknown test {test_id}{}", arm_id.as_ref().map(|a| format!(" or arm {a}")).unwrap_or_default())]
    UnknownTestOrArm {
        test_id: String,
        arm_id: Option<String>,
    },

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AbTestError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub(crate) fn unknown_test(test_id: &str) -> Self {
        Self::UnknownTestOrArm {
            test_id: test_id.to_string(),
            arm_id: None,
        }
    }
}
