use crate::experiment::{AbTest, TestStatus, Variant};
use anyhow::Result;
use async_trait::async_trait;

/// Storage collaborator for tests and their counters.
///
/// Implementations own read-modify-write atomicity: each increment must be a
/// single atomic operation, and lifecycle writes are compare-and-swap on status.
#[async_trait]
pub trait TestStore: Send + Sync {
    /// Persists a new test with all of its arms. Fails if the id is taken.
    async fn insert_test(&self, test: &AbTest) -> Result<()>;

    async fn get_test(&self, test_id: &str) -> Result<Option<AbTest>>;

    /// Lists tests, newest first, optionally filtered by status.
    async fn list_tests(&self, status: Option<TestStatus>) -> Result<Vec<AbTest>>;

    /// Writes status, timestamps and conclusion fields of `test` if the stored
    /// status still equals `expected`. Counters are never overwritten.
    ///
    /// Returns `false` when the stored status changed underneath the caller.
    async fn update_lifecycle(&self, test: &AbTest, expected: TestStatus) -> Result<bool>;

    /// Adds one impression to a running test's arm and returns the updated arm.
    ///
    /// Returns `None` when nothing matched: unknown test or arm, or test not running.
    async fn increment_impressions(&self, test_id: &str, arm_id: &str) -> Result<Option<Variant>>;

    /// Adds one conversion to a running test's arm if that keeps
    /// `conversions <= impressions`, and returns the updated arm.
    ///
    /// Returns `None` when nothing matched or the guard rejected the increment.
    async fn increment_conversions(&self, test_id: &str, arm_id: &str) -> Result<Option<Variant>>;
}
