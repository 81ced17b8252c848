use crate::experiment::{AbTest, TestStatus, Variant};
use crate::traits::TestStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local [`TestStore`] backed by a locked map.
///
/// Every mutation happens inside one write-lock section, which gives the
/// same atomicity the database store gets from single-statement updates.
#[derive(Clone, Default)]
pub struct InMemoryTestStore {
    tests: Arc<RwLock<HashMap<String, AbTest>>>,
}

impl InMemoryTestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn increment<F>(&self, test_id: &str, arm_id: &str, apply: F) -> Option<Variant>
    where
        F: FnOnce(&mut Variant) -> bool,
    {
        let mut tests = self.tests.write().await;
        let test = tests.get_mut(test_id)?;
        if test.status != TestStatus::Running {
            return None;
        }
        let variant = test.variants.iter_mut().find(|v| v.arm_id == arm_id)?;
        if apply(variant) {
            Some(variant.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl TestStore for InMemoryTestStore {
    async fn insert_test(&self, test: &AbTest) -> Result<()> {
        let mut tests = self.tests.write().await;
        if tests.contains_key(&test.id) {
            bail!("test {} already exists", test.id);
        }
        tests.insert(test.id.clone(), test.clone());
        Ok(())
    }

    async fn get_test(&self, test_id: &str) -> Result<Option<AbTest>> {
        Ok(self.tests.read().await.get(test_id).cloned())
    }

    async fn list_tests(&self, status: Option<TestStatus>) -> Result<Vec<AbTest>> {
        let mut tests: Vec<AbTest> = self
            .tests
            .read()
            .await
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tests)
    }

    async fn update_lifecycle(&self, test: &AbTest, expected: TestStatus) -> Result<bool> {
        let mut tests = self.tests.write().await;
        let Some(stored) = tests.get_mut(&test.id) else {
            bail!("test {} does not exist", test.id);
        };
        if stored.status != expected {
            return Ok(false);
        }

        stored.status = test.status;
        stored.started_at = test.started_at;
        stored.ended_at = test.ended_at;
        stored.winner = test.winner.clone();
        stored.winner_confidence = test.winner_confidence;
        stored.conclusion = test.conclusion.clone();
        Ok(true)
    }

    async fn increment_impressions(&self, test_id: &str, arm_id: &str) -> Result<Option<Variant>> {
        Ok(self
            .increment(test_id, arm_id, |variant| {
                variant.impressions += 1;
                true
            })
            .await)
    }

    async fn increment_conversions(&self, test_id: &str, arm_id: &str) -> Result<Option<Variant>> {
        Ok(self
            .increment(test_id, arm_id, |variant| {
                if variant.conversions < variant.impressions {
                    variant.conversions += 1;
                    true
                } else {
                    false
                }
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::TrafficSplit;
    use chrono::{Duration, Utc};
    use serde_json::Value as JsonValue;

    fn running_test(id: &str) -> AbTest {
        AbTest {
            id: id.to_string(),
            name: "Trade-in form".to_string(),
            description: None,
            status: TestStatus::Running,
            control_arm: "A".to_string(),
            variants: vec![
                Variant::new("A", JsonValue::Null),
                Variant::new("B", JsonValue::Null),
            ],
            traffic_split: TrafficSplit::equal(&["A", "B"]),
            confidence_level: 0.95,
            min_sample_size: 100,
            max_duration_secs: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            ended_at: None,
            winner: None,
            winner_confidence: None,
            conclusion: None,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_fails() {
        let store = InMemoryTestStore::new();
        store.insert_test(&running_test("t1")).await.unwrap();
        assert!(store.insert_test(&running_test("t1")).await.is_err());
    }

    #[tokio::test]
    async fn conversion_requires_prior_impression() {
        let store = InMemoryTestStore::new();
        store.insert_test(&running_test("t1")).await.unwrap();

        assert!(store.increment_conversions("t1", "A").await.unwrap().is_none());

        store.increment_impressions("t1", "A").await.unwrap();
        let variant = store.increment_conversions("t1", "A").await.unwrap().unwrap();
        assert_eq!(variant.impressions, 1);
        assert_eq!(variant.conversions, 1);

        assert!(store.increment_conversions("t1", "A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increments_skip_tests_that_are_not_running() {
        let store = InMemoryTestStore::new();
        let mut test = running_test("t1");
        test.status = TestStatus::Paused;
        store.insert_test(&test).await.unwrap();

        assert!(store.increment_impressions("t1", "A").await.unwrap().is_none());
        assert!(store.increment_impressions("missing", "A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lifecycle_update_is_compare_and_swap() {
        let store = InMemoryTestStore::new();
        let test = running_test("t1");
        store.insert_test(&test).await.unwrap();
        store.increment_impressions("t1", "B").await.unwrap();

        let mut paused = test.clone();
        paused.status = TestStatus::Paused;
        assert!(!store.update_lifecycle(&paused, TestStatus::Draft).await.unwrap());
        assert!(store.update_lifecycle(&paused, TestStatus::Running).await.unwrap());

        let stored = store.get_test("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, TestStatus::Paused);
        // Counters survive lifecycle writes made from a stale snapshot.
        assert_eq!(stored.variant("B").unwrap().impressions, 1);
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let store = InMemoryTestStore::new();
        let mut older = running_test("old");
        older.created_at = Utc::now() - Duration::days(1);
        let mut draft = running_test("draft");
        draft.status = TestStatus::Draft;
        store.insert_test(&older).await.unwrap();
        store.insert_test(&running_test("new")).await.unwrap();
        store.insert_test(&draft).await.unwrap();

        let running = store.list_tests(Some(TestStatus::Running)).await.unwrap();
        let ids: Vec<_> = running.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        assert_eq!(store.list_tests(None).await.unwrap().len(), 3);
    }
}
