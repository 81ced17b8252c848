//! Repository for A/B tests and their arm counters.

use crate::models::{AbTestRecord, VariantRecord};
use anyhow::{bail, Result};
use async_trait::async_trait;
use autoani_core::{AbTest, TestStatus, TestStore, Variant};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::debug;

const VARIANT_COLUMNS: &str = "v.test_id, v.arm_id, v.position, v.content, v.impressions, v.conversions";

/// [`TestStore`] over the `ab_tests` and `ab_variants` tables.
///
/// Counter increments are single `UPDATE ... RETURNING` statements, so
/// concurrent recorders never lose an event. Lifecycle writes carry the
/// expected status in their `WHERE` clause.
#[derive(Clone)]
pub struct PgTestStore {
    pool: PgPool,
}

impl PgTestStore {
    /// Creates a new repository with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn variants_for(&self, test_ids: &[String]) -> Result<HashMap<String, Vec<VariantRecord>>> {
        let rows = sqlx::query_as::<_, VariantRecord>(
            r"
            SELECT test_id, arm_id, position, content, impressions, conversions
            FROM ab_variants
            WHERE test_id = ANY($1)
            ORDER BY test_id, position
            ",
        )
        .bind(test_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<VariantRecord>> = HashMap::new();
        for row in rows {
            grouped.entry(row.test_id.clone()).or_default().push(row);
        }
        Ok(grouped)
    }

    async fn bump(&self, column: &str, guard: &str, test_id: &str, arm_id: &str) -> Result<Option<Variant>> {
        let sql = format!(
            r"
            UPDATE ab_variants v
            SET {column} = v.{column} + 1
            FROM ab_tests t
            WHERE v.test_id = t.id
              AND v.test_id = $1
              AND v.arm_id = $2
              AND t.status = 'running'
              {guard}
            RETURNING {VARIANT_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, VariantRecord>(&sql)
            .bind(test_id)
            .bind(arm_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(VariantRecord::into_domain).transpose()
    }
}

#[async_trait]
impl TestStore for PgTestStore {
    async fn insert_test(&self, test: &AbTest) -> Result<()> {
        let record = AbTestRecord::from_domain(test)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO ab_tests (
                id, name, description, status, control_arm, traffic_split,
                confidence_level, min_sample_size, max_duration_secs,
                created_at, started_at, ended_at, winner, winner_confidence, conclusion
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.status)
        .bind(&record.control_arm)
        .bind(&record.traffic_split)
        .bind(record.confidence_level)
        .bind(record.min_sample_size)
        .bind(record.max_duration_secs)
        .bind(record.created_at)
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(&record.winner)
        .bind(record.winner_confidence)
        .bind(&record.conclusion)
        .execute(&mut *tx)
        .await?;

        for (position, variant) in test.variants.iter().enumerate() {
            let row = VariantRecord::from_domain(&test.id, position, variant)?;
            sqlx::query(
                r"
                INSERT INTO ab_variants (test_id, arm_id, position, content, impressions, conversions)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(&row.test_id)
            .bind(&row.arm_id)
            .bind(row.position)
            .bind(&row.content)
            .bind(row.impressions)
            .bind(row.conversions)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(test_id = %test.id, arms = test.variants.len(), "Inserted test");
        Ok(())
    }

    async fn get_test(&self, test_id: &str) -> Result<Option<AbTest>> {
        let record = sqlx::query_as::<_, AbTestRecord>(
            r"
            SELECT id, name, description, status, control_arm, traffic_split,
                   confidence_level, min_sample_size, max_duration_secs,
                   created_at, started_at, ended_at, winner, winner_confidence, conclusion
            FROM ab_tests
            WHERE id = $1
            ",
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        let mut variants = self.variants_for(&[record.id.clone()]).await?;
        let rows = variants.remove(&record.id).unwrap_or_default();
        record.into_domain(rows).map(Some)
    }

    async fn list_tests(&self, status: Option<TestStatus>) -> Result<Vec<AbTest>> {
        let records = sqlx::query_as::<_, AbTestRecord>(
            r"
            SELECT id, name, description, status, control_arm, traffic_split,
                   confidence_level, min_sample_size, max_duration_secs,
                   created_at, started_at, ended_at, winner, winner_confidence, conclusion
            FROM ab_tests
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id ASC
            ",
        )
        .bind(status.as_ref().map(TestStatus::as_str))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut variants = self.variants_for(&ids).await?;

        records
            .into_iter()
            .map(|record| {
                let rows = variants.remove(&record.id).unwrap_or_default();
                record.into_domain(rows)
            })
            .collect()
    }

    async fn update_lifecycle(&self, test: &AbTest, expected: TestStatus) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE ab_tests
            SET status = $2,
                started_at = $3,
                ended_at = $4,
                winner = $5,
                winner_confidence = $6,
                conclusion = $7
            WHERE id = $1 AND status = $8
            ",
        )
        .bind(&test.id)
        .bind(test.status.as_str())
        .bind(test.started_at)
        .bind(test.ended_at)
        .bind(&test.winner)
        .bind(test.winner_confidence)
        .bind(&test.conclusion)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM ab_tests WHERE id = $1")
            .bind(&test.id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            bail!("test {} does not exist", test.id);
        }
        Ok(false)
    }

    async fn increment_impressions(&self, test_id: &str, arm_id: &str) -> Result<Option<Variant>> {
        self.bump("impressions", "", test_id, arm_id).await
    }

    async fn increment_conversions(&self, test_id: &str, arm_id: &str) -> Result<Option<Variant>> {
        self.bump("conversions", "AND v.conversions < v.impressions", test_id, arm_id)
            .await
    }
}
