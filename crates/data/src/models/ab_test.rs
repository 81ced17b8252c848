//! Row models for A/B tests and their arms.
//!
//! The domain keeps status as an enum and the traffic split as a typed list;
//! here they are flattened to a status string and a JSONB column.

use anyhow::{anyhow, Context, Result};
use autoani_core::{AbTest, TestStatus, TrafficSplit, Variant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One row of `ab_tests`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AbTestRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Status: "draft", "running", "paused" or "completed".
    pub status: String,
    pub control_arm: String,
    /// Ordered list of `{arm_id, percentage}`.
    pub traffic_split: JsonValue,
    pub confidence_level: f64,
    pub min_sample_size: i64,
    pub max_duration_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner: Option<String>,
    pub winner_confidence: Option<f64>,
    pub conclusion: Option<String>,
}

/// One row of `ab_variants`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VariantRecord {
    pub test_id: String,
    pub arm_id: String,
    /// Index of the arm within its test; preserves operator ordering.
    pub position: i32,
    pub content: JsonValue,
    pub impressions: i64,
    pub conversions: i64,
}

impl AbTestRecord {
    /// Flattens a domain test into a row.
    ///
    /// # Errors
    /// Returns an error if the traffic split cannot be encoded or a count overflows `i64`.
    pub fn from_domain(test: &AbTest) -> Result<Self> {
        Ok(Self {
            id: test.id.clone(),
            name: test.name.clone(),
            description: test.description.clone(),
            status: test.status.as_str().to_string(),
            control_arm: test.control_arm.clone(),
            traffic_split: serde_json::to_value(&test.traffic_split)?,
            confidence_level: test.confidence_level,
            min_sample_size: i64::try_from(test.min_sample_size)
                .context("min_sample_size does not fit in BIGINT")?,
            max_duration_secs: test.max_duration_secs,
            created_at: test.created_at,
            started_at: test.started_at,
            ended_at: test.ended_at,
            winner: test.winner.clone(),
            winner_confidence: test.winner_confidence,
            conclusion: test.conclusion.clone(),
        })
    }

    /// Rebuilds the domain test from its row and arm rows.
    ///
    /// Arms are ordered by `position`.
    ///
    /// # Errors
    /// Returns an error on an unknown status, malformed split JSON, or negative counts.
    pub fn into_domain(self, mut variants: Vec<VariantRecord>) -> Result<AbTest> {
        let status = TestStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("test {} has unknown status '{}'", self.id, self.status))?;
        let traffic_split: TrafficSplit = serde_json::from_value(self.traffic_split)
            .with_context(|| format!("test {} has a malformed traffic split", self.id))?;

        variants.sort_by_key(|v| v.position);
        let variants = variants
            .into_iter()
            .map(VariantRecord::into_domain)
            .collect::<Result<Vec<_>>>()?;

        Ok(AbTest {
            id: self.id,
            name: self.name,
            description: self.description,
            status,
            control_arm: self.control_arm,
            variants,
            traffic_split,
            confidence_level: self.confidence_level,
            min_sample_size: u64::try_from(self.min_sample_size)
                .context("min_sample_size is negative")?,
            max_duration_secs: self.max_duration_secs,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            winner: self.winner,
            winner_confidence: self.winner_confidence,
            conclusion: self.conclusion,
        })
    }
}

impl VariantRecord {
    /// # Errors
    /// Returns an error if a count or the position overflows its column type.
    pub fn from_domain(test_id: &str, position: usize, variant: &Variant) -> Result<Self> {
        Ok(Self {
            test_id: test_id.to_string(),
            arm_id: variant.arm_id.clone(),
            position: i32::try_from(position).context("too many arms")?,
            content: variant.content.clone(),
            impressions: i64::try_from(variant.impressions).context("impressions overflow")?,
            conversions: i64::try_from(variant.conversions).context("conversions overflow")?,
        })
    }

    /// # Errors
    /// Returns an error if a stored count is negative.
    pub fn into_domain(self) -> Result<Variant> {
        Ok(Variant {
            impressions: u64::try_from(self.impressions)
                .with_context(|| format!("arm {} has negative impressions", self.arm_id))?,
            conversions: u64::try_from(self.conversions)
                .with_context(|| format!("arm {} has negative conversions", self.arm_id))?,
            arm_id: self.arm_id,
            content: self.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AbTest {
        AbTest {
            id: "finance-cta".to_string(),
            name: "Finance CTA".to_string(),
            description: Some("Apply-now button copy".to_string()),
            status: TestStatus::Running,
            control_arm: "A".to_string(),
            variants: vec![
                Variant {
                    arm_id: "A".to_string(),
                    content: json!({ "label": "Apply now" }),
                    impressions: 120,
                    conversions: 9,
                },
                Variant {
                    arm_id: "B".to_string(),
                    content: json!({ "label": "Get pre-approved" }),
                    impressions: 118,
                    conversions: 14,
                },
            ],
            traffic_split: TrafficSplit::from_pairs([("A", 50.0), ("B", 50.0)]),
            confidence_level: 0.95,
            min_sample_size: 1000,
            max_duration_secs: Some(86_400),
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            ended_at: None,
            winner: None,
            winner_confidence: None,
            conclusion: None,
        }
    }

    #[test]
    fn status_is_stored_lowercase() {
        let record = AbTestRecord::from_domain(&sample()).unwrap();
        assert_eq!(record.status, "running");
        assert_eq!(record.traffic_split[0]["arm_id"], "A");
    }

    #[test]
    fn variants_are_reordered_by_position() {
        let test = sample();
        let record = AbTestRecord::from_domain(&test).unwrap();
        let mut rows: Vec<VariantRecord> = test
            .variants
            .iter()
            .enumerate()
            .map(|(i, v)| VariantRecord::from_domain(&test.id, i, v).unwrap())
            .collect();
        rows.reverse();

        let rebuilt = record.into_domain(rows).unwrap();
        assert_eq!(rebuilt, test);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut record = AbTestRecord::from_domain(&sample()).unwrap();
        record.status = "archived".to_string();
        assert!(record.into_domain(Vec::new()).is_err());
    }

    #[test]
    fn negative_counts_are_rejected() {
        let row = VariantRecord {
            test_id: "t".to_string(),
            arm_id: "A".to_string(),
            position: 0,
            content: JsonValue::Null,
            impressions: -1,
            conversions: 0,
        };
        assert!(row.into_domain().is_err());
    }
}
