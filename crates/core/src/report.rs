#![allow(clippy::format_push_string)]

use crate::analyzer::AnalysisResult;

pub struct ReportFormatter;

impl ReportFormatter {
    #[must_use]
    pub fn format(result: &AnalysisResult) -> String {
        let mut output = String::new();

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                    A/B TEST RESULTS                           \n");
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push('\n');

        output.push_str(&format!("Test:                  {}\n", result.test_id));
        output.push_str(&format!("Control Arm:           {}\n", result.control_arm));
        output.push_str(&format!(
            "Confidence Target:     {:.1}%\n",
            result.confidence_level * 100.0
        ));
        output.push_str(&format!(
            "Total Impressions:     {}{}\n",
            result.total_impressions,
            if result.min_sample_size_reached {
                ""
            } else {
                " (below minimum sample size)"
            }
        ));
        output.push_str(&format!("Total Conversions:     {}\n", result.total_conversions));
        output.push('\n');

        output.push_str("Arms\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        output.push_str("Arm        Impressions  Conversions   Rate      95% CI\n");
        for arm in &result.per_arm {
            let label = if arm.is_control {
                format!("{} (c)", arm.arm_id)
            } else {
                arm.arm_id.clone()
            };
            output.push_str(&format!(
                "{:<10} {:>11}  {:>11}   {:>6.2}%   [{:.2}%, {:.2}%]\n",
                label,
                arm.impressions,
                arm.conversions,
                arm.conversion_rate * 100.0,
                arm.ci_lower * 100.0,
                arm.ci_upper * 100.0
            ));
        }
        output.push('\n');

        output.push_str("Significance\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        match &result.challenger_arm {
            Some(challenger) => {
                output.push_str(&format!("Challenger:            {challenger}\n"));
                output.push_str(&format!("Z-Score:               {:.4}\n", result.z_score));
                output.push_str(&format!("P-Value:               {:.4}\n", result.p_value));
                output.push_str(&format!(
                    "Improvement:           {:+.2}%\n",
                    result.improvement_pct
                ));
                output.push_str(&format!(
                    "Significant:           {}\n",
                    if result.is_significant { "yes" } else { "no" }
                ));
            }
            None => output.push_str("Challenger:            N/A (no challenger arm)\n"),
        }

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");

        match (&result.winner_arm, result.winner_confidence()) {
            (Some(winner), Some(confidence)) => {
                output.push_str(&format!(
                    "\nWinner: {winner} ({confidence:.2}% confidence)\n\n"
                ));
            }
            _ => {
                output.push_str("\nNo winner yet.\n");
                output.push_str("    Keep collecting traffic or revisit the expected effect size.\n\n");
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::experiment::{AbTest, TestStatus, TrafficSplit, Variant};
    use chrono::Utc;

    fn test(a: (u64, u64), b: (u64, u64)) -> AbTest {
        AbTest {
            id: "cta".to_string(),
            name: "CTA".to_string(),
            description: None,
            status: TestStatus::Running,
            control_arm: "A".to_string(),
            variants: vec![
                Variant {
                    arm_id: "A".to_string(),
                    content: serde_json::Value::Null,
                    impressions: a.0,
                    conversions: a.1,
                },
                Variant {
                    arm_id: "B".to_string(),
                    content: serde_json::Value::Null,
                    impressions: b.0,
                    conversions: b.1,
                },
            ],
            traffic_split: TrafficSplit::equal(&["A", "B"]),
            confidence_level: 0.95,
            min_sample_size: 1000,
            max_duration_secs: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            winner: None,
            winner_confidence: None,
            conclusion: None,
        }
    }

    #[test]
    fn report_names_winner() {
        let report = ReportFormatter::format(&analyze(&test((1000, 100), (1000, 130))));
        assert!(report.contains("A/B TEST RESULTS"));
        assert!(report.contains("A (c)"));
        assert!(report.contains("Winner: B"));
        assert!(report.contains("+30.00%"));
    }

    #[test]
    fn report_without_data_has_no_winner() {
        let report = ReportFormatter::format(&analyze(&test((0, 0), (0, 0))));
        assert!(report.contains("No winner yet."));
        assert!(report.contains("below minimum sample size"));
    }
}
