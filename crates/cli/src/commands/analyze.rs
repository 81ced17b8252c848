//! Offline significance analysis.
//!
//! Analyzes counts exported from another system, e.g.
//! `autoani analyze --arm A:1000:100 --arm B:1000:130`.

use anyhow::Result;
use autoani_core::{analyze, AbTest, ReportFormatter, TestStatus, TrafficSplit, Variant};
use chrono::Utc;
use clap::Args;
use serde_json::Value as JsonValue;

/// Impression and conversion counts for one arm, parsed from `ID:IMPRESSIONS:CONVERSIONS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmCounts {
    pub arm_id: String,
    pub impressions: u64,
    pub conversions: u64,
}

fn parse_arm(s: &str) -> Result<ArmCounts, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [arm_id, impressions, conversions] = parts.as_slice() else {
        return Err(format!("expected ID:IMPRESSIONS:CONVERSIONS, got '{s}'"));
    };

    let impressions = impressions
        .parse()
        .map_err(|_| format!("invalid impression count '{impressions}'"))?;
    let conversions = conversions
        .parse()
        .map_err(|_| format!("invalid conversion count '{conversions}'"))?;

    Ok(ArmCounts {
        arm_id: (*arm_id).to_string(),
        impressions,
        conversions,
    })
}

/// Arguments for the analyze command.
#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Arm counts as ID:IMPRESSIONS:CONVERSIONS (repeat for each arm)
    #[arg(long = "arm", value_parser = parse_arm, required = true)]
    pub arms: Vec<ArmCounts>,

    /// Control arm (defaults to the first arm)
    #[arg(long)]
    pub control: Option<String>,

    /// Confidence level target
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    /// Minimum total impressions before a result counts
    #[arg(long, default_value_t = 1000)]
    pub min_sample_size: u64,

    /// Print the analysis as JSON instead of a report
    #[arg(long)]
    pub json: bool,
}

/// Builds a throwaway test carrying the given counts.
///
/// # Errors
/// Returns an error if the arms break a test invariant (fewer than 2 arms,
/// duplicates, unknown control, more conversions than impressions).
pub fn build_test(args: &AnalyzeArgs) -> Result<AbTest> {
    let control_arm = args
        .control
        .clone()
        .or_else(|| args.arms.first().map(|a| a.arm_id.clone()))
        .unwrap_or_default();
    let arm_ids: Vec<&str> = args.arms.iter().map(|a| a.arm_id.as_str()).collect();

    let test = AbTest {
        id: "offline".to_string(),
        name: "Offline analysis".to_string(),
        description: None,
        status: TestStatus::Completed,
        control_arm,
        variants: args
            .arms
            .iter()
            .map(|a| Variant {
                arm_id: a.arm_id.clone(),
                content: JsonValue::Null,
                impressions: a.impressions,
                conversions: a.conversions,
            })
            .collect(),
        traffic_split: TrafficSplit::equal(&arm_ids),
        confidence_level: args.confidence,
        min_sample_size: args.min_sample_size,
        max_duration_secs: None,
        created_at: Utc::now(),
        started_at: None,
        ended_at: None,
        winner: None,
        winner_confidence: None,
        conclusion: None,
    };

    test.validate()?;
    Ok(test)
}

/// Runs the analyze command.
///
/// # Errors
/// Returns an error if the arm counts are invalid.
pub fn run_analyze(args: &AnalyzeArgs) -> Result<()> {
    let test = build_test(args)?;
    let result = analyze(&test);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", ReportFormatter::format(&result));
    }

    Ok(())
}
