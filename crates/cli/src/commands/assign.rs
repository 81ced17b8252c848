//! Shows which arm a visitor would land in, without touching any store.

use anyhow::{bail, Result};
use autoani_core::assignment::{assign, bucket};
use autoani_core::experiment::SPLIT_TOLERANCE;
use autoani_core::TrafficSplit;
use clap::Args;

fn parse_split(s: &str) -> Result<TrafficSplit, String> {
    let mut pairs = Vec::new();
    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((arm, pct)) = entry.split_once('=') else {
            return Err(format!("expected ARM=PERCENT, got '{entry}'"));
        };
        let pct: f64 = pct
            .trim()
            .parse()
            .map_err(|_| format!("invalid percentage '{pct}' for arm '{arm}'"))?;
        pairs.push((arm.trim().to_string(), pct));
    }
    Ok(TrafficSplit::from_pairs(pairs))
}

/// Arguments for the assign command.
#[derive(Args, Debug, Clone)]
pub struct AssignArgs {
    #[arg(long)]
    pub test_id: String,

    #[arg(long)]
    pub visitor_id: String,

    /// Traffic split as ARM=PERCENT pairs, e.g. "A=50,B=50"
    #[arg(long, value_parser = parse_split)]
    pub split: TrafficSplit,
}

/// Runs the assign command.
///
/// # Errors
/// Returns an error if the split is empty or does not sum to 100.
pub fn run_assign(args: &AssignArgs) -> Result<()> {
    let total = args.split.total();
    if (total - 100.0).abs() > SPLIT_TOLERANCE {
        bail!("traffic split must sum to 100, got {total:.2}");
    }

    let arm = assign(&args.test_id, &args.visitor_id, &args.split)?;
    println!(
        "visitor {} -> arm {} (bucket {})",
        args.visitor_id,
        arm,
        bucket(&args.test_id, &args.visitor_id)
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_split_in_order() {
        let split = parse_split("A=70, B=20,C=10").unwrap();
        let arms: Vec<&str> = split.weights().iter().map(|w| w.arm_id.as_str()).collect();
        assert_eq!(arms, ["A", "B", "C"]);
        assert!((split.total() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_malformed_split() {
        assert!(parse_split("A50,B50").is_err());
        assert!(parse_split("A=half").is_err());
    }

    #[test]
    fn split_must_sum_to_100() {
        let args = AssignArgs {
            test_id: "banner".to_string(),
            visitor_id: "v1".to_string(),
            split: parse_split("A=50,B=40").unwrap(),
        };
        assert!(run_assign(&args).is_err());
    }
}
