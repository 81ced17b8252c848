use std::process::{Command, Output};

fn autoani(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_autoani"))
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run autoani")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn analyze_prints_report_with_winner() {
    let output = autoani(&["analyze", "--arm", "A:1000:100", "--arm", "B:1000:130"]);
    assert!(output.status.success());

    let report = stdout(&output);
    assert!(report.contains("A/B TEST RESULTS"));
    assert!(report.contains("Winner: B"));
}

#[test]
fn analyze_json_output_parses() {
    let output = autoani(&[
        "analyze",
        "--arm",
        "A:1000:100",
        "--arm",
        "B:1000:104",
        "--json",
    ]);
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(result["control_arm"], "A");
    assert_eq!(result["is_significant"], false);
    assert!(result["winner_arm"].is_null());
}

#[test]
fn analyze_rejects_more_conversions_than_impressions() {
    let output = autoani(&["analyze", "--arm", "A:10:20", "--arm", "B:10:1"]);
    assert!(!output.status.success());
}

#[test]
fn sample_size_prints_per_arm_estimate() {
    let output = autoani(&["sample-size", "--baseline", "0.1", "--mde", "0.2"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Visitors per arm:"));
}

#[test]
fn assign_is_deterministic() {
    let args = [
        "assign",
        "--test-id",
        "banner",
        "--visitor-id",
        "visitor-7",
        "--split",
        "A=50,B=50",
    ];
    let first = stdout(&autoani(&args));
    let second = stdout(&autoani(&args));
    assert!(first.starts_with("visitor visitor-7 -> arm "));
    assert_eq!(first, second);
}
