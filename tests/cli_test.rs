//! Command-line tests for the three binaries

use assert_cmd::Command;
use predicates::prelude::*;

// ============================================================================
// Help and argument handling
// ============================================================================

#[test]
fn test_help_for_every_binary() {
    for bin in ["trial-analysis", "check-data", "generate-data"] {
        Command::cargo_bin(bin)
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--directory"));
    }
}

#[test]
fn test_analysis_of_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("trial-analysis")
        .unwrap()
        .arg("--directory")
        .arg(dir.path().join("nowhere"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing input"));
}

// ============================================================================
// Generate → check → analyze
// ============================================================================

#[test]
fn test_generated_study_passes_integrity_check() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("generate-data")
        .unwrap()
        .args(["-n", "4", "--seed", "5", "-d"])
        .arg(dir.path())
        .assert()
        .success();

    assert!(dir.path().join("other").join("order.xlsx").is_file());

    Command::cargo_bin("check-data")
        .unwrap()
        .arg("-d")
        .arg(dir.path())
        .arg("--strict")
        .assert()
        .success()
        .stdout(predicate::str::contains("All JSON files passed integrity checks."))
        .stdout(predicate::str::contains(
            "Number of valid participants with all 3 modes: 4",
        ));
}

#[test]
fn test_strict_check_fails_on_bad_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let json_dir = dir.path().join("json_logs");
    std::fs::create_dir_all(&json_dir).unwrap();
    std::fs::write(json_dir.join("oops.json"), "{}").unwrap();

    Command::cargo_bin("check-data")
        .unwrap()
        .arg("-d")
        .arg(dir.path())
        .arg("--strict")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Filename format issue: oops.json"));
}

#[test]
fn test_analysis_of_generated_study_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("generate-data")
        .unwrap()
        .args(["-n", "8", "--seed", "9", "-d"])
        .arg(dir.path())
        .assert()
        .success();

    Command::cargo_bin("trial-analysis")
        .unwrap()
        .arg("-d")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid participants: 8/8"));

    assert!(dir.path().join("results").join("results_summary.xlsx").is_file());
}
