//! Tests for error types

use trial_analysis::{Error, TestFailure};

#[test]
fn test_missing_input_error() {
    let error = Error::MissingInput("./data/json_logs".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Missing input"));
    assert!(error_str.contains("./data/json_logs"));
    assert!(error_str.contains("Expected layout"));
}

#[test]
fn test_order_table_error() {
    let error = Error::OrderTable("missing column 'condB'".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Order table error"));
    assert!(error_str.contains("condB"));
}

#[test]
fn test_statistics_error() {
    let error = Error::statistics("friedman", "time", "needs at least 2 complete participants");
    let error_str = format!("{error}");
    assert_eq!(
        error_str,
        "friedman failed for 'time': needs at least 2 complete participants"
    );
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("file not found".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_report_and_plot_errors() {
    assert!(format!("{}", Error::Report("disk full".to_string())).contains("Report error"));
    assert!(format!("{}", Error::Plot("no font".to_string())).contains("Plot error"));
}

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("alpha must be in (0, 1)".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("alpha"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    let error_str = format!("{error}");
    assert_eq!(error_str, "custom error message");
}

#[test]
fn test_test_failure_from_statistics_error() {
    let failure = TestFailure::from(Error::statistics("pairwise", "error", "too few subjects"));
    assert_eq!(failure.test, "pairwise");
    assert_eq!(failure.measure, "error");
    assert_eq!(failure.to_string(), "pairwise failed for 'error': too few subjects");
}

#[test]
fn test_test_failure_from_other_error() {
    let failure = TestFailure::from(Error::Other("boom".to_string()));
    assert_eq!(failure.test, "unknown");
    assert_eq!(failure.reason, "boom");
}

#[test]
fn test_error_debug() {
    let error = Error::InvalidInput("x".to_string());
    assert!(format!("{error:?}").contains("InvalidInput"));
}
