//! Error types for trial-analysis
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Only fatal problems (missing directories, unreadable order table, failed
//! report writes) travel as [`Error`]. Data-quality problems are collected in
//! report structs and logged; a failed statistical test for one measure is a
//! [`TestFailure`] value so sibling analyses keep running.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trial-analysis error types
#[derive(Error, Debug)]
pub enum Error {
    /// A required input directory or file does not exist
    #[error("Missing input: {0}\nExpected layout: <data>/json_logs/*.json and <data>/other/order.xlsx")]
    MissingInput(String),

    /// Counterbalancing order table could not be read
    #[error("Order table error: {0}")]
    OrderTable(String),

    /// Tidy-table storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Results workbook could not be written
    #[error("Report error: {0}")]
    Report(String),

    /// Figure rendering failed
    #[error("Plot error: {0}")]
    Plot(String),

    /// A statistical precondition does not hold for the given data
    #[error("{test} failed for '{measure}': {reason}")]
    Statistics {
        /// Test name (e.g. "friedman")
        test: String,
        /// Outcome measure the test was run on
        measure: String,
        /// Human-readable cause
        reason: String,
    },

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Statistics`] for one test on one measure.
    pub fn statistics(
        test: impl Into<String>,
        measure: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Statistics {
            test: test.into(),
            measure: measure.into(),
            reason: reason.into(),
        }
    }
}

/// A labeled failure of one test on one measure.
///
/// Stored inside the result bundle in place of the result it replaces, and
/// written to the report's metadata sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    /// Test name (e.g. "pairwise")
    pub test: String,
    /// Outcome measure
    pub measure: String,
    /// Human-readable cause
    pub reason: String,
}

impl std::fmt::Display for TestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed for '{}': {}", self.test, self.measure, self.reason)
    }
}

impl From<Error> for TestFailure {
    fn from(error: Error) -> Self {
        match error {
            Error::Statistics {
                test,
                measure,
                reason,
            } => Self {
                test,
                measure,
                reason,
            },
            other => Self {
                test: "unknown".to_string(),
                measure: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
