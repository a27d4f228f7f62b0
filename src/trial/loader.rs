//! Record Loader - per-trial JSON files into a [`TrialTable`]
//!
//! Each file holds one observation:
//!
//! ```text
//! {"round_data": {"id": "01", "mode": 2, "t": 153.2, "mse": 812.9}}
//! ```
//!
//! Malformed files are reported per file and left out of the table; they never
//! abort the load. A missing directory is fatal.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Condition, TrialRecord, TrialTable};
use crate::{Error, Result};

/// Why a single file was left out of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadIssue {
    /// File name (without directory)
    pub file: String,
    /// Human-readable cause
    pub reason: String,
}

/// Outcome of loading a directory.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// One row per successfully parsed file
    pub table: TrialTable,
    /// Files that could not be turned into a row
    pub issues: Vec<LoadIssue>,
    /// Files skipped because their name carries the exclusion marker
    pub excluded: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrialFile {
    pub(crate) round_data: Option<RoundData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoundData {
    pub(crate) id: Option<Value>,
    pub(crate) mode: Option<Value>,
    pub(crate) t: Option<Value>,
    pub(crate) mse: Option<Value>,
}

/// Render a JSON scalar the way it should read as an identifier.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a measure that may be a JSON number or a numeric string.
///
/// Absent and `null` values are `NaN`.
fn measure_value(value: Option<&Value>, key: &str) -> std::result::Result<f64, String> {
    match value {
        None | Some(Value::Null) => Ok(f64::NAN),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("'round_data.{key}' is out of range: {n}")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'round_data.{key}' is not numeric: '{s}'")),
        Some(other) => Err(format!("'round_data.{key}' is not numeric: {other}")),
    }
}

/// List `*.json` files in `dir`, sorted by name.
///
/// # Errors
///
/// Returns [`Error::MissingInput`] if `dir` is not a directory, or an IO error
/// if it cannot be listed.
pub fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(format!(
            "trial log directory not found: {}",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
}

/// Parse one trial file into a record.
///
/// # Errors
///
/// Returns a description of the problem when the file is unreadable, is not
/// valid JSON, lacks `round_data`, its `id` or a usable `mode`, or carries a
/// `t`/`mse` that is neither a number nor a numeric string.
pub fn parse_trial_file(path: &Path) -> std::result::Result<TrialRecord, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("unreadable: {e}"))?;
    let parsed: TrialFile =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))?;
    let round = parsed
        .round_data
        .ok_or_else(|| "missing 'round_data'".to_string())?;

    let participant_id = round
        .id
        .as_ref()
        .and_then(scalar_to_string)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| "missing 'round_data.id'".to_string())?;
    let mode = round
        .mode
        .as_ref()
        .and_then(scalar_to_string)
        .ok_or_else(|| "missing 'round_data.mode'".to_string())?;
    let condition: Condition = mode.parse().map_err(|e: Error| e.to_string())?;

    let time = measure_value(round.t.as_ref(), "t")?;
    let error = measure_value(round.mse.as_ref(), "mse")?;

    Ok(TrialRecord::new(participant_id, condition, time, error))
}

/// Load every trial file under `dir` into a table.
///
/// Files whose name contains `exclusion_marker` (case-insensitive) are skipped.
/// An empty marker excludes nothing.
///
/// # Errors
///
/// Fails only when the directory itself is missing or unreadable.
pub fn load_records(dir: &Path, exclusion_marker: &str) -> Result<LoadReport> {
    let marker = exclusion_marker.to_lowercase();
    let mut report = LoadReport::default();

    for path in json_files(dir)? {
        let name = file_name(&path);
        if !marker.is_empty() && name.to_lowercase().contains(&marker) {
            debug!(file = %name, "excluded by marker");
            report.excluded.push(name);
            continue;
        }
        match parse_trial_file(&path) {
            Ok(record) => report.table.push(record),
            Err(reason) => {
                warn!(file = %name, %reason, "skipping malformed trial file");
                report.issues.push(LoadIssue { file: name, reason });
            }
        }
    }

    info!(
        rows = report.table.len(),
        malformed = report.issues.len(),
        excluded = report.excluded.len(),
        "loaded trial records from {}",
        dir.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_parse_integer_id_and_string_mode() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "3_1_x.json",
            r#"{"round_data": {"id": 3, "mode": "1", "t": 150.5, "mse": 700.25}}"#,
        );
        let record = parse_trial_file(&dir.path().join("3_1_x.json")).unwrap();
        assert_eq!(record.participant_id, "3");
        assert_eq!(record.condition, Condition::new(1));
        assert!((record.time - 150.5).abs() < f64::EPSILON);
        assert!(record.trial_index.is_none());
    }

    #[test]
    fn test_missing_measures_become_nan() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "01_0_x.json",
            r#"{"round_data": {"id": "01", "mode": 0, "t": null}}"#,
        );
        let record = parse_trial_file(&dir.path().join("01_0_x.json")).unwrap();
        assert!(record.time.is_nan());
        assert!(record.error.is_nan());
    }

    #[test]
    fn test_numeric_string_measures_are_parsed() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "01_0_x.json",
            r#"{"round_data": {"id": "01", "mode": 0, "t": "150.5", "mse": " 700.0 "}}"#,
        );
        let report = load_records(dir.path(), "trial").unwrap();
        assert!(report.issues.is_empty());
        assert_eq!(report.table.len(), 1);
        let record = &report.table.records()[0];
        assert!((record.time - 150.5).abs() < f64::EPSILON);
        assert!((record.error - 700.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_non_numeric_measure_is_an_issue() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "01_0_x.json",
            r#"{"round_data": {"id": "01", "mode": 0, "t": "fast", "mse": 700.0}}"#,
        );
        let report = load_records(dir.path(), "trial").unwrap();
        assert!(report.table.is_empty());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].reason, "'round_data.t' is not numeric: 'fast'");
    }

    #[test]
    fn test_missing_round_data_is_an_issue() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "01_0_x.json", r#"{"other": {}}"#);
        let err = parse_trial_file(&dir.path().join("01_0_x.json")).unwrap_err();
        assert!(err.contains("round_data"));
    }

    #[test]
    fn test_exclusion_marker_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"round_data": {"id": "01", "mode": 0, "t": 1.0, "mse": 2.0}}"#;
        write(dir.path(), "01_0_a.json", body);
        write(dir.path(), "01_0_TRIAL_run.json", body);
        write(dir.path(), "notes.txt", "ignored");

        let report = load_records(dir.path(), "trial").unwrap();
        assert_eq!(report.table.len(), 1);
        assert_eq!(report.excluded, vec!["01_0_TRIAL_run.json".to_string()]);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_records(&dir.path().join("nope"), "trial");
        assert!(matches!(result, Err(Error::MissingInput(_))));
    }
}
