//! Integrity Checker
//!
//! Works on the raw `json_logs/` directory, independent of the loader:
//!
//! 1. every `*.json` name must match `<pid>_<condition>_<suffix>.json`;
//! 2. the id/condition in the name must match `round_data`;
//! 3. `t` and `mse` must be present;
//! 4. every participant must have exactly one file per required condition.
//!
//! Problems are accumulated and logged; the check never stops early.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::loader::{json_files, scalar_to_string, TrialFile};
use super::{normalize_participant_id, Condition};
use crate::Result;

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)_([0-2])_.*\.json$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

/// One integrity problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// Name does not follow `<pid>_<condition>_<suffix>.json`
    FilenameFormat {
        /// Offending file
        file: String,
    },
    /// File could not be read or parsed
    Unreadable {
        /// Offending file
        file: String,
        /// Parser / IO message
        reason: String,
    },
    /// Name and `round_data` disagree
    Mismatch {
        /// Offending file
        file: String,
        /// `(id, condition)` from the file name
        filename: (String, String),
        /// `(id, condition)` from `round_data`
        content: (String, String),
    },
    /// A measure is absent from `round_data`
    MissingField {
        /// Offending file
        file: String,
        /// Missing key (`t` or `mse`)
        field: String,
    },
    /// Participant's condition set is not exactly the required set
    ConditionSet {
        /// Participant id
        participant: String,
        /// Conditions with no file
        missing: Vec<Condition>,
        /// Conditions with more than one file
        duplicated: Vec<Condition>,
        /// Conditions outside the required set
        unexpected: Vec<Condition>,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilenameFormat { file } => write!(f, "Filename format issue: {file}"),
            Self::Unreadable { file, reason } => write!(f, "Error reading {file}: {reason}"),
            Self::Mismatch {
                file,
                filename,
                content,
            } => write!(
                f,
                "ID/mode mismatch in {file}: filename ({}, {}) vs round_data ({}, {})",
                filename.0, filename.1, content.0, content.1
            ),
            Self::MissingField { file, field } => {
                write!(f, "Missing '{field}' in round_data for {file}")
            }
            Self::ConditionSet {
                participant,
                missing,
                duplicated,
                unexpected,
            } => {
                write!(f, "Participant {participant} has an invalid condition set")?;
                if !missing.is_empty() {
                    write!(f, "; missing modes: {}", join(missing))?;
                }
                if !duplicated.is_empty() {
                    write!(f, "; duplicated modes: {}", join(duplicated))?;
                }
                if !unexpected.is_empty() {
                    write!(f, "; extra/invalid modes: {}", join(unexpected))?;
                }
                Ok(())
            }
        }
    }
}

fn join(conditions: &[Condition]) -> String {
    conditions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Participants with exactly one file per required condition
    pub valid_participants: usize,
    /// Participants seen in well-named files
    pub total_participants: usize,
    /// Every problem found, in discovery order
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// True if no problem was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check a trial log directory against the required condition set.
///
/// # Errors
///
/// Fails only when the directory is missing or cannot be listed.
pub fn check_integrity(dir: &Path, required: &[Condition]) -> Result<IntegrityReport> {
    let mut issues = Vec::new();
    let mut counts: BTreeMap<String, BTreeMap<Condition, usize>> = BTreeMap::new();

    for path in json_files(dir)? {
        let file = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());

        let parts = filename_pattern()
            .captures(&file)
            .map(|caps| (normalize_participant_id(&caps[1]), caps[2].to_string()));
        let Some((file_pid, file_mode)) = parts else {
            issues.push(IntegrityIssue::FilenameFormat { file });
            continue;
        };
        if let Ok(condition) = file_mode.parse::<Condition>() {
            *counts
                .entry(file_pid.clone())
                .or_default()
                .entry(condition)
                .or_insert(0) += 1;
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<TrialFile>(&text).map_err(|e| e.to_string()));
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(reason) => {
                issues.push(IntegrityIssue::Unreadable { file, reason });
                continue;
            }
        };

        let round = parsed.round_data;
        let content_pid = round
            .as_ref()
            .and_then(|r| r.id.as_ref())
            .and_then(scalar_to_string)
            .map(|id| normalize_participant_id(&id))
            .unwrap_or_default();
        let content_mode = round
            .as_ref()
            .and_then(|r| r.mode.as_ref())
            .and_then(scalar_to_string)
            .unwrap_or_default();
        let modes_agree = match (file_mode.parse::<Condition>(), content_mode.parse::<Condition>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if file_pid != content_pid || !modes_agree {
            issues.push(IntegrityIssue::Mismatch {
                file: file.clone(),
                filename: (file_pid, file_mode),
                content: (content_pid, content_mode),
            });
        }
        if round.as_ref().and_then(|r| r.t.as_ref()).is_none() {
            issues.push(IntegrityIssue::MissingField {
                file: file.clone(),
                field: "t".to_string(),
            });
        }
        if round.as_ref().and_then(|r| r.mse.as_ref()).is_none() {
            issues.push(IntegrityIssue::MissingField {
                file,
                field: "mse".to_string(),
            });
        }
    }

    let required: BTreeSet<Condition> = required.iter().copied().collect();
    let mut valid_participants = 0;
    for (participant, seen) in &counts {
        let missing: Vec<Condition> = required
            .iter()
            .filter(|c| !seen.contains_key(*c))
            .copied()
            .collect();
        let duplicated: Vec<Condition> = seen
            .iter()
            .filter(|(c, n)| required.contains(*c) && **n > 1)
            .map(|(c, _)| *c)
            .collect();
        let unexpected: Vec<Condition> = seen
            .keys()
            .filter(|c| !required.contains(*c))
            .copied()
            .collect();

        if missing.is_empty() && duplicated.is_empty() && unexpected.is_empty() {
            valid_participants += 1;
        } else {
            issues.push(IntegrityIssue::ConditionSet {
                participant: participant.clone(),
                missing,
                duplicated,
                unexpected,
            });
        }
    }

    for issue in &issues {
        warn!("{issue}");
    }
    if issues.is_empty() {
        info!("All JSON files passed integrity checks.");
    }
    info!(
        valid_participants,
        total_participants = counts.len(),
        "Number of valid participants with all {} modes: {valid_participants}",
        required.len()
    );

    Ok(IntegrityReport {
        valid_participants,
        total_participants: counts.len(),
        issues,
    })
}
