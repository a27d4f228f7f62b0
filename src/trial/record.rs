//! Trial Record - one (participant, condition) observation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Width participant identifiers are zero-padded to.
pub const PARTICIPANT_ID_WIDTH: usize = 2;

/// Zero-pad a participant identifier to [`PARTICIPANT_ID_WIDTH`].
///
/// Integral float spellings (`"3.0"`, as spreadsheets tend to produce) are
/// reduced to their integer form first. Longer identifiers are kept as-is.
///
/// ```rust
/// use trial_analysis::trial::normalize_participant_id;
///
/// assert_eq!(normalize_participant_id("3"), "03");
/// assert_eq!(normalize_participant_id("3.0"), "03");
/// assert_eq!(normalize_participant_id("12"), "12");
/// assert_eq!(normalize_participant_id(" 007 "), "007");
/// ```
#[must_use]
pub fn normalize_participant_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let base = match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && !trimmed.chars().all(|c| c.is_ascii_digit()) => {
            format!("{v:.0}")
        }
        _ => trimmed.to_string(),
    };
    format!("{base:0>width$}", width = PARTICIPANT_ID_WIDTH)
}

/// Experimental condition (the study's "mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition(u8);

impl Condition {
    /// The study's three conditions in their fixed level order.
    pub const ALL: [Self; 3] = [Self(0), Self(1), Self(2)];

    /// Wrap a condition code.
    #[must_use]
    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    /// The numeric condition code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Condition {
    type Err = Error;

    /// Accepts `"1"` as well as integral float spellings like `"1.0"`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Ok(Self(code));
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&v) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let code = v as u8;
                Ok(Self(code))
            }
            _ => Err(Error::InvalidInput(format!("not a condition code: '{s}'"))),
        }
    }
}

/// Outcome measure recorded per trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    /// Completion time in seconds (`round_data.t`)
    Time,
    /// Path-following error (`round_data.mse`)
    Error,
}

impl Measure {
    /// Both measures in report order.
    pub const ALL: [Self; 2] = [Self::Time, Self::Error];

    /// Column / sheet name of the measure.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Error => "error",
        }
    }

    /// Key of the measure inside `round_data`.
    #[must_use]
    pub const fn json_key(self) -> &'static str {
        match self {
            Self::Time => "t",
            Self::Error => "mse",
        }
    }

    /// Read this measure off a record.
    #[must_use]
    pub const fn value(self, record: &TrialRecord) -> f64 {
        match self {
            Self::Time => record.time,
            Self::Error => record.error,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One observation: a participant's result under one condition.
///
/// Missing measures are `NaN`, never zero. `trial_index` is the 1-based
/// position the condition was run at, filled in by the order joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Participant identifier (zero-padded after joining)
    pub participant_id: String,
    /// Condition code
    pub condition: Condition,
    /// Completion time in seconds
    pub time: f64,
    /// Path-following error
    pub error: f64,
    /// 1-based trial position, when known
    pub trial_index: Option<u8>,
}

impl TrialRecord {
    /// Create a record without a trial index.
    #[must_use]
    pub fn new(participant_id: impl Into<String>, condition: Condition, time: f64, error: f64) -> Self {
        Self {
            participant_id: participant_id.into(),
            condition,
            time,
            error,
            trial_index: None,
        }
    }

    /// Set the trial index.
    #[must_use]
    pub const fn with_trial_index(mut self, trial_index: u8) -> Self {
        self.trial_index = Some(trial_index);
        self
    }
}
