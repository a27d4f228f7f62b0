//! Trial-Order Joiner
//!
//! The counterbalancing schedule lives in `other/order.xlsx`:
//!
//! ```text
//! row 0   <title row, ignored>
//! row 1   participantID | condA | condB | condC
//! row 2.. 1             | 0     | 2     | 1
//! ```
//!
//! `condA..condC` name the condition run at trial positions 1..3. The joiner
//! turns that into participant → condition → trial index and attaches the index
//! to every record. Unknown participants or conditions leave the index empty.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{normalize_participant_id, Condition, TrialTable};
use crate::{Error, Result};

/// Header of the participant column.
pub const PARTICIPANT_COLUMN: &str = "participantID";

/// Headers of the trial-position columns, in trial order.
pub const POSITION_COLUMNS: [&str; 3] = ["condA", "condB", "condC"];

/// Participant → (condition → 1-based trial index).
///
/// Built once, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderMapping {
    entries: BTreeMap<String, BTreeMap<Condition, u8>>,
}

impl OrderMapping {
    /// Build from `(participant, [condition at position 1, 2, 3...])` rows.
    ///
    /// Participant ids are normalized; `None` positions are skipped.
    #[must_use]
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Option<Condition>>)>,
        S: AsRef<str>,
    {
        let mut entries = BTreeMap::new();
        for (pid, positions) in rows {
            let mut mode_to_trial = BTreeMap::new();
            for (i, condition) in positions.into_iter().enumerate() {
                if let (Some(condition), Ok(trial)) = (condition, u8::try_from(i + 1)) {
                    mode_to_trial.insert(condition, trial);
                }
            }
            entries.insert(normalize_participant_id(pid.as_ref()), mode_to_trial);
        }
        Self { entries }
    }

    /// Read the order spreadsheet.
    ///
    /// The first row is skipped; the second row is the header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingInput`] if the file does not exist and
    /// [`Error::OrderTable`] if it cannot be parsed or lacks a required column.
    pub fn from_xlsx<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::MissingInput(format!(
                "order table not found: {}",
                path.display()
            )));
        }

        let mut workbook = open_workbook_auto(path)
            .map_err(|e| Error::OrderTable(format!("Failed to open {}: {e}", path.display())))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| Error::OrderTable("workbook has no sheets".to_string()))?
            .map_err(|e| Error::OrderTable(format!("Failed to read first sheet: {e}")))?;

        let mut rows = range.rows().skip(1);
        let header = rows
            .next()
            .ok_or_else(|| Error::OrderTable("missing header row".to_string()))?;
        let find = |name: &str| -> Result<usize> {
            header
                .iter()
                .position(|cell| cell_text(cell).as_deref() == Some(name))
                .ok_or_else(|| Error::OrderTable(format!("missing column '{name}'")))
        };
        let pid_col = find(PARTICIPANT_COLUMN)?;
        let position_cols = POSITION_COLUMNS
            .iter()
            .map(|name| find(*name))
            .collect::<Result<Vec<_>>>()?;

        let mut parsed = Vec::new();
        for row in rows {
            let Some(pid) = row.get(pid_col).and_then(cell_text) else {
                continue;
            };
            let positions = position_cols
                .iter()
                .map(|&col| {
                    row.get(col)
                        .and_then(cell_text)
                        .and_then(|text| text.parse::<Condition>().ok())
                })
                .collect();
            parsed.push((pid, positions));
        }

        let mapping = Self::from_rows(parsed);
        info!(participants = mapping.len(), "loaded order table {}", path.display());
        Ok(mapping)
    }

    /// Trial index of `condition` for `participant` (normalized id).
    #[must_use]
    pub fn trial_index(&self, participant: &str, condition: Condition) -> Option<u8> {
        self.entries
            .get(participant)
            .and_then(|m| m.get(&condition))
            .copied()
    }

    /// Participants in the schedule.
    #[must_use]
    pub fn participants(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of participants in the schedule.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the schedule is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spreadsheet cell as trimmed text; integral floats lose their `.0`.
fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Int(v) => v.to_string(),
        Data::Float(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Data::Float(v) => v.to_string(),
        Data::String(s) => s.trim().to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Participants present in only one of the two sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReport {
    /// In the data but not in the order table
    pub missing_in_order: BTreeSet<String>,
    /// In the order table but not in the data
    pub extra_in_order: BTreeSet<String>,
    /// Rows left without a trial index
    pub unmatched_rows: usize,
}

/// Attach trial indices to every record.
///
/// Participant ids in the table are normalized in place. Missing matches are
/// not errors: the index stays `None` and the participant shows up in the
/// returned report.
pub fn attach_trial_ids(table: &mut TrialTable, order: &OrderMapping) -> JoinReport {
    let mut unmatched_rows = 0;
    for record in table.records_mut() {
        record.participant_id = normalize_participant_id(&record.participant_id);
        record.trial_index = order.trial_index(&record.participant_id, record.condition);
        if record.trial_index.is_none() {
            unmatched_rows += 1;
        }
    }

    let data_pids = table.participants();
    let order_pids = order.participants();
    let missing_in_order: BTreeSet<String> = data_pids.difference(&order_pids).cloned().collect();
    let extra_in_order: BTreeSet<String> = order_pids.difference(&data_pids).cloned().collect();

    if !missing_in_order.is_empty() {
        warn!(participants = ?missing_in_order, "participants in data but not in the order table");
    }
    if !extra_in_order.is_empty() {
        info!(participants = ?extra_in_order, "participants in the order table but not in data");
    }

    JoinReport {
        missing_in_order,
        extra_in_order,
        unmatched_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::TrialRecord;

    fn c(code: u8) -> Option<Condition> {
        Some(Condition::new(code))
    }

    #[test]
    fn test_from_rows_maps_positions() {
        let order = OrderMapping::from_rows(vec![("1", vec![c(2), c(0), c(1)])]);
        assert_eq!(order.trial_index("01", Condition::new(2)), Some(1));
        assert_eq!(order.trial_index("01", Condition::new(0)), Some(2));
        assert_eq!(order.trial_index("01", Condition::new(1)), Some(3));
        assert_eq!(order.trial_index("02", Condition::new(1)), None);
    }

    #[test]
    fn test_missing_position_is_skipped() {
        let order = OrderMapping::from_rows(vec![("03", vec![c(0), None, c(1)])]);
        assert_eq!(order.trial_index("03", Condition::new(1)), Some(3));
        assert_eq!(order.trial_index("03", Condition::new(2)), None);
    }

    #[test]
    fn test_attach_normalizes_and_reports() {
        let mut table = TrialTable::new(vec![
            TrialRecord::new("1", Condition::new(0), 1.0, 1.0),
            TrialRecord::new("2", Condition::new(0), 1.0, 1.0),
        ]);
        let order = OrderMapping::from_rows(vec![
            ("01", vec![c(0), c(1), c(2)]),
            ("09", vec![c(0), c(1), c(2)]),
        ]);

        let report = attach_trial_ids(&mut table, &order);

        assert_eq!(table.records()[0].participant_id, "01");
        assert_eq!(table.records()[0].trial_index, Some(1));
        assert_eq!(table.records()[1].trial_index, None);
        assert!(report.missing_in_order.contains("02"));
        assert!(report.extra_in_order.contains("09"));
        assert_eq!(report.unmatched_rows, 1);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(4.0)), Some("4".to_string()));
        assert_eq!(cell_text(&Data::Int(12)), Some("12".to_string()));
        assert_eq!(cell_text(&Data::String(" 05 ".to_string())), Some("05".to_string()));
        assert_eq!(cell_text(&Data::Empty), None);
    }
}
