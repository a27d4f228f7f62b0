//! Synthetic study data for demos and tests
//!
//! Produces a `json_logs/` directory in the same shape real sessions write,
//! plus a counterbalanced `order.xlsx` schedule to go with it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use rand::Rng;
use rust_xlsxwriter::Workbook;
use serde_json::json;

use super::order::{PARTICIPANT_COLUMN, POSITION_COLUMNS};
use super::Condition;
use crate::{Error, Result};

/// Range completion times are drawn from (seconds).
pub const TIME_RANGE: (f64, f64) = (100.0, 200.0);

/// Range path errors are drawn from.
pub const ERROR_RANGE: (f64, f64) = (500.0, 1500.0);

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Write `n_participants × n_modes × files_per_participant` trial files.
///
/// File names follow `<pid:02>_<mode>_<timestamp><4 random digits>.json`.
/// Returns the written paths.
///
/// # Errors
///
/// Returns error if the directory cannot be created or a file cannot be
/// written.
pub fn generate_fake_json_files<R: Rng>(
    out_dir: &Path,
    n_participants: usize,
    n_modes: u8,
    files_per_participant: usize,
    rng: &mut R,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    for pid in 1..=n_participants {
        let participant_id = format!("{pid:02}");
        for mode in 0..n_modes {
            for _ in 0..files_per_participant {
                let path = loop {
                    let stamp = Local::now().format("%Y%m%d%H%M%S");
                    let suffix: u16 = rng.gen_range(1000..=9999);
                    let candidate =
                        out_dir.join(format!("{participant_id}_{mode}_{stamp}{suffix}.json"));
                    if !candidate.exists() {
                        break candidate;
                    }
                };
                let data = json!({
                    "round_data": {
                        "id": participant_id,
                        "mode": mode,
                        "t": round6(rng.gen_range(TIME_RANGE.0..=TIME_RANGE.1)),
                        "mse": round6(rng.gen_range(ERROR_RANGE.0..=ERROR_RANGE.1)),
                    }
                });
                fs::write(&path, serde_json::to_string(&data)?)?;
                written.push(path);
            }
        }
    }

    Ok(written)
}

/// Counterbalanced condition sequence for the `index`-th participant.
///
/// Cycles through rotations, then reversed rotations, so six consecutive
/// participants cover every ordering of three conditions.
#[must_use]
pub fn counterbalanced_sequence(index: usize, conditions: &[Condition]) -> Vec<Condition> {
    let k = conditions.len();
    if k == 0 {
        return Vec::new();
    }
    let base = index % k;
    let reversed = (index / k) % 2 == 1;
    (0..k)
        .map(|p| {
            let j = if reversed { (base + k - p) % k } else { (base + p) % k };
            conditions[j]
        })
        .collect()
}

/// Write an order spreadsheet: a title row, the header row, then one row per
/// participant with [`counterbalanced_sequence`] orderings.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for more conditions than position columns,
/// or [`Error::Report`] if the workbook cannot be written.
pub fn write_order_table(path: &Path, participants: &[String], conditions: &[Condition]) -> Result<()> {
    if conditions.len() > POSITION_COLUMNS.len() {
        return Err(Error::InvalidInput(format!(
            "order table supports at most {} conditions",
            POSITION_COLUMNS.len()
        )));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let xlsx = |e: rust_xlsxwriter::XlsxError| Error::Report(format!("order table: {e}"));
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Counterbalancing order").map_err(xlsx)?;
    sheet.write_string(1, 0, PARTICIPANT_COLUMN).map_err(xlsx)?;
    for (col, name) in (1u16..).zip(POSITION_COLUMNS.iter()) {
        sheet.write_string(1, col, *name).map_err(xlsx)?;
    }

    for (i, (row, pid)) in (2u32..).zip(participants.iter()).enumerate() {
        match pid.parse::<u32>() {
            Ok(n) => sheet.write_number(row, 0, f64::from(n)).map_err(xlsx)?,
            Err(_) => sheet.write_string(row, 0, pid.as_str()).map_err(xlsx)?,
        };
        for (col, condition) in (1u16..).zip(counterbalanced_sequence(i, conditions)) {
            sheet
                .write_number(row, col, f64::from(condition.code()))
                .map_err(xlsx)?;
        }
    }

    workbook.save(path).map_err(xlsx)?;
    Ok(())
}
