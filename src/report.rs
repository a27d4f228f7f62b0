//! Results workbook and JSON summary
//!
//! `results/results_summary.xlsx` holds one sheet per measure per test
//! (`time_friedman`, `error_pairwise`, ...) and a `Metadata` index sheet
//! listing every test with its sheet and status. Failed tests are listed in
//! the index with their reason and get no sheet of their own.
//!
//! `results/results_summary.json` carries the same bundle through serde.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};

use crate::annotate::significance_label;
use crate::error::TestFailure;
use crate::stats::{
    Descriptives, FriedmanResult, LearningCurveFit, MeasureAnalysis, NormalityCheck, PairwiseTable,
};
use crate::{Error, Result};

/// Workbook file name inside the results directory.
pub const WORKBOOK_FILE: &str = "results_summary.xlsx";
/// JSON summary file name inside the results directory.
pub const JSON_FILE: &str = "results_summary.json";
/// Index sheet name.
pub const METADATA_SHEET: &str = "Metadata";
/// Sheet written when there is nothing to report.
pub const EMPTY_SHEET: &str = "Empty";

/// Serializable bundle of one run's results.
///
/// Write-only: `serde_json` emits non-finite statistics as `null`, which an
/// `f64` field cannot read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsSummary {
    /// When the analysis ran
    pub generated_at: DateTime<Utc>,
    /// Significance level used for labels
    pub alpha: f64,
    /// Rows in the joined trial table
    pub n_records: usize,
    /// Distinct participants in the trial table
    pub n_participants: usize,
    /// Per-measure results
    pub analyses: Vec<MeasureAnalysis>,
}

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Text
    Text(String),
    /// Number; non-finite values are written as text
    Number(f64),
    /// Nothing
    Empty,
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<usize> for Cell {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: usize) -> Self {
        Self::Number(v as f64)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::Empty, Self::Number)
    }
}

/// A sheet before it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    /// Sheet name (≤ 31 characters)
    pub name: String,
    /// Bold first row
    pub header: Vec<String>,
    /// Body rows
    pub rows: Vec<Vec<Cell>>,
}

impl SheetData {
    fn new(name: impl Into<String>, header: &[&str]) -> Self {
        Self {
            name: name.into(),
            header: header.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }
}

/// One line of the `Metadata` sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetEntry {
    /// Measure name
    pub label: String,
    /// Test name
    pub test: String,
    /// Sheet holding the result, if it succeeded
    pub sheet: Option<String>,
    /// `"ok"` or the failure reason
    pub status: String,
}

fn sheet_name(analysis: &MeasureAnalysis, test: &str) -> String {
    format!("{}_{test}", analysis.measure.name())
}

fn descriptives_sheet(name: String, rows: &[Descriptives]) -> SheetData {
    let mut sheet = SheetData::new(name, &["Condition", "n", "mean", "sd", "median", "min", "max"]);
    for d in rows {
        sheet.rows.push(vec![
            d.condition.to_string().into(),
            d.n.into(),
            d.mean.into(),
            d.sd.into(),
            d.median.into(),
            d.min.into(),
            d.max.into(),
        ]);
    }
    sheet
}

fn friedman_sheet(name: String, result: &FriedmanResult) -> SheetData {
    let mut sheet = SheetData::new(name, &["Source", "W", "ddof1", "Q", "n", "p-unc"]);
    sheet.rows.push(vec![
        "condition".into(),
        result.kendall_w.into(),
        result.ddof.into(),
        result.q.into(),
        result.n.into(),
        result.p_value.into(),
    ]);
    sheet
}

fn pairwise_sheet(name: String, table: &PairwiseTable, alpha: f64) -> SheetData {
    let mut sheet = SheetData::new(
        name,
        &[
            "A", "B", "n", "Parametric", "Statistic", "dof", "Mean diff", "p-unc", "p-corr",
            "p-adjust", "Sig",
        ],
    );
    for row in &table.rows {
        sheet.rows.push(vec![
            row.a.to_string().into(),
            row.b.to_string().into(),
            row.n.into(),
            if row.parametric { "True" } else { "False" }.into(),
            row.statistic.into(),
            row.dof.into(),
            row.mean_difference.into(),
            row.p_unc.into(),
            row.p_corr.into(),
            table.p_adjust.as_str().into(),
            significance_label(row.p_corr, alpha).into(),
        ]);
    }
    sheet
}

fn normality_sheet(name: String, checks: &[NormalityCheck]) -> SheetData {
    let mut sheet = SheetData::new(name, &["Target", "n", "W", "pval", "normal", "note"]);
    for check in checks {
        let normal = match check.normal {
            Some(true) => "True",
            Some(false) => "False",
            None => "",
        };
        let row: Vec<Cell> = match &check.outcome {
            Ok(sw) => vec![
                check.target.to_string().into(),
                sw.n.into(),
                sw.w.into(),
                sw.p_value.into(),
                normal.into(),
                Cell::Empty,
            ],
            Err(reason) => vec![
                check.target.to_string().into(),
                Cell::Empty,
                Cell::Empty,
                Cell::Empty,
                Cell::Empty,
                reason.clone().into(),
            ],
        };
        sheet.rows.push(row);
    }
    sheet
}

fn learning_curve_sheet(name: String, fit: &LearningCurveFit) -> SheetData {
    let mut sheet = SheetData::new(name, &["Term", "Coef.", "Std.Err.", "z", "P>|z|", "Sig"]);
    for c in &fit.coefficients {
        sheet.rows.push(vec![
            c.term.as_str().into(),
            c.estimate.into(),
            c.std_error.into(),
            c.z.into(),
            c.p_value.into(),
            c.stars.as_str().into(),
        ]);
    }
    sheet.rows.push(Vec::new());
    let re = &fit.random_effects;
    let summary: [(&str, Cell); 9] = [
        ("Group Var", re.intercept_variance.into()),
        ("Group x trial Cov", re.covariance.into()),
        ("trial Var", re.slope_variance.into()),
        ("Scale", fit.residual_variance.into()),
        ("REML log-likelihood", fit.reml_log_likelihood.into()),
        ("Converged", if fit.converged { "Yes" } else { "No" }.into()),
        ("No. Observations", fit.n_obs.into()),
        ("No. Groups", fit.n_groups.into()),
        ("Dropped terms", fit.dropped_terms.join(", ").into()),
    ];
    for (label, value) in summary {
        sheet.rows.push(vec![label.into(), value]);
    }
    sheet
}

fn collect<T>(
    analysis: &MeasureAnalysis,
    test: &str,
    outcome: &std::result::Result<T, TestFailure>,
    build: impl FnOnce(String, &T) -> SheetData,
    sheets: &mut Vec<SheetData>,
    entries: &mut Vec<SheetEntry>,
) {
    let label = analysis.measure.name().to_string();
    match outcome {
        Ok(value) => {
            let sheet = build(sheet_name(analysis, test), value);
            entries.push(SheetEntry {
                label,
                test: test.to_string(),
                sheet: Some(sheet.name.clone()),
                status: "ok".to_string(),
            });
            sheets.push(sheet);
        }
        Err(failure) => entries.push(SheetEntry {
            label,
            test: test.to_string(),
            sheet: None,
            status: format!("failed: {}", failure.reason),
        }),
    }
}

/// Lay out every result sheet plus the index entries, without writing.
#[must_use]
pub fn build_sheets(summary: &ResultsSummary) -> (Vec<SheetData>, Vec<SheetEntry>) {
    let mut sheets = Vec::new();
    let mut entries = Vec::new();

    for analysis in &summary.analyses {
        let descriptives: std::result::Result<_, TestFailure> = if analysis.descriptives.is_empty() {
            Err(TestFailure {
                test: "descriptives".to_string(),
                measure: analysis.measure.name().to_string(),
                reason: "no conditions".to_string(),
            })
        } else {
            Ok(analysis.descriptives.as_slice())
        };
        collect(analysis, "descriptives", &descriptives, |n, d| descriptives_sheet(n, d), &mut sheets, &mut entries);
        collect(analysis, "friedman", &analysis.friedman, friedman_sheet, &mut sheets, &mut entries);
        collect(
            analysis,
            "pairwise",
            &analysis.pairwise,
            |n, t| pairwise_sheet(n, t, summary.alpha),
            &mut sheets,
            &mut entries,
        );
        let normality: std::result::Result<_, TestFailure> = Ok(analysis.normality.as_slice());
        collect(analysis, "normality", &normality, |n, c| normality_sheet(n, c), &mut sheets, &mut entries);
        collect(
            analysis,
            "learning_curve",
            &analysis.learning_curve,
            learning_curve_sheet,
            &mut sheets,
            &mut entries,
        );
    }

    (sheets, entries)
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> std::result::Result<(), XlsxError> {
    match cell {
        Cell::Text(s) => {
            sheet.write_string(row, col, s.as_str())?;
        }
        Cell::Number(v) if v.is_finite() => {
            sheet.write_number(row, col, *v)?;
        }
        Cell::Number(v) => {
            sheet.write_string(row, col, v.to_string())?;
        }
        Cell::Empty => {}
    }
    Ok(())
}

fn write_sheet(workbook: &mut Workbook, data: &SheetData, bold: &Format) -> std::result::Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(data.name.as_str())?;
    for (col, title) in (0u16..).zip(&data.header) {
        sheet.write_string_with_format(0, col, title.as_str(), bold)?;
    }
    for (row, cells) in (1u32..).zip(&data.rows) {
        for (col, cell) in (0u16..).zip(cells) {
            write_cell(sheet, row, col, cell)?;
        }
    }
    Ok(())
}

/// Write the results workbook. Returns the index entries.
///
/// # Errors
///
/// Returns [`Error::Report`] if the workbook cannot be built or saved.
pub fn write_workbook(path: &Path, summary: &ResultsSummary) -> Result<Vec<SheetEntry>> {
    let xlsx = |e: XlsxError| Error::Report(format!("{}: {e}", path.display()));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let (sheets, entries) = build_sheets(summary);
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();

    if entries.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(EMPTY_SHEET).map_err(xlsx)?;
        sheet
            .write_string(0, 0, "No statistical results were produced.")
            .map_err(xlsx)?;
    } else {
        for data in &sheets {
            write_sheet(&mut workbook, data, &bold).map_err(xlsx)?;
        }
        let mut index = SheetData::new(METADATA_SHEET, &["Label", "Test", "Sheet", "Status"]);
        for entry in &entries {
            index.rows.push(vec![
                entry.label.as_str().into(),
                entry.test.as_str().into(),
                entry.sheet.clone().unwrap_or_default().into(),
                entry.status.as_str().into(),
            ]);
        }
        write_sheet(&mut workbook, &index, &bold).map_err(xlsx)?;
    }

    workbook.save(path).map_err(xlsx)?;
    tracing::info!(path = %path.display(), sheets = sheets.len(), "results workbook written");
    Ok(entries)
}

/// Write the JSON summary.
///
/// # Errors
///
/// Returns error if serialization or the write fails.
pub fn write_json_summary(path: &Path, summary: &ResultsSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

/// Paths written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// Workbook
    pub workbook: PathBuf,
    /// JSON summary
    pub json: PathBuf,
    /// Index entries
    pub entries: Vec<SheetEntry>,
}

/// Write workbook and JSON summary into `results_dir`.
///
/// # Errors
///
/// See [`write_workbook`] and [`write_json_summary`].
pub fn write_reports(results_dir: &Path, summary: &ResultsSummary) -> Result<ReportPaths> {
    let workbook = results_dir.join(WORKBOOK_FILE);
    let json = results_dir.join(JSON_FILE);
    let entries = write_workbook(&workbook, summary)?;
    write_json_summary(&json, summary)?;
    Ok(ReportPaths {
        workbook,
        json,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::stats::analyze_measure;
    use crate::trial::{Condition, Measure, TrialRecord, TrialTable};
    use calamine::{open_workbook_auto, Reader};

    fn summary(analyses: Vec<MeasureAnalysis>) -> ResultsSummary {
        ResultsSummary {
            generated_at: Utc::now(),
            alpha: 0.05,
            n_records: 0,
            n_participants: 0,
            analyses,
        }
    }

    fn one_participant() -> MeasureAnalysis {
        let table = TrialTable::new(
            Condition::ALL
                .iter()
                .map(|&c| TrialRecord::new("01", c, 100.0, 700.0))
                .collect(),
        );
        let config = AnalysisConfig::builder(".").build().unwrap();
        analyze_measure(&table, Measure::Time, &config)
    }

    #[test]
    fn test_failed_tests_have_no_sheet() {
        let (sheets, entries) = build_sheets(&summary(vec![one_participant()]));
        let names: Vec<_> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["time_descriptives", "time_normality"]);
        let friedman = entries.iter().find(|e| e.test == "friedman").unwrap();
        assert!(friedman.sheet.is_none());
        assert!(friedman.status.starts_with("failed"));
    }

    #[test]
    fn test_empty_summary_writes_empty_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WORKBOOK_FILE);
        let entries = write_workbook(&path, &summary(Vec::new())).unwrap();
        assert!(entries.is_empty());

        let workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec![EMPTY_SHEET.to_string()]);
    }

    #[test]
    fn test_workbook_and_json_round_trip_names() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_reports(dir.path(), &summary(vec![one_participant()])).unwrap();

        let workbook = open_workbook_auto(&paths.workbook).unwrap();
        let names = workbook.sheet_names();
        assert!(names.contains(&"time_descriptives".to_string()));
        assert_eq!(names.last().map(String::as_str), Some(METADATA_SHEET));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json["analyses"][0]["measure"], "time");
    }

    #[test]
    fn test_json_writes_undefined_statistics_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(JSON_FILE);
        let analysis = one_participant();
        assert!(analysis.descriptives[0].sd.is_nan());
        write_json_summary(&path, &summary(vec![analysis])).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["analyses"][0]["descriptives"][0]["sd"].is_null());
    }

    #[test]
    fn test_non_finite_cells_become_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nan.xlsx");
        let mut workbook = Workbook::new();
        let data = SheetData {
            name: "nan".to_string(),
            header: vec!["v".to_string()],
            rows: vec![vec![Cell::Number(f64::NAN)]],
        };
        write_sheet(&mut workbook, &data, &Format::new()).unwrap();
        workbook.save(&path).unwrap();

        let mut reader = open_workbook_auto(&path).unwrap();
        let range = reader.worksheet_range("nan").unwrap();
        assert_eq!(range.get_value((1, 0)).map(ToString::to_string), Some("NaN".to_string()));
    }
}
