//! End-to-end analysis run
//!
//! ```text
//! check_integrity ─┐
//! load_records ────┼─► attach_trial_ids ─► trials.parquet
//! order.xlsx ──────┘          │
//!                             ▼
//!                  analyze_measure (time, error)
//!                     │                │
//!                     ▼                ▼
//!              results_summary    annotations ─► plots
//! ```
//!
//! Only missing inputs and failed writes of the results abort a run; data
//! problems and failed figures are logged and returned in [`RunSummary`].

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use crate::annotate::{extract_condition_annotations, AnnotationMap};
use crate::config::AnalysisConfig;
use crate::plot::{
    plot_file_name, qq_file_name, render_box_plot, render_learning_curve, render_qq_plot,
    RenderedPlot,
};
use crate::report::{write_reports, ReportPaths, ResultsSummary};
use crate::stats::{analyze_measure, MeasureAnalysis};
use crate::trial::{
    attach_trial_ids, check_integrity, load_records, IntegrityReport, JoinReport, LoadIssue,
    Measure, OrderMapping, TrialTable,
};
use crate::{Error, Result};

/// File name of the joined trial table snapshot.
pub const TRIALS_PARQUET: &str = "trials.parquet";

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Integrity check over the raw files
    pub integrity: IntegrityReport,
    /// Files that could not be loaded
    pub load_issues: Vec<LoadIssue>,
    /// Files skipped by the exclusion marker
    pub excluded: Vec<String>,
    /// Order-table join diagnostics
    pub join: JoinReport,
    /// Joined table snapshot
    pub trials_path: PathBuf,
    /// Statistical results
    pub results: ResultsSummary,
    /// Written report files
    pub reports: ReportPaths,
    /// Every figure attempted
    pub plots: Vec<RenderedPlot>,
}

/// Run every analysis over an already joined table.
#[must_use]
pub fn analyze(table: &TrialTable, config: &AnalysisConfig) -> ResultsSummary {
    ResultsSummary {
        generated_at: Utc::now(),
        alpha: config.alpha(),
        n_records: table.len(),
        n_participants: table.participants().len(),
        analyses: Measure::ALL
            .iter()
            .map(|&m| analyze_measure(table, m, config))
            .collect(),
    }
}

/// Annotation map of one measure, honoring the omnibus gate.
#[must_use]
pub fn annotations_for(analysis: &MeasureAnalysis, config: &AnalysisConfig) -> AnnotationMap {
    let omnibus = config.omnibus_gate().map(|gate| {
        let p = analysis.friedman.as_ref().map_or(f64::NAN, |f| f.p_value);
        (p, gate)
    });
    extract_condition_annotations(analysis.pairwise.as_ref().ok(), omnibus, config.alpha(), None)
}

/// Render every figure; failures are recorded, never raised.
#[must_use]
pub fn render_figures(
    table: &TrialTable,
    results: &ResultsSummary,
    config: &AnalysisConfig,
) -> Vec<RenderedPlot> {
    let plots_dir = config.plots_dir();
    let mut rendered = Vec::new();
    let mut next_id = 0;

    for analysis in &results.analyses {
        let measure = analysis.measure;
        let annotations = annotations_for(analysis, config);

        let box_config = config.box_plot(measure);
        let path = plots_dir.join(plot_file_name(&box_config.title, next_id));
        next_id += 1;
        let result = render_box_plot(&path, table, measure, &box_config, &annotations);
        rendered.push(RenderedPlot::from_result(path, result));

        let curve_config = config.learning_curve(measure);
        let path = plots_dir.join(plot_file_name(&curve_config.title, next_id));
        next_id += 1;
        let result = render_learning_curve(&path, table, measure, &curve_config);
        rendered.push(RenderedPlot::from_result(path, result));

        for &condition in config.conditions() {
            let path = plots_dir.join(qq_file_name(condition, measure));
            let title = format!("QQ plot: condition {condition}, {}", measure.name());
            let result = render_qq_plot(&path, &table.values(measure, condition), &title);
            rendered.push(RenderedPlot::from_result(path, result));
        }
    }

    rendered
}

/// Run the whole analysis for one data directory.
///
/// # Errors
///
/// Returns [`Error::MissingInput`] when `json_logs/` or `other/order.xlsx` is
/// missing, and propagates failures to read the order table or write the
/// results.
pub fn run(config: &AnalysisConfig) -> Result<RunSummary> {
    let json_dir = config.json_dir();
    let order_path = config.order_path();
    if !json_dir.is_dir() {
        return Err(Error::MissingInput(json_dir.display().to_string()));
    }
    if !order_path.is_file() {
        return Err(Error::MissingInput(order_path.display().to_string()));
    }
    info!(data_dir = %config.data_dir().display(), "starting analysis");

    let integrity = check_integrity(&json_dir, config.conditions())?;
    let loaded = load_records(&json_dir, config.exclusion_marker())?;
    let mut table = loaded.table;
    let order = OrderMapping::from_xlsx(&order_path)?;
    let join = attach_trial_ids(&mut table, &order);

    let trials_path = config.results_dir().join(TRIALS_PARQUET);
    std::fs::create_dir_all(config.results_dir())?;
    table.save_parquet(&trials_path)?;

    let results = analyze(&table, config);
    let reports = write_reports(&config.results_dir(), &results)?;
    let plots = render_figures(&table, &results, config);

    let failed_plots = plots.iter().filter(|p| p.failure.is_some()).count();
    if failed_plots > 0 {
        warn!(failed_plots, total = plots.len(), "some figures were not rendered");
    }
    info!(
        workbook = %reports.workbook.display(),
        plots = plots.len() - failed_plots,
        "analysis complete"
    );

    Ok(RunSummary {
        integrity,
        load_issues: loaded.issues,
        excluded: loaded.excluded,
        join,
        trials_path,
        results,
        reports,
        plots,
    })
}
