//! Statistics engine
//!
//! Per outcome measure:
//!
//! ```text
//! TrialTable ──► descriptives (per condition)
//!            ──► wide (complete cases) ──► Friedman ──► pairwise + Holm
//!            ──► normality (conditions, residuals, differences)
//!            ──► learning-curve mixed model (needs trial indices)
//! ```
//!
//! Each test that can fail on degenerate data stores its outcome as
//! `Result<_, TestFailure>` in the [`MeasureAnalysis`] bundle, so a failing
//! test never prevents its siblings from running.

mod descriptive;
mod friedman;
mod linear;
mod mixed;
mod normality;
mod optimize;
mod pairwise;
mod rank;

pub use descriptive::{describe, describe_conditions, median, Descriptives};
pub use friedman::{friedman, FriedmanResult};
pub use linear::{ols, ols_residuals, DesignMatrix, OlsFit};
pub use mixed::{fit_learning_curve, CoefficientRow, LearningCurveFit, RandomEffects, TRIAL_LEVELS};
pub use normality::{
    anova_residuals, normality_checks, shapiro_wilk, NormalityCheck, NormalityTarget, ShapiroWilk,
    SHAPIRO_MAX_N, SHAPIRO_MIN_N,
};
pub use optimize::{Minimum, NelderMead};
pub use pairwise::{
    holm, paired_t_test, pairwise_tests, wilcoxon_signed_rank, PairwiseComparison, PairwiseTable,
    EXACT_WILCOXON_MAX_N,
};
pub use rank::{average_ranks, tie_term};

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::TestFailure;
use crate::trial::{Measure, TrialTable};

/// Outcome of one test: the result, or a labeled failure.
pub type TestOutcome<T> = std::result::Result<T, TestFailure>;

/// Everything computed for one outcome measure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureAnalysis {
    /// Measure analysed
    pub measure: Measure,
    /// Per-condition summaries
    pub descriptives: Vec<Descriptives>,
    /// Omnibus test
    pub friedman: TestOutcome<FriedmanResult>,
    /// Corrected pairwise comparisons
    pub pairwise: TestOutcome<PairwiseTable>,
    /// Normality diagnostics
    pub normality: Vec<NormalityCheck>,
    /// Mixed-effects learning curve
    pub learning_curve: TestOutcome<LearningCurveFit>,
}

impl MeasureAnalysis {
    /// Labeled failures of this measure's tests.
    #[must_use]
    pub fn failures(&self) -> Vec<&TestFailure> {
        [
            self.friedman.as_ref().err(),
            self.pairwise.as_ref().err(),
            self.learning_curve.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Run every test on one measure.
#[must_use]
pub fn analyze_measure(table: &TrialTable, measure: Measure, config: &AnalysisConfig) -> MeasureAnalysis {
    let conditions = config.conditions();
    let name = measure.name();
    let wide = table.wide(measure, conditions);
    tracing::info!(measure = name, complete_participants = wide.n_subjects(), "analysing measure");

    let friedman = friedman(&wide, name).map_err(TestFailure::from);
    let pairwise = pairwise_tests(&wide, name, config.pairwise_mode()).map_err(TestFailure::from);
    let learning_curve =
        fit_learning_curve(table, measure, conditions, config.alpha()).map_err(TestFailure::from);

    let analysis = MeasureAnalysis {
        measure,
        descriptives: describe_conditions(table, measure, conditions),
        friedman,
        pairwise,
        normality: normality_checks(table, measure, conditions, config.alpha()),
        learning_curve,
    };
    for failure in analysis.failures() {
        tracing::warn!(test = %failure.test, measure = name, reason = %failure.reason, "statistical test failed");
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::{Condition, TrialRecord};

    #[test]
    fn test_degenerate_measure_keeps_siblings() {
        // one participant only: omnibus and pairwise fail, descriptives survive
        let table = TrialTable::new(
            Condition::ALL
                .iter()
                .map(|&c| TrialRecord::new("01", c, 100.0 + f64::from(c.code()), 700.0))
                .collect(),
        );
        let config = AnalysisConfig::builder(".").build().unwrap();
        let analysis = analyze_measure(&table, Measure::Time, &config);
        assert_eq!(analysis.descriptives.len(), 3);
        assert_eq!(analysis.friedman.as_ref().unwrap_err().test, "friedman");
        assert!(analysis.pairwise.is_err());
        assert_eq!(analysis.failures().len(), 3);
    }
}
