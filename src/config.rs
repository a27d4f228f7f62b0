//! Analysis configuration
//!
//! Everything a run needs besides the data itself: directory layout under the
//! data root, statistical settings, and per-measure figure settings.
//!
//! ```rust
//! use trial_analysis::config::{AnalysisConfig, PairwiseMode};
//!
//! let config = AnalysisConfig::builder("./data")
//!     .alpha(0.05)
//!     .pairwise_mode(PairwiseMode::NonParametric)
//!     .build()
//!     .unwrap();
//! assert!(config.order_path().ends_with("other/order.xlsx"));
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::trial::{Condition, Measure};
use crate::{Error, Result};

/// Which family of pairwise tests to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairwiseMode {
    /// Wilcoxon signed-rank tests
    #[default]
    NonParametric,
    /// Paired t-tests
    Parametric,
}

/// Default display names of the three conditions.
#[must_use]
pub fn default_condition_labels() -> BTreeMap<Condition, String> {
    [
        (Condition::new(0), "Baseline"),
        (Condition::new(1), "Visual Assistance"),
        (Condition::new(2), "Haptic Guidance"),
    ]
    .into_iter()
    .map(|(c, label)| (c, label.to_string()))
    .collect()
}

/// Box-and-strip plot settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxPlotConfig {
    /// Figure title; also names the output file
    pub title: String,
    /// Label of the measure axis
    pub x_label: String,
    /// Label of the condition axis
    pub y_label: String,
    /// Condition order, top to bottom
    pub order: Vec<Condition>,
    /// Optional fixed measure-axis range
    pub limits: Option<(f64, f64)>,
    /// Display names of conditions
    pub condition_labels: BTreeMap<Condition, String>,
}

impl BoxPlotConfig {
    /// Defaults for a measure.
    #[must_use]
    pub fn for_measure(measure: Measure) -> Self {
        let (title, x_label) = match measure {
            Measure::Time => ("Completion Time by Condition", "time (s)"),
            Measure::Error => ("Path following MSE by Condition", "mse (m^2)"),
        };
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: "Condition".to_string(),
            order: Condition::ALL.to_vec(),
            limits: None,
            condition_labels: default_condition_labels(),
        }
    }
}

/// Learning-curve plot settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCurveConfig {
    /// Figure title; also names the output file
    pub title: String,
    /// Label of the trial axis
    pub x_label: String,
    /// Label of the measure axis
    pub y_label: String,
    /// Legend order of conditions
    pub order: Vec<Condition>,
    /// Flip the measure axis (lower is better reads upward)
    pub invert_y: bool,
    /// Display names of conditions
    pub condition_labels: BTreeMap<Condition, String>,
}

impl LearningCurveConfig {
    /// Defaults for a measure.
    #[must_use]
    pub fn for_measure(measure: Measure) -> Self {
        let (title, y_label) = match measure {
            Measure::Time => ("Learning Curve Completion Time", "time (s)"),
            Measure::Error => ("Learning Curve Path following MSE", "mse (m^2)"),
        };
        Self {
            title: title.to_string(),
            x_label: "Trial".to_string(),
            y_label: y_label.to_string(),
            order: Condition::ALL.to_vec(),
            invert_y: false,
            condition_labels: default_condition_labels(),
        }
    }
}

/// Full configuration of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    data_dir: PathBuf,
    exclusion_marker: String,
    conditions: Vec<Condition>,
    alpha: f64,
    pairwise_mode: PairwiseMode,
    omnibus_gate: Option<f64>,
    box_plots: BTreeMap<String, BoxPlotConfig>,
    learning_curves: BTreeMap<String, LearningCurveConfig>,
}

impl AnalysisConfig {
    /// Start a builder rooted at `data_dir`.
    #[must_use]
    pub fn builder(data_dir: impl Into<PathBuf>) -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new(data_dir)
    }

    /// Data root.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<data>/json_logs`
    #[must_use]
    pub fn json_dir(&self) -> PathBuf {
        self.data_dir.join("json_logs")
    }

    /// `<data>/other/order.xlsx`
    #[must_use]
    pub fn order_path(&self) -> PathBuf {
        self.data_dir.join("other").join("order.xlsx")
    }

    /// `<data>/results`
    #[must_use]
    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    /// `<data>/plots`
    #[must_use]
    pub fn plots_dir(&self) -> PathBuf {
        self.data_dir.join("plots")
    }

    /// File-name marker that excludes a trial file from loading.
    #[must_use]
    pub fn exclusion_marker(&self) -> &str {
        &self.exclusion_marker
    }

    /// Required condition levels, in level order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Significance level.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Pairwise test family.
    #[must_use]
    pub const fn pairwise_mode(&self) -> PairwiseMode {
        self.pairwise_mode
    }

    /// Omnibus p-value above which all pairs are annotated "ns".
    #[must_use]
    pub const fn omnibus_gate(&self) -> Option<f64> {
        self.omnibus_gate
    }

    /// Box plot settings of a measure.
    #[must_use]
    pub fn box_plot(&self, measure: Measure) -> BoxPlotConfig {
        self.box_plots
            .get(measure.name())
            .cloned()
            .unwrap_or_else(|| BoxPlotConfig::for_measure(measure))
    }

    /// Learning-curve settings of a measure.
    #[must_use]
    pub fn learning_curve(&self, measure: Measure) -> LearningCurveConfig {
        self.learning_curves
            .get(measure.name())
            .cloned()
            .unwrap_or_else(|| LearningCurveConfig::for_measure(measure))
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// Defaults: marker `"trial"`, conditions 0/1/2, alpha 0.05,
    /// non-parametric pairwise tests, no omnibus gate.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: AnalysisConfig {
                data_dir: data_dir.into(),
                exclusion_marker: "trial".to_string(),
                conditions: Condition::ALL.to_vec(),
                alpha: 0.05,
                pairwise_mode: PairwiseMode::NonParametric,
                omnibus_gate: None,
                box_plots: BTreeMap::new(),
                learning_curves: BTreeMap::new(),
            },
        }
    }

    /// Set the exclusion marker (empty disables exclusion).
    #[must_use]
    pub fn exclusion_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.exclusion_marker = marker.into();
        self
    }

    /// Set the required condition levels.
    #[must_use]
    pub fn conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.config.conditions = conditions;
        self
    }

    /// Set the significance level.
    #[must_use]
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;
        self
    }

    /// Set the pairwise test family.
    #[must_use]
    pub fn pairwise_mode(mut self, mode: PairwiseMode) -> Self {
        self.config.pairwise_mode = mode;
        self
    }

    /// Gate pairwise annotations on the omnibus p-value.
    #[must_use]
    pub fn omnibus_gate(mut self, threshold: Option<f64>) -> Self {
        self.config.omnibus_gate = threshold;
        self
    }

    /// Override box plot settings of a measure.
    #[must_use]
    pub fn box_plot(mut self, measure: Measure, plot: BoxPlotConfig) -> Self {
        self.config.box_plots.insert(measure.name().to_string(), plot);
        self
    }

    /// Override learning-curve settings of a measure.
    #[must_use]
    pub fn learning_curve(mut self, measure: Measure, plot: LearningCurveConfig) -> Self {
        self.config
            .learning_curves
            .insert(measure.name().to_string(), plot);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if alpha or the gate is outside (0, 1)
    /// or fewer than two distinct conditions are configured.
    pub fn build(self) -> Result<AnalysisConfig> {
        let config = self.config;
        if !(config.alpha > 0.0 && config.alpha < 1.0) {
            return Err(Error::InvalidInput(format!(
                "alpha must be in (0, 1), got {}",
                config.alpha
            )));
        }
        if let Some(gate) = config.omnibus_gate {
            if !(gate > 0.0 && gate < 1.0) {
                return Err(Error::InvalidInput(format!(
                    "omnibus gate must be in (0, 1), got {gate}"
                )));
            }
        }
        let mut distinct = config.conditions.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 2 || distinct.len() != config.conditions.len() {
            return Err(Error::InvalidInput(
                "at least two distinct conditions are required".to_string(),
            ));
        }
        Ok(config)
    }
}
