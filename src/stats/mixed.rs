//! Mixed-effects learning-curve model
//!
//! ```text
//! y ~ C(trial) * C(condition)  +  (1 + trial | participant)
//! ```
//!
//! Trial levels 1,2,3 and the configured condition levels are treatment-coded
//! against their first level; interaction columns that the data cannot
//! identify are dropped. Each participant gets a random intercept and a random
//! slope on the numeric trial index with an unstructured 2×2 covariance
//! `σ² ΛΛᵀ`, `Λ` lower-triangular.
//!
//! Fitting is REML: σ² and β are profiled out, and the remaining deviance in
//! `θ = (λ11, λ21, λ22)` is minimised with Nelder-Mead.

use nalgebra::{DMatrix, DVector, Matrix2};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::linear::DesignMatrix;
use super::optimize::NelderMead;
use crate::annotate::significance_label;
use crate::trial::{Condition, Measure, TrialRecord, TrialTable};
use crate::{Error, Result};

/// Trial index levels, in order.
pub const TRIAL_LEVELS: [u8; 3] = [1, 2, 3];

/// One fixed-effect coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    /// Term name, e.g. `trial[2]:condition[1]`
    pub term: String,
    /// Estimate
    pub estimate: f64,
    /// Standard error
    pub std_error: f64,
    /// Wald z
    pub z: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Significance label
    pub stars: String,
}

/// Estimated random-effect covariance (absolute scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomEffects {
    /// Variance of participant intercepts
    pub intercept_variance: f64,
    /// Variance of participant trial slopes
    pub slope_variance: f64,
    /// Intercept/slope covariance
    pub covariance: f64,
}

impl RandomEffects {
    /// Intercept/slope correlation (`NaN` if a variance is zero).
    #[must_use]
    pub fn correlation(&self) -> f64 {
        let denom = (self.intercept_variance * self.slope_variance).sqrt();
        if denom > 0.0 {
            self.covariance / denom
        } else {
            f64::NAN
        }
    }
}

/// Summary of a fitted learning-curve model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCurveFit {
    /// Observations used
    pub n_obs: usize,
    /// Participants
    pub n_groups: usize,
    /// Fixed effects
    pub coefficients: Vec<CoefficientRow>,
    /// Terms dropped as not estimable
    pub dropped_terms: Vec<String>,
    /// Random-effect covariance
    pub random_effects: RandomEffects,
    /// Residual variance σ²
    pub residual_variance: f64,
    /// Restricted log-likelihood at the optimum
    pub reml_log_likelihood: f64,
    /// Optimizer reached its tolerance
    pub converged: bool,
    /// Optimizer iterations
    pub iterations: usize,
}

struct Group {
    x: DMatrix<f64>,
    y: DVector<f64>,
    z: DMatrix<f64>,
}

struct RemlState {
    deviance: f64,
    beta: DVector<f64>,
    xtvx: DMatrix<f64>,
    r2: f64,
}

struct RemlProblem {
    groups: Vec<Group>,
    n: usize,
    p: usize,
}

impl RemlProblem {
    fn lambda(theta: &[f64]) -> Matrix2<f64> {
        Matrix2::new(theta[0], 0.0, theta[1], theta[2])
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, theta: &[f64]) -> Option<RemlState> {
        let lambda = Self::lambda(theta);
        let g = lambda * lambda.transpose();
        let g = DMatrix::from_column_slice(2, 2, g.as_slice());

        let mut log_det_v = 0.0;
        let mut xtvx = DMatrix::<f64>::zeros(self.p, self.p);
        let mut xtvy = DVector::<f64>::zeros(self.p);
        let mut ytvy = 0.0;

        for group in &self.groups {
            let m = group.y.len();
            let v = DMatrix::<f64>::identity(m, m) + &group.z * &g * group.z.transpose();
            let chol = v.cholesky()?;
            log_det_v += 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
            let vx = chol.solve(&group.x);
            let vy = chol.solve(&group.y);
            xtvx += group.x.transpose() * &vx;
            xtvy += group.x.transpose() * &vy;
            ytvy += group.y.dot(&vy);
        }

        let a = xtvx.clone().cholesky()?;
        let log_det_a = 2.0 * a.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        let beta = a.solve(&xtvy);
        let r2 = ytvy - beta.dot(&xtvy);
        if r2.is_nan() || r2 <= 0.0 {
            return None;
        }
        let dof = (self.n - self.p) as f64;
        let deviance = log_det_v
            + log_det_a
            + dof * (1.0 + (2.0 * std::f64::consts::PI * r2 / dof).ln());

        Some(RemlState {
            deviance,
            beta,
            xtvx,
            r2,
        })
    }
}

fn trial_of(record: &TrialRecord) -> u8 {
    record.trial_index.unwrap_or(0)
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Fit the learning-curve model for one measure.
///
/// Rows need a finite value, a trial index and one of `conditions`.
///
/// # Errors
///
/// Returns [`Error::Statistics`] when fewer than two participants have usable
/// rows, there are no more observations than fixed effects, or the REML
/// deviance cannot be evaluated.
#[allow(clippy::cast_precision_loss, clippy::too_many_lines)]
pub fn fit_learning_curve(
    table: &TrialTable,
    measure: Measure,
    conditions: &[Condition],
    alpha: f64,
) -> Result<LearningCurveFit> {
    let fail = |reason: String| Error::statistics("learning_curve", measure.name(), reason);
    if conditions.is_empty() {
        return Err(fail("no condition levels configured".to_string()));
    }

    let mut rows: Vec<_> = table
        .records()
        .iter()
        .filter(|r| {
            measure.value(r).is_finite()
                && conditions.contains(&r.condition)
                && r.trial_index.is_some_and(|t| TRIAL_LEVELS.contains(&t))
        })
        .collect();
    if rows.is_empty() {
        return Err(fail("no observations with a trial index".to_string()));
    }
    rows.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));

    let n = rows.len();

    let mut design = DesignMatrix::new(n);
    design.push_column("Intercept", vec![1.0; n]);
    for &t in &TRIAL_LEVELS[1..] {
        design.push_column(
            format!("trial[{t}]"),
            rows.iter().map(|r| indicator(trial_of(r) == t)).collect(),
        );
    }
    for &c in &conditions[1..] {
        design.push_column(
            format!("condition[{c}]"),
            rows.iter().map(|r| indicator(r.condition == c)).collect(),
        );
    }
    for &t in &TRIAL_LEVELS[1..] {
        for &c in &conditions[1..] {
            design.push_column(
                format!("trial[{t}]:condition[{c}]"),
                rows.iter()
                    .map(|r| indicator(trial_of(r) == t && r.condition == c))
                    .collect(),
            );
        }
    }
    let dropped_terms = design.drop_aliased();
    if !dropped_terms.is_empty() {
        tracing::debug!(measure = measure.name(), dropped = ?dropped_terms, "dropping non-estimable terms");
    }
    let p = design.n_cols();
    if n <= p {
        return Err(fail(format!("{n} observations cannot fit {p} fixed effects")));
    }

    let mut groups = Vec::new();
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && rows[end].participant_id == rows[start].participant_id {
            end += 1;
        }
        let m = end - start;
        let x = DMatrix::from_fn(m, p, |i, j| design.row(start + i)[j]);
        let y = DVector::from_fn(m, |i, _| measure.value(rows[start + i]));
        let z = DMatrix::from_fn(m, 2, |i, j| {
            if j == 0 {
                1.0
            } else {
                f64::from(trial_of(rows[start + i]))
            }
        });
        groups.push(Group { x, y, z });
        start = end;
    }
    if groups.len() < 2 {
        return Err(fail(format!("needs at least 2 participants, got {}", groups.len())));
    }
    let n_groups = groups.len();

    let problem = RemlProblem { groups, n, p };
    let minimum = NelderMead::default().minimize(
        |theta| problem.evaluate(theta).map_or(f64::INFINITY, |s| s.deviance),
        &[1.0, 0.0, 1.0],
    );
    if !minimum.converged {
        tracing::warn!(measure = measure.name(), iterations = minimum.iterations, "REML optimizer did not converge");
    }
    let state = problem
        .evaluate(&minimum.point)
        .ok_or_else(|| fail("REML deviance is not finite at the optimum".to_string()))?;

    let sigma2 = state.r2 / (n - p) as f64;
    let covariance = state
        .xtvx
        .clone()
        .try_inverse()
        .ok_or_else(|| fail("fixed-effect information matrix is singular".to_string()))?
        * sigma2;

    let normal = Normal::new(0.0, 1.0).map_err(|e| fail(e.to_string()))?;
    let coefficients = design
        .names()
        .iter()
        .enumerate()
        .map(|(j, term)| {
            let estimate = state.beta[j];
            let std_error = covariance[(j, j)].max(0.0).sqrt();
            let z = estimate / std_error;
            let p_value = if z.is_finite() {
                2.0 * normal.cdf(-z.abs())
            } else {
                f64::NAN
            };
            CoefficientRow {
                term: term.clone(),
                estimate,
                std_error,
                z,
                p_value,
                stars: significance_label(p_value, alpha).to_string(),
            }
        })
        .collect();

    let lambda = RemlProblem::lambda(&minimum.point);
    let g = lambda * lambda.transpose() * sigma2;

    Ok(LearningCurveFit {
        n_obs: n,
        n_groups,
        coefficients,
        dropped_terms,
        random_effects: RandomEffects {
            intercept_variance: g[(0, 0)],
            slope_variance: g[(1, 1)],
            covariance: g[(1, 0)],
        },
        residual_variance: sigma2,
        reml_log_likelihood: -state.deviance / 2.0,
        converged: minimum.converged,
        iterations: minimum.iterations,
    })
}
