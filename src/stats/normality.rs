//! Normality diagnostics (Shapiro-Wilk)
//!
//! Shapiro-Wilk follows Royston (1995), Algorithm AS R94: approximate
//! coefficients from normal order statistics, and a normalizing transform of
//! `1 − W` for the p-value. Valid for 3 ≤ n ≤ 5000.
//!
//! Three diagnostic families are computed; none of them gates the omnibus or
//! pairwise results:
//!
//! - each condition's raw values;
//! - residuals of `y ~ C(condition) + C(participant)`;
//! - within-subject differences of every condition pair.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::linear::{ols_residuals, DesignMatrix};
use crate::trial::{Condition, Measure, TrialTable};
use crate::{Error, Result};

const C1: [f64; 6] = [0.0, 0.221_157, -0.147_981, -2.071_19, 4.434_685, -2.706_056];
const C2: [f64; 6] = [0.0, 0.042_981, -0.293_762, -1.752_461, 5.682_633, -3.582_633];
const C3: [f64; 4] = [0.544, -0.399_78, 0.025_054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.778_57, 0.062_767, -0.002_032_2];
const C5: [f64; 4] = [-1.5861, -0.310_82, -0.083_751, 0.003_891_5];
const C6: [f64; 3] = [-0.4803, -0.082_676, 0.003_030_2];
const G: [f64; 2] = [-2.273, 0.459];

/// Smallest / largest sample Shapiro-Wilk is defined for.
pub const SHAPIRO_MIN_N: usize = 3;
/// Largest sample the p-value approximation is valid for.
pub const SHAPIRO_MAX_N: usize = 5000;

/// Shapiro-Wilk outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapiroWilk {
    /// Sample size
    pub n: usize,
    /// W statistic in (0, 1]
    pub w: f64,
    /// p-value
    pub p_value: f64,
}

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Shapiro-Wilk test of normality.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for n outside 3..=5000, non-finite values,
/// or a sample with zero range.
#[allow(clippy::cast_precision_loss, clippy::many_single_char_names)]
pub fn shapiro_wilk(sample: &[f64]) -> Result<ShapiroWilk> {
    let n = sample.len();
    if !(SHAPIRO_MIN_N..=SHAPIRO_MAX_N).contains(&n) {
        return Err(Error::InvalidInput(format!(
            "Shapiro-Wilk needs {SHAPIRO_MIN_N}..={SHAPIRO_MAX_N} values, got {n}"
        )));
    }
    if sample.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput("Shapiro-Wilk sample contains NaN/inf".to_string()));
    }

    let mut x = sample.to_vec();
    x.sort_by(f64::total_cmp);
    let range = x[n - 1] - x[0];
    if range < 1e-19 * x[n - 1].abs().max(1.0) {
        return Err(Error::InvalidInput("Shapiro-Wilk sample has zero range".to_string()));
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Other(e.to_string()))?;
    let nf = n as f64;
    let half = n / 2;

    // antisymmetric coefficients a[0..half] (for the upper order statistics)
    let mut a = vec![0.0; half];
    if n == 3 {
        a[0] = std::f64::consts::FRAC_1_SQRT_2;
    } else {
        let an25 = nf + 0.25;
        let m: Vec<f64> = (1..=half)
            .map(|i| normal.inverse_cdf((i as f64 - 0.375) / an25))
            .collect();
        let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
        let ssumm2 = summ2.sqrt();
        let rsn = 1.0 / nf.sqrt();
        let a1 = poly(&C1, rsn) - m[0] / ssumm2;

        let (first, fac) = if n > 5 {
            let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
            let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
                / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
                .sqrt();
            a[1] = a2;
            (2, fac)
        } else {
            let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
            (1, fac)
        };
        a[0] = a1;
        for i in first..half {
            a[i] = -m[i] / fac;
        }
    }

    // scale by range for numerical stability; W is scale invariant
    let scaled: Vec<f64> = x.iter().map(|v| v / range).collect();
    let mean = scaled.iter().sum::<f64>() / nf;
    let ssq: f64 = scaled.iter().map(|v| (v - mean).powi(2)).sum();
    let numerator: f64 = (0..half)
        .map(|i| a[i] * (scaled[n - 1 - i] - scaled[i]))
        .sum();
    let w = (numerator * numerator / ssq).min(1.0);

    let p_value = if n == 3 {
        let pi6 = 6.0 / std::f64::consts::PI;
        let stqr = std::f64::consts::FRAC_PI_3;
        (pi6 * (w.sqrt().asin() - stqr)).max(0.0)
    } else {
        let w1 = 1.0 - w;
        if w1 <= 0.0 {
            1.0
        } else {
            let mut y = w1.ln();
            let (mean, sd) = if n <= 11 {
                let gamma = poly(&G, nf);
                if y >= gamma {
                    return Ok(ShapiroWilk { n, w, p_value: 1e-99 });
                }
                y = -(gamma - y).ln();
                (poly(&C3, nf), poly(&C4, nf).exp())
            } else {
                let ln_n = nf.ln();
                (poly(&C5, ln_n), poly(&C6, ln_n).exp())
            };
            normal.sf((y - mean) / sd)
        }
    };

    Ok(ShapiroWilk { n, w, p_value })
}

/// Which data a normality row was computed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalityTarget {
    /// Raw values of one condition
    Condition {
        /// Condition
        condition: Condition,
    },
    /// Residuals of the condition + participant linear model
    Residuals,
    /// Differences a − b within participants
    Difference {
        /// Minuend condition
        a: Condition,
        /// Subtrahend condition
        b: Condition,
    },
}

impl std::fmt::Display for NormalityTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Condition { condition } => write!(f, "condition {condition}"),
            Self::Residuals => f.write_str("residuals"),
            Self::Difference { a, b } => write!(f, "difference {a}-{b}"),
        }
    }
}

/// One normality diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityCheck {
    /// What was tested
    pub target: NormalityTarget,
    /// Test outcome, or why it could not run
    pub outcome: std::result::Result<ShapiroWilk, String>,
    /// `p > alpha`; `None` when the test could not run
    pub normal: Option<bool>,
}

impl NormalityCheck {
    fn new(target: NormalityTarget, outcome: Result<ShapiroWilk>, alpha: f64) -> Self {
        let outcome = outcome.map_err(|e| e.to_string());
        let normal = outcome.as_ref().ok().map(|sw| sw.p_value > alpha);
        Self {
            target,
            outcome,
            normal,
        }
    }
}

/// Residuals of `measure ~ C(condition) + C(participant)` over finite rows.
///
/// # Errors
///
/// Returns [`Error::Statistics`] if there are no usable rows or the fit fails.
pub fn anova_residuals(table: &TrialTable, measure: Measure, conditions: &[Condition]) -> Result<Vec<f64>> {
    let rows: Vec<_> = table
        .records()
        .iter()
        .filter(|r| measure.value(r).is_finite() && conditions.contains(&r.condition))
        .collect();
    if rows.is_empty() {
        return Err(Error::statistics("normality", measure.name(), "no finite observations"));
    }

    let participants: Vec<String> = rows
        .iter()
        .map(|r| r.participant_id.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut design = DesignMatrix::new(rows.len());
    design.push_column("Intercept", vec![1.0; rows.len()]);
    for level in conditions.iter().skip(1) {
        design.push_column(
            format!("condition[{level}]"),
            rows.iter().map(|r| f64::from(u8::from(r.condition == *level))).collect(),
        );
    }
    for pid in participants.iter().skip(1) {
        design.push_column(
            format!("participant[{pid}]"),
            rows.iter()
                .map(|r| f64::from(u8::from(&r.participant_id == pid)))
                .collect(),
        );
    }

    let y: Vec<f64> = rows.iter().map(|r| measure.value(r)).collect();
    ols_residuals(&design, &y)
        .map_err(|e| Error::statistics("normality", measure.name(), e.to_string()))
}

/// All normality diagnostics for one measure.
#[must_use]
pub fn normality_checks(
    table: &TrialTable,
    measure: Measure,
    conditions: &[Condition],
    alpha: f64,
) -> Vec<NormalityCheck> {
    let mut checks = Vec::new();

    for &condition in conditions {
        let values = table.values(measure, condition);
        checks.push(NormalityCheck::new(
            NormalityTarget::Condition { condition },
            shapiro_wilk(&values),
            alpha,
        ));
    }

    let residuals = anova_residuals(table, measure, conditions).and_then(|r| shapiro_wilk(&r));
    checks.push(NormalityCheck::new(NormalityTarget::Residuals, residuals, alpha));

    for (i, &a) in conditions.iter().enumerate() {
        for &b in &conditions[i + 1..] {
            let pair = table.wide(measure, &[a, b]);
            let differences: Vec<f64> = pair.values.iter().map(|row| row[0] - row[1]).collect();
            checks.push(NormalityCheck::new(
                NormalityTarget::Difference { a, b },
                shapiro_wilk(&differences),
                alpha,
            ));
        }
    }

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::TrialRecord;

    #[test]
    fn test_three_equally_spaced_points() {
        let sw = shapiro_wilk(&[1.0, 2.0, 3.0]).unwrap();
        assert!((sw.w - 1.0).abs() < 1e-9);
        assert!((sw.p_value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normal_quantiles_look_normal() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let sample: Vec<f64> = (1..=30)
            .map(|i| normal.inverse_cdf((f64::from(i) - 0.5) / 30.0))
            .collect();
        let sw = shapiro_wilk(&sample).unwrap();
        assert!(sw.w > 0.97, "W = {}", sw.w);
        assert!(sw.p_value > 0.5, "p = {}", sw.p_value);
    }

    #[test]
    fn test_outlier_is_not_normal() {
        let mut sample = vec![1.0; 9];
        for (i, v) in sample.iter_mut().enumerate() {
            *v += f64::from(u8::try_from(i).unwrap()) * 0.01;
        }
        sample.push(100.0);
        let sw = shapiro_wilk(&sample).unwrap();
        assert!(sw.p_value < 0.001, "p = {}", sw.p_value);
    }

    #[test]
    fn test_rejects_degenerate_samples() {
        assert!(shapiro_wilk(&[1.0, 2.0]).is_err());
        assert!(shapiro_wilk(&[4.0, 4.0, 4.0, 4.0]).is_err());
        assert!(shapiro_wilk(&[1.0, f64::NAN, 3.0]).is_err());
    }

    #[test]
    fn test_checks_cover_conditions_residuals_and_pairs() {
        let mut records = Vec::new();
        for p in 0..6u8 {
            for c in 0..3u8 {
                let wiggle = f64::from((p * 7 + c * 3) % 5);
                records.push(TrialRecord::new(
                    format!("{p:02}"),
                    Condition::new(c),
                    100.0 + f64::from(c) * 10.0 + f64::from(p) + wiggle,
                    800.0 + wiggle * 13.0,
                ));
            }
        }
        let table = TrialTable::new(records);
        let checks = normality_checks(&table, Measure::Time, &Condition::ALL, 0.05);
        assert_eq!(checks.len(), 3 + 1 + 3);
        assert!(checks.iter().all(|c| c.outcome.is_ok()));
        assert!(matches!(checks[3].target, NormalityTarget::Residuals));
    }
}
