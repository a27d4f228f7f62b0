//! Pairwise within-subject comparisons with Holm correction
//!
//! Every unordered condition pair is compared on the same complete-case
//! subjects the omnibus test used:
//!
//! - non-parametric: Wilcoxon signed-rank, zero differences dropped; exact null
//!   distribution for n ≤ 50 without ties, otherwise the normal approximation
//!   with tie correction;
//! - parametric: paired t-test.
//!
//! All tests are two-sided. Holm's step-down adjustment runs over the finite
//! p-values; a pair with no usable differences keeps `NaN` p-values.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use super::rank::{average_ranks, tie_term};
use crate::config::PairwiseMode;
use crate::trial::{Condition, WideTable};
use crate::{Error, Result};

/// Largest sample the exact signed-rank distribution is used for.
pub const EXACT_WILCOXON_MAX_N: usize = 50;

/// One row of the pairwise table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseComparison {
    /// First condition
    pub a: Condition,
    /// Second condition
    pub b: Condition,
    /// Subjects compared
    pub n: usize,
    /// Parametric (t) or not (Wilcoxon)
    pub parametric: bool,
    /// W (smaller signed-rank sum) or t
    pub statistic: f64,
    /// Degrees of freedom for t; `None` for Wilcoxon
    pub dof: Option<f64>,
    /// Mean of a − b
    pub mean_difference: f64,
    /// Uncorrected two-sided p-value
    pub p_unc: f64,
    /// Holm-adjusted p-value
    pub p_corr: f64,
}

/// Pairwise table of one measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseTable {
    /// Test family used
    pub mode: PairwiseMode,
    /// Correction method name
    pub p_adjust: String,
    /// One row per unordered pair, in level order
    pub rows: Vec<PairwiseComparison>,
}

impl PairwiseTable {
    /// Row for a pair, in either order.
    #[must_use]
    pub fn find(&self, a: Condition, b: Condition) -> Option<&PairwiseComparison> {
        self.rows
            .iter()
            .find(|r| (r.a == a && r.b == b) || (r.a == b && r.b == a))
    }
}

/// Holm step-down adjustment. Non-finite inputs are passed through.
///
/// ```rust
/// use trial_analysis::stats::holm;
///
/// let adjusted = holm(&[0.01, 0.04, 0.03]);
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// assert!((adjusted[1] - 0.06).abs() < 1e-12);
/// assert!((adjusted[2] - 0.06).abs() < 1e-12);
/// ```
#[must_use]
pub fn holm(p_values: &[f64]) -> Vec<f64> {
    let mut adjusted = p_values.to_vec();
    let mut finite: Vec<usize> = (0..p_values.len())
        .filter(|&i| p_values[i].is_finite())
        .collect();
    finite.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m = finite.len();
    let mut running_max: f64 = 0.0;
    for (step, &i) in finite.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let factor = (m - step) as f64;
        running_max = running_max.max((factor * p_values[i]).min(1.0));
        adjusted[i] = running_max;
    }
    adjusted
}

/// Two-sided Wilcoxon signed-rank test on paired differences.
///
/// Returns `(W, p, n_used)` where `W = min(W+, W−)`; `None` when every
/// difference is zero. Zero differences are dropped. The exact null
/// distribution is used only for at most [`EXACT_WILCOXON_MAX_N`] differences
/// with no zeros and no tied magnitudes; otherwise the tie-corrected normal
/// approximation over the non-zero differences applies.
#[must_use]
pub fn wilcoxon_signed_rank(differences: &[f64]) -> Option<(f64, f64, usize)> {
    let nonzero: Vec<f64> = differences.iter().copied().filter(|d| *d != 0.0).collect();
    let n = nonzero.len();
    if n == 0 {
        return None;
    }

    let abs: Vec<f64> = nonzero.iter().map(|d| d.abs()).collect();
    let (ranks, groups) = average_ranks(&abs);
    let w_plus: f64 = nonzero
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| r)
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let nf = n as f64;
    let total = nf * (nf + 1.0) / 2.0;
    let w = w_plus.min(total - w_plus);

    let has_ties = groups.iter().any(|&g| g > 1);
    let has_zeros = n < differences.len();
    let p = if n <= EXACT_WILCOXON_MAX_N && !has_ties && !has_zeros {
        // W is an integer rank sum when there are no ties
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let w_int = w.round() as usize;
        (2.0 * signed_rank_cdf(n, w_int)).min(1.0)
    } else {
        let mean = total / 2.0;
        let var = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_term(&groups) / 48.0;
        if var <= 0.0 {
            return Some((w, 1.0, n));
        }
        let z = (w - mean) / var.sqrt();
        let normal = Normal::new(0.0, 1.0).ok()?;
        (2.0 * normal.cdf(-z.abs())).min(1.0)
    };
    Some((w, p, n))
}

/// P(W+ ≤ w) under the null for `n` untied, non-zero differences.
fn signed_rank_cdf(n: usize, w: usize) -> f64 {
    let max_sum = n * (n + 1) / 2;
    // counts[s]: number of sign assignments with W+ = s
    let mut counts = vec![0.0f64; max_sum + 1];
    counts[0] = 1.0;
    for rank in 1..=n {
        for s in (rank..=max_sum).rev() {
            counts[s] += counts[s - rank];
        }
    }
    let favourable: f64 = counts.iter().take(w.min(max_sum) + 1).sum();
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let total = 2.0f64.powi(n as i32);
    favourable / total
}

/// Two-sided paired t-test on differences. Returns `(t, dof, p)`; `None` with
/// fewer than two differences or zero spread.
#[must_use]
pub fn paired_t_test(differences: &[f64]) -> Option<(f64, f64, f64)> {
    let n = differences.len();
    if n < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let nf = n as f64;
    let mean = differences.iter().sum::<f64>() / nf;
    let var = differences.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (nf - 1.0);
    if var <= 0.0 {
        return None;
    }
    let t = mean / (var / nf).sqrt();
    let dof = nf - 1.0;
    let dist = StudentsT::new(0.0, 1.0, dof).ok()?;
    Some((t, dof, (2.0 * dist.cdf(-t.abs())).min(1.0)))
}

/// Compare every unordered pair of conditions and Holm-correct.
///
/// # Errors
///
/// Returns [`Error::Statistics`] with fewer than 2 complete subjects or fewer
/// than 2 conditions.
pub fn pairwise_tests(wide: &WideTable, measure: &str, mode: PairwiseMode) -> Result<PairwiseTable> {
    let fail = |reason: String| Error::statistics("pairwise", measure, reason);
    let k = wide.conditions.len();
    let n = wide.n_subjects();
    if k < 2 {
        return Err(fail(format!("needs at least 2 conditions, got {k}")));
    }
    if n < 2 {
        return Err(fail(format!("needs at least 2 complete participants, got {n}")));
    }

    let mut rows = Vec::new();
    for i in 0..k {
        for j in (i + 1)..k {
            let differences: Vec<f64> = wide.values.iter().map(|row| row[i] - row[j]).collect();
            #[allow(clippy::cast_precision_loss)]
            let mean_difference = differences.iter().sum::<f64>() / n as f64;

            let (statistic, dof, p_unc) = match mode {
                PairwiseMode::NonParametric => wilcoxon_signed_rank(&differences)
                    .map_or((f64::NAN, None, f64::NAN), |(w, p, _)| (w, None, p)),
                PairwiseMode::Parametric => paired_t_test(&differences)
                    .map_or((f64::NAN, None, f64::NAN), |(t, dof, p)| (t, Some(dof), p)),
            };

            rows.push(PairwiseComparison {
                a: wide.conditions[i],
                b: wide.conditions[j],
                n,
                parametric: mode == PairwiseMode::Parametric,
                statistic,
                dof,
                mean_difference,
                p_unc,
                p_corr: f64::NAN,
            });
        }
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.p_unc).collect();
    for (row, p) in rows.iter_mut().zip(holm(&raw)) {
        row.p_corr = p;
    }

    Ok(PairwiseTable {
        mode,
        p_adjust: "holm".to_string(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wilcoxon_exact_all_positive() {
        let d: Vec<f64> = (1..=10).map(f64::from).collect();
        let (w, p, n) = wilcoxon_signed_rank(&d).unwrap();
        assert_eq!(n, 10);
        assert!(w.abs() < f64::EPSILON);
        assert!((p - 2.0 / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn test_wilcoxon_symmetric_is_not_significant() {
        let d = [1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0, -8.0];
        let (_, p, _) = wilcoxon_signed_rank(&d).unwrap();
        assert!(p > 0.5);
    }

    #[test]
    fn test_wilcoxon_drops_zeros() {
        let (_, _, n) = wilcoxon_signed_rank(&[0.0, 1.0, 2.0, 0.0, 3.0]).unwrap();
        assert_eq!(n, 3);
        assert!(wilcoxon_signed_rank(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_wilcoxon_zeros_use_normal_approximation() {
        // exact would give 2 * 1/8 = 0.25 for W = 0 over three differences
        let (w, p, n) = wilcoxon_signed_rank(&[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(n, 3);
        assert!(w.abs() < f64::EPSILON);
        assert!((p - 0.108_809_430).abs() < 1e-6);
    }

    #[test]
    fn test_wilcoxon_ties_use_normal_approximation() {
        let (w, p, _) = wilcoxon_signed_rank(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(w.abs() < f64::EPSILON);
        assert!(p > 0.0 && p < 0.05);
    }

    #[test]
    fn test_signed_rank_cdf_total_mass() {
        assert!((signed_rank_cdf(5, 15) - 1.0).abs() < 1e-12);
        assert!((signed_rank_cdf(3, 0) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_paired_t() {
        let (t, dof, p) = paired_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((t - 4.242_640_687).abs() < 1e-6);
        assert!((dof - 4.0).abs() < f64::EPSILON);
        assert!(p > 0.01 && p < 0.02);
        assert!(paired_t_test(&[2.0, 2.0, 2.0]).is_none());
    }

    #[test]
    fn test_holm_keeps_nan_and_is_monotone() {
        let adjusted = holm(&[0.04, f64::NAN, 0.001]);
        assert!((adjusted[2] - 0.002).abs() < 1e-12);
        assert!((adjusted[0] - 0.04).abs() < 1e-12);
        assert!(adjusted[1].is_nan());
    }
}
