//! Friedman test (non-parametric repeated-measures omnibus)
//!
//! Values are ranked within each subject; the statistic compares rank sums
//! across conditions:
//!
//! ```text
//! Q = [12 / (n k (k+1)) Σ R_j² − 3 n (k+1)] / [1 − Σ(t³−t) / (n k (k²−1))]
//! ```
//!
//! with p from χ²(k−1). Kendall's W = Q / (n (k−1)) is reported as effect size.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::rank::{average_ranks, tie_term};
use crate::trial::WideTable;
use crate::{Error, Result};

/// Friedman test outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriedmanResult {
    /// Complete subjects used
    pub n: usize,
    /// Number of conditions
    pub k: usize,
    /// Tie-corrected chi-square statistic
    pub q: f64,
    /// Degrees of freedom (k − 1)
    pub ddof: usize,
    /// Kendall's coefficient of concordance
    pub kendall_w: f64,
    /// Uncorrected p-value
    pub p_value: f64,
}

/// Run the Friedman test on a complete-case wide table.
///
/// # Errors
///
/// Returns [`Error::Statistics`] with fewer than 3 conditions, fewer than 2
/// subjects, or when every subject ties across all conditions.
#[allow(clippy::cast_precision_loss)]
pub fn friedman(wide: &WideTable, measure: &str) -> Result<FriedmanResult> {
    let fail = |reason: String| Error::statistics("friedman", measure, reason);
    let k = wide.conditions.len();
    let n = wide.n_subjects();
    if k < 3 {
        return Err(fail(format!("needs at least 3 conditions, got {k}")));
    }
    if n < 2 {
        return Err(fail(format!("needs at least 2 complete participants, got {n}")));
    }

    let mut rank_sums = vec![0.0; k];
    let mut ties = 0.0;
    for row in &wide.values {
        let (ranks, groups) = average_ranks(row);
        for (sum, r) in rank_sums.iter_mut().zip(ranks) {
            *sum += r;
        }
        ties += tie_term(&groups);
    }

    let (nf, kf) = (n as f64, k as f64);
    let correction = 1.0 - ties / (nf * kf * (kf * kf - 1.0));
    if correction <= f64::EPSILON {
        return Err(fail("all values are tied within every participant".to_string()));
    }

    let ssr: f64 = rank_sums.iter().map(|r| r * r).sum();
    let q = (12.0 / (nf * kf * (kf + 1.0)) * ssr - 3.0 * nf * (kf + 1.0)) / correction;
    let ddof = k - 1;
    let chi2 = ChiSquared::new(ddof as f64).map_err(|e| fail(e.to_string()))?;

    Ok(FriedmanResult {
        n,
        k,
        q,
        ddof,
        kendall_w: q / (nf * (kf - 1.0)),
        p_value: chi2.sf(q.max(0.0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::Condition;

    fn wide(values: Vec<Vec<f64>>) -> WideTable {
        WideTable {
            conditions: Condition::ALL.to_vec(),
            participants: (0..values.len()).map(|i| format!("{i:02}")).collect(),
            values,
        }
    }

    #[test]
    fn test_perfect_concordance() {
        // every subject: cond0 < cond1 < cond2  =>  Q = 2n, W = 1
        let values = (0..10)
            .map(|i| {
                let base = f64::from(i);
                vec![base, base + 10.0, base + 20.0]
            })
            .collect();
        let result = friedman(&wide(values), "time").unwrap();
        assert_eq!(result.n, 10);
        assert_eq!(result.ddof, 2);
        assert!((result.q - 20.0).abs() < 1e-9);
        assert!((result.kendall_w - 1.0).abs() < 1e-9);
        // χ²(2) survival is exp(-q/2)
        assert!((result.p_value - (-10.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_no_effect() {
        // rank patterns cancel out
        let values = vec![
            vec![1.0, 2.0, 3.0],
            vec![3.0, 1.0, 2.0],
            vec![2.0, 3.0, 1.0],
        ];
        let result = friedman(&wide(values), "time").unwrap();
        assert!(result.q.abs() < 1e-9);
        assert!((result.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_inputs() {
        let one = wide(vec![vec![1.0, 2.0, 3.0]]);
        assert!(matches!(friedman(&one, "time"), Err(Error::Statistics { .. })));

        let tied = wide(vec![vec![5.0, 5.0, 5.0], vec![7.0, 7.0, 7.0]]);
        let err = friedman(&tied, "error").unwrap_err();
        assert!(err.to_string().contains("tied"));
    }
}
