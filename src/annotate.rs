//! Significance annotations for plot overlays
//!
//! Maps corrected pairwise p-values to star labels:
//!
//! | p           | label  |
//! |-------------|--------|
//! | ≤ 1e-4      | `****` |
//! | ≤ 1e-3      | `***`  |
//! | ≤ 1e-2      | `**`   |
//! | ≤ alpha     | `*`    |
//! | otherwise   | `ns`   |
//!
//! Pairs are unordered: a map built from a table with `(0, 2)` answers a query
//! for `(2, 0)` with the same label.

use std::collections::BTreeMap;

use crate::stats::PairwiseTable;
use crate::trial::Condition;

/// Label for "not significant".
pub const NOT_SIGNIFICANT: &str = "ns";

/// Star label of one p-value. `NaN` is never significant.
///
/// ```rust
/// use trial_analysis::annotate::significance_label;
///
/// assert_eq!(significance_label(0.00001, 0.05), "****");
/// assert_eq!(significance_label(0.03, 0.05), "*");
/// assert_eq!(significance_label(0.2, 0.05), "ns");
/// ```
#[must_use]
pub fn significance_label(p: f64, alpha: f64) -> &'static str {
    if p.is_nan() {
        NOT_SIGNIFICANT
    } else if p <= 1e-4 {
        "****"
    } else if p <= 1e-3 {
        "***"
    } else if p <= 1e-2 {
        "**"
    } else if p <= alpha {
        "*"
    } else {
        NOT_SIGNIFICANT
    }
}

fn key(a: Condition, b: Condition) -> (Condition, Condition) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Labels keyed by unordered condition pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationMap {
    labels: BTreeMap<(Condition, Condition), String>,
}

impl AnnotationMap {
    /// Label of a pair in either order; `"ns"` if the pair is unknown.
    #[must_use]
    pub fn label(&self, a: Condition, b: Condition) -> &str {
        self.labels
            .get(&key(a, b))
            .map_or(NOT_SIGNIFICANT, String::as_str)
    }

    /// Pairs and labels, smaller condition first.
    pub fn iter(&self) -> impl Iterator<Item = (&(Condition, Condition), &String)> {
        self.labels.iter()
    }

    /// Pairs whose label is not `"ns"`.
    pub fn significant(&self) -> impl Iterator<Item = ((Condition, Condition), &str)> {
        self.labels
            .iter()
            .filter(|(_, l)| l.as_str() != NOT_SIGNIFICANT)
            .map(|(k, l)| (*k, l.as_str()))
    }

    /// Number of pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no pair is labeled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Build the annotation map.
///
/// - `pairwise`: corrected pairwise results, `None` if the test failed.
/// - `omnibus`: `(p, gate)`; when `p > gate` every pair is `"ns"`.
/// - `pairs`: pairs to label; `None` labels every pair of the table.
///
/// Requested pairs missing from the table get `"ns"`.
#[must_use]
pub fn extract_condition_annotations(
    pairwise: Option<&PairwiseTable>,
    omnibus: Option<(f64, f64)>,
    alpha: f64,
    pairs: Option<&[(Condition, Condition)]>,
) -> AnnotationMap {
    let gated = omnibus.is_some_and(|(p, gate)| p.is_nan() || p > gate);
    if gated {
        tracing::debug!("omnibus test not significant; all pairs annotated ns");
    }

    let wanted: Vec<(Condition, Condition)> = match (pairs, pairwise) {
        (Some(pairs), _) => pairs.to_vec(),
        (None, Some(table)) => table.rows.iter().map(|r| (r.a, r.b)).collect(),
        (None, None) => Vec::new(),
    };

    let labels = wanted
        .into_iter()
        .map(|(a, b)| {
            let label = if gated {
                NOT_SIGNIFICANT
            } else {
                pairwise
                    .and_then(|t| t.find(a, b))
                    .map_or(NOT_SIGNIFICANT, |row| significance_label(row.p_corr, alpha))
            };
            (key(a, b), label.to_string())
        })
        .collect();

    AnnotationMap { labels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PairwiseMode;
    use crate::stats::PairwiseComparison;

    fn table(p_corr: &[((u8, u8), f64)]) -> PairwiseTable {
        PairwiseTable {
            mode: PairwiseMode::NonParametric,
            p_adjust: "holm".to_string(),
            rows: p_corr
                .iter()
                .map(|&((a, b), p)| PairwiseComparison {
                    a: Condition::new(a),
                    b: Condition::new(b),
                    n: 10,
                    parametric: false,
                    statistic: 0.0,
                    dof: None,
                    mean_difference: 0.0,
                    p_unc: p,
                    p_corr: p,
                })
                .collect(),
        }
    }

    #[test]
    fn test_threshold_ladder() {
        let labels: Vec<&str> = [0.000_01, 0.002, 0.03, 0.2]
            .iter()
            .map(|&p| significance_label(p, 0.05))
            .collect();
        assert_eq!(labels, vec!["****", "**", "*", "ns"]);
        assert_eq!(significance_label(0.0005, 0.05), "***");
        assert_eq!(significance_label(f64::NAN, 0.05), "ns");
    }

    #[test]
    fn test_alpha_moves_one_star_threshold() {
        assert_eq!(significance_label(0.08, 0.05), "ns");
        assert_eq!(significance_label(0.08, 0.10), "*");
    }

    #[test]
    fn test_order_insensitive_lookup() {
        let t = table(&[((0, 1), 0.001), ((0, 2), 0.2), ((1, 2), 0.04)]);
        let map = extract_condition_annotations(Some(&t), None, 0.05, None);
        let (c0, c1, c2) = (Condition::new(0), Condition::new(1), Condition::new(2));
        assert_eq!(map.label(c1, c0), "***");
        assert_eq!(map.label(c0, c1), "***");
        assert_eq!(map.label(c2, c1), "*");
        assert_eq!(map.significant().count(), 2);

        let reversed = [(c2, c0)];
        let map = extract_condition_annotations(Some(&t), None, 0.05, Some(&reversed));
        assert_eq!(map.len(), 1);
        assert_eq!(map.label(c0, c2), "ns");
    }

    #[test]
    fn test_omnibus_gate_silences_everything() {
        let t = table(&[((0, 1), 0.000_01)]);
        let map = extract_condition_annotations(Some(&t), Some((0.3, 0.05)), 0.05, None);
        assert_eq!(map.label(Condition::new(0), Condition::new(1)), "ns");

        let map = extract_condition_annotations(Some(&t), Some((0.01, 0.05)), 0.05, None);
        assert_eq!(map.label(Condition::new(0), Condition::new(1)), "****");
    }

    #[test]
    fn test_missing_table_defaults_to_ns() {
        let pairs = [(Condition::new(0), Condition::new(1))];
        let map = extract_condition_annotations(None, None, 0.05, Some(&pairs));
        assert_eq!(map.label(Condition::new(1), Condition::new(0)), "ns");
        assert!(extract_condition_annotations(None, None, 0.05, None).is_empty());
    }
}
