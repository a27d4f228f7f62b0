//! Per-condition descriptive statistics
//!
//! All summaries accumulate in `f64`; study values carry six decimals at a
//! magnitude of ~1e3, which single precision cannot hold.

use serde::{Deserialize, Serialize};

use crate::trial::{Condition, Measure, TrialTable};

/// Summary of one condition's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptives {
    /// Condition
    pub condition: Condition,
    /// Number of finite values
    pub n: usize,
    /// Mean
    pub mean: f64,
    /// Sample standard deviation (ddof = 1); `NaN` for fewer than 2 values
    pub sd: f64,
    /// Median
    pub median: f64,
    /// Minimum
    pub min: f64,
    /// Maximum
    pub max: f64,
}

/// Median of a sample (`NaN` when empty).
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Describe one sample.
#[must_use]
pub fn describe(condition: Condition, values: &[f64]) -> Descriptives {
    if values.is_empty() {
        return Descriptives {
            condition,
            n: 0,
            mean: f64::NAN,
            sd: f64::NAN,
            median: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sd = if values.len() > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        f64::NAN
    };
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    Descriptives {
        condition,
        n: values.len(),
        mean,
        sd,
        median: median(values),
        min,
        max,
    }
}

/// Describe `measure` under each condition, in the given order.
#[must_use]
pub fn describe_conditions(
    table: &TrialTable,
    measure: Measure,
    conditions: &[Condition],
) -> Vec<Descriptives> {
    conditions
        .iter()
        .map(|&c| describe(c, &table.values(measure, c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert!((median(&[3.0, 1.0, 2.0]) - 2.0).abs() < f64::EPSILON);
        assert!((median(&[4.0, 1.0, 2.0, 3.0]) - 2.5).abs() < f64::EPSILON);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_describe() {
        let d = describe(Condition::new(1), &[100.0, 110.0, 120.0, 130.0]);
        assert_eq!(d.n, 4);
        assert!((d.mean - 115.0).abs() < 1e-12);
        assert!((d.min - 100.0).abs() < f64::EPSILON);
        assert!((d.max - 130.0).abs() < f64::EPSILON);
        assert!((d.median - 115.0).abs() < 1e-12);
        // sample sd of an arithmetic sequence with step 10
        assert!((d.sd - (500.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_describe_keeps_six_decimals() {
        let values = [1000.123456, 1000.654321, 1001.111111, 999.999999];
        let d = describe(Condition::new(0), &values);
        assert!((d.mean - 1000.472_221_75).abs() < 1e-9);
        assert!((d.sd - 0.511_850_070_693_487).abs() < 1e-9);
        assert!((d.min - 999.999_999).abs() < 1e-12);
        assert!((d.max - 1001.111_111).abs() < 1e-12);
    }

    #[test]
    fn test_describe_single_value_has_no_sd() {
        let d = describe(Condition::new(2), &[150.5]);
        assert!((d.mean - 150.5).abs() < f64::EPSILON);
        assert!(d.sd.is_nan());
    }

    #[test]
    fn test_describe_empty() {
        let d = describe(Condition::new(0), &[]);
        assert_eq!(d.n, 0);
        assert!(d.mean.is_nan());
    }
}
