//! Ranking with ties

/// Ranks (1-based) of `values`, ties sharing their average rank.
///
/// Returns the ranks in input order together with the sizes of every tie
/// group (groups of one included), which tie corrections need.
///
/// ```rust
/// use trial_analysis::stats::average_ranks;
///
/// let (ranks, ties) = average_ranks(&[10.0, 20.0, 10.0, 30.0]);
/// assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
/// assert_eq!(ties, vec![2, 1, 1]);
/// ```
#[must_use]
pub fn average_ranks(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        #[allow(clippy::cast_precision_loss)]
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        ties.push(end - start);
        start = end;
    }
    (ranks, ties)
}

/// Σ (t³ − t) over tie groups.
#[must_use]
pub fn tie_term(ties: &[usize]) -> f64 {
    ties.iter()
        .map(|&t| {
            #[allow(clippy::cast_precision_loss)]
            let t = t as f64;
            t * t * t - t
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ties() {
        let (ranks, ties) = average_ranks(&[3.0, 1.0, 2.0]);
        assert_eq!(ranks, vec![3.0, 1.0, 2.0]);
        assert!(tie_term(&ties).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_tied() {
        let (ranks, ties) = average_ranks(&[5.0, 5.0, 5.0]);
        assert_eq!(ranks, vec![2.0, 2.0, 2.0]);
        assert_eq!(ties, vec![3]);
        assert!((tie_term(&ties) - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty() {
        let (ranks, ties) = average_ranks(&[]);
        assert!(ranks.is_empty());
        assert!(ties.is_empty());
    }
}
