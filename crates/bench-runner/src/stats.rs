//! Aggregate statistics helpers
//!
//! The percentile and median definitions here are part of the result
//! contract: results computed on one host must be comparable with results
//! computed elsewhere, so the index arithmetic is fixed rather than delegated
//! to a stats crate.

/// Sort a latency list ascending, treating NaN as equal (NaN never occurs in
/// practice; timings come from monotonic clock deltas)
pub fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

/// The k-th percentile of an ascending-sorted list.
///
/// Defined as `sorted[ceil(k/100 * n) - 1]`, clamped to the first element;
/// 0.0 for an empty list.
pub fn percentile(sorted: &[f64], k: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (k / 100.0 * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

/// Median of an ascending-sorted list, taken at index `floor(n/2)`; for an
/// even-length list this is the upper of the two middle values
pub fn median_floor(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        None
    } else {
        Some(sorted[sorted.len() / 2])
    }
}

/// Arithmetic mean, `None` for an empty list
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[], 99.0), 0.0);
    }

    #[test]
    fn test_percentile_single_value() {
        // With one observation every percentile is that observation
        let l = [42.0];
        assert_eq!(percentile(&l, 50.0), 42.0);
        assert_eq!(percentile(&l, 95.0), 42.0);
        assert_eq!(percentile(&l, 99.0), 42.0);
    }

    #[test]
    fn test_percentile_hundred_values_stays_in_range() {
        let l: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        assert_eq!(percentile(&l, 50.0), 50.0);
        assert_eq!(percentile(&l, 95.0), 95.0);
        assert_eq!(percentile(&l, 99.0), 99.0);
        assert_eq!(percentile(&l, 100.0), 100.0);
    }

    #[test]
    fn test_percentile_small_lists() {
        let l = [10.0, 20.0, 30.0];
        // ceil(0.5 * 3) = 2 -> index 1
        assert_eq!(percentile(&l, 50.0), 20.0);
        // ceil(0.95 * 3) = 3 -> index 2
        assert_eq!(percentile(&l, 95.0), 30.0);
        // Tiny k clamps to the first element
        assert_eq!(percentile(&l, 0.1), 10.0);
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let l = sorted([130.0, 90.0, 110.0, 250.0, 70.0]);
        let p50 = percentile(&l, 50.0);
        let p95 = percentile(&l, 95.0);
        let p99 = percentile(&l, 99.0);
        assert!(p50 <= p95);
        assert!(p95 <= p99);
    }

    #[test]
    fn test_median_floor() {
        assert_eq!(median_floor(&[]), None);
        assert_eq!(median_floor(&[5.0]), Some(5.0));
        // Even count takes the upper of the two middle values (index n/2)
        assert_eq!(median_floor(&[1.0, 2.0]), Some(2.0));
        assert_eq!(median_floor(&[1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[20.0]), Some(20.0));
        assert_eq!(mean(&[10.0, 20.0, 30.0]), Some(20.0));
    }

    #[test]
    fn test_sorted_handles_unordered_input() {
        assert_eq!(sorted([3.0, 1.0, 2.0]), vec![1.0, 2.0, 3.0]);
    }
}
