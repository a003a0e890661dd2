//! Statistical primitives for drift detection

/// Two-sample Kolmogorov-Smirnov statistic.
///
/// Sorts both samples, then walks them in merged order tracking each
/// empirical CDF and recording the maximum absolute difference. O(n log n)
/// in the sample sizes. Either sample being empty yields 0.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut a_sorted: Vec<f64> = a.to_vec();
    let mut b_sorted: Vec<f64> = b.to_vec();
    a_sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    b_sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));

    let n = a_sorted.len() as f64;
    let m = b_sorted.len() as f64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut max_diff = 0.0f64;

    while i < a_sorted.len() && j < b_sorted.len() {
        // Advance past every value tied at the current merge point so the
        // CDFs are compared at identical x positions.
        let x = a_sorted[i].min(b_sorted[j]);
        while i < a_sorted.len() && a_sorted[i] <= x {
            i += 1;
        }
        while j < b_sorted.len() && b_sorted[j] <= x {
            j += 1;
        }
        let diff = (i as f64 / n - j as f64 / m).abs();
        max_diff = max_diff.max(diff);
    }

    max_diff
}

/// Ordinary least-squares slope of `values` against their indices.
///
/// Fewer than two samples, or zero variance in the (degenerate) index
/// axis, yields 0.
pub fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (idx, &y) in values.iter().enumerate() {
        let dx = idx as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
