//! Scalar statistics used throughout the pipeline: single-pass moments,
//! in-place normalisation, and the sliding-window median the dereddener is
//! built on.

/// Arithmetic mean of `x`.
pub fn mean(x: &[f32]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    x.iter().map(|&v| v as f64).sum::<f64>() / x.len() as f64
}

/// Single-pass, numerically stable mean and (population) standard
/// deviation, via Welford's recurrence.
pub fn mean_std(x: &[f32]) -> (f64, f64) {
    if x.is_empty() {
        return (0.0, 0.0);
    }
    let mut mean = 0.0f64;
    let mut m2 = 0.0f64;
    for (i, &v) in x.iter().enumerate() {
        let v = v as f64;
        let delta = v - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (v - mean);
    }
    (mean, (m2 / x.len() as f64).sqrt())
}

/// Subtract `mean` and divide by `std` in place, putting the values in
/// units of the noise standard deviation.  A degenerate `std` leaves the
/// scale untouched so an all-constant input does not blow up.
pub fn normalise(x: &mut [f32], mean: f64, std: f64) {
    let std = if std > f64::MIN_POSITIVE { std } else { 1.0 };
    let inv = 1.0 / std;
    for v in x.iter_mut() {
        *v = ((*v as f64 - mean) * inv) as f32;
    }
}

/// Median of `x` over a sliding window of `window` points centred on each
/// element; the window is truncated at the array edges.  Returns a vector
/// the same length as `x`.
///
/// The window contents are kept in a sorted scratch buffer that is updated
/// incrementally, so the cost per element is one binary search plus one
/// bounded memmove.
pub fn running_median(x: &[f32], window: usize) -> Vec<f32> {
    let n = x.len();
    if n == 0 || window == 0 {
        return vec![0.0; n];
    }
    let half = window / 2;
    let mut sorted: Vec<f32> = Vec::with_capacity(window + 1);
    let mut lo = 0usize; // current window is x[lo..hi]
    let mut hi = 0usize;
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        let new_lo = i.saturating_sub(half);
        let new_hi = (i + half + 1).min(n);
        while hi < new_hi {
            let v = x[hi];
            let pos = sorted.partition_point(|&s| s.total_cmp(&v).is_lt());
            sorted.insert(pos, v);
            hi += 1;
        }
        while lo < new_lo {
            let v = x[lo];
            // The value is guaranteed present; remove one occurrence.
            let pos = sorted.partition_point(|&s| s.total_cmp(&v).is_lt());
            sorted.remove(pos);
            lo += 1;
        }
        out.push(sorted[sorted.len() / 2]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_std_matches_closed_form() {
        let x = [2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let (m, s) = mean_std(&x);
        assert_relative_eq!(m, 5.0, epsilon = 1e-12);
        assert_relative_eq!(s, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn normalise_puts_values_in_sigma_units() {
        let mut x = [1.0f32, 3.0, 5.0];
        normalise(&mut x, 3.0, 2.0);
        assert_relative_eq!(x[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(x[2], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn normalise_survives_zero_std() {
        let mut x = [4.0f32, 4.0, 4.0];
        normalise(&mut x, 4.0, 0.0);
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn running_median_of_constant_is_constant() {
        let x = vec![3.5f32; 64];
        assert!(running_median(&x, 5).iter().all(|&m| m == 3.5));
    }

    #[test]
    fn running_median_tracks_a_step() {
        let mut x = vec![1.0f32; 20];
        x.extend(std::iter::repeat(9.0f32).take(20));
        let med = running_median(&x, 5);
        assert_eq!(med.len(), x.len());
        assert_eq!(med[5], 1.0);
        assert_eq!(med[35], 9.0);
    }

    #[test]
    fn running_median_rejects_an_outlier() {
        let mut x = vec![1.0f32; 31];
        x[15] = 1000.0;
        let med = running_median(&x, 5);
        assert!(med.iter().all(|&m| m == 1.0));
    }
}
