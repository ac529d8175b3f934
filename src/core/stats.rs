//! Sample statistics over `f64` slices.
//!
//! Callers are expected to pass finite values only; empty input yields `None`
//! (or NaN for the moment-based helpers).

/// Arithmetic mean; `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Whether every value equals the first one
pub fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] == pair[1])
}

/// Variance with `ddof` delta degrees of freedom
pub fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    let n = values.len();
    if n <= ddof {
        return None;
    }
    let mean = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some(ss / (n - ddof) as f64)
}

/// Population standard deviation (`ddof = 0`)
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values, 0).map(f64::sqrt)
}

/// Percentile with linear interpolation between closest ranks (0..=100)
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

fn central_moments(values: &[f64]) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Bias-corrected sample skewness (G1)
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let (m2, m3, _) = central_moments(values);
    let g1 = m3 / m2.powf(1.5);
    g1 * (n * (n - 1.0)).sqrt() / (n - 2.0)
}

/// Bias-corrected excess kurtosis (G2)
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let (m2, _, m4) = central_moments(values);
    let g2 = m4 / (m2 * m2) - 3.0;
    ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
}

/// Index of the first maximum, ignoring NaN
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the first minimum, ignoring NaN
pub fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v < b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(percentile(&values, 50.0).unwrap(), 2.5);
        assert_relative_eq!(percentile(&values, 15.0).unwrap(), 1.45);
        assert_relative_eq!(percentile(&values, 100.0).unwrap(), 4.0);
        assert!(percentile(&[], 50.0).is_none());
    }

    #[test]
    fn test_variance_ddof() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(variance(&values, 0).unwrap(), 1.25);
        assert_relative_eq!(variance(&values, 1).unwrap(), 5.0 / 3.0);
        assert!(variance(&[1.0], 1).is_none());
    }

    #[test]
    fn test_constant_detection() {
        assert!(is_constant(&[0.3; 7]));
        assert!(is_constant(&[]));
        assert!(!is_constant(&[0.3, 0.3, 0.30000000000000004]));
    }

    #[test]
    fn test_symmetric_sample_has_zero_skew() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(skewness(&values), 0.0, epsilon = 1e-12);
        // uniform-like sample is platykurtic
        assert!(excess_kurtosis(&values) < 0.0);
    }

    #[test]
    fn test_arg_extrema_skip_nan() {
        let values = [f64::NAN, 2.0, 5.0, 5.0, -1.0];
        assert_eq!(argmax(&values), Some(2));
        assert_eq!(argmin(&values), Some(4));
        assert_eq!(argmax(&[f64::NAN]), None);
    }
}
