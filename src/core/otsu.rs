//! Otsu thresholding on 1-D samples.
//!
//! Both variants histogram the sample into 256 bins spanning its own range
//! and return bin centers, so thresholds are in the units of the input.

use crate::core::histogram::Histogram;

const OTSU_BINS: usize = 256;

fn sample_histogram(values: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() || min == max {
        return None;
    }
    let hist = Histogram::new(values, min, max, OTSU_BINS);
    Some((hist.counts().to_vec(), hist.bin_centers()))
}

/// Global Otsu threshold maximizing the between-class variance.
///
/// A constant sample returns its value; an empty one returns `None`.
pub fn threshold_otsu(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let first = *finite.first()?;
    let Some((counts, centers)) = sample_histogram(&finite) else {
        return Some(first);
    };

    let n = counts.len();
    // class probabilities and means from both ends
    let mut weight_low = vec![0.0; n];
    let mut mean_low = vec![0.0; n];
    let (mut w, mut s) = (0.0, 0.0);
    for i in 0..n {
        w += counts[i];
        s += counts[i] * centers[i];
        weight_low[i] = w;
        mean_low[i] = if w > 0.0 { s / w } else { 0.0 };
    }

    let mut weight_high = vec![0.0; n];
    let mut mean_high = vec![0.0; n];
    let (mut w, mut s) = (0.0, 0.0);
    for i in (0..n).rev() {
        w += counts[i];
        s += counts[i] * centers[i];
        weight_high[i] = w;
        mean_high[i] = if w > 0.0 { s / w } else { 0.0 };
    }

    let mut best_index = 0;
    let mut best_variance = f64::NEG_INFINITY;
    for i in 0..n - 1 {
        let variance = weight_low[i] * weight_high[i + 1] * (mean_low[i] - mean_high[i + 1]).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_index = i;
        }
    }

    Some(centers[best_index])
}

/// Two-level Otsu (three classes), returning the thresholds in ascending order.
///
/// `None` when the sample occupies fewer than three histogram bins.
pub fn threshold_multiotsu(values: &[f64]) -> Option<[f64; 2]> {
    let (counts, centers) = sample_histogram(values)?;
    if counts.iter().filter(|&&c| c > 0.0).count() < 3 {
        return None;
    }

    let n = counts.len();
    let mut cum_w = vec![0.0; n + 1];
    let mut cum_s = vec![0.0; n + 1];
    for i in 0..n {
        cum_w[i + 1] = cum_w[i] + counts[i];
        cum_s[i + 1] = cum_s[i] + counts[i] * centers[i];
    }

    // sum over classes of w_k * mu_k^2 == s_k^2 / w_k
    let class_term = |lo: usize, hi: usize| {
        let w = cum_w[hi] - cum_w[lo];
        if w > 0.0 {
            let s = cum_s[hi] - cum_s[lo];
            s * s / w
        } else {
            0.0
        }
    };

    let mut best = (0, 1);
    let mut best_score = f64::NEG_INFINITY;
    for i in 0..n - 2 {
        for j in i + 1..n - 1 {
            let score = class_term(0, i + 1) + class_term(i + 1, j + 1) + class_term(j + 1, n);
            if score > best_score {
                best_score = score;
                best = (i, j);
            }
        }
    }

    Some([centers[best.0], centers[best.1]])
}

/// Threshold used to seed the two-Gaussian fit.
///
/// The global Otsu value is kept unless it falls below `window.0`; then the
/// first multi-Otsu level strictly inside `window` replaces it. When no level
/// qualifies the out-of-window global value is retained.
pub fn fit_threshold(values: &[f64], window: (f64, f64)) -> Option<f64> {
    let global = threshold_otsu(values)?;
    if global >= window.0 {
        return Some(global);
    }

    let candidate = threshold_multiotsu(values).and_then(|levels| {
        levels
            .into_iter()
            .find(|&t| t > window.0 && t < window.1)
    });

    match candidate {
        Some(level) => {
            log::debug!(
                "Otsu threshold {:.2} below {:.2}, using multi-Otsu level {:.2}",
                global,
                window.0,
                level
            );
            Some(level)
        }
        None => {
            log::debug!(
                "Otsu threshold {:.2} below {:.2} and no multi-Otsu level inside window",
                global,
                window.0
            );
            Some(global)
        }
    }
}
