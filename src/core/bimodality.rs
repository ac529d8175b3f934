//! Bimodality estimation for backscatter samples.
//!
//! [`BimodalityEstimator`] converts a linear-power sample to dB, fits a
//! two-Gaussian mixture to its histogram and derives the separation metrics.
//! When the fit fails, [`estimate_sweep`] provides a deterministic
//! histogram-sweep estimate instead.

use crate::core::curve_fit::{fit_bimodal, FitBounds, FitFailure, FitOutcome, GaussianMode};
use crate::core::histogram::Histogram;
use crate::core::otsu::fit_threshold;
use crate::core::stats;
use serde::{Deserialize, Serialize};

/// Minimum `ad` of the histogram sweep for a sample to count as bimodal
pub const SWEEP_AD_THRESHOLD: f64 = 1.5;

/// Minimum BC coefficient voting for bimodality
pub const BC_THRESHOLD: f64 = 5.0 / 9.0;

/// Ashman coefficient that alone establishes mode separation
pub const STRONG_ASHMAN: f64 = 3.0;

/// Histogram and threshold settings of the estimator (all in dB)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorParams {
    /// Lower edge of the curve-fit histogram
    pub hist_min: f64,
    /// Upper edge of the curve-fit histogram
    pub hist_max: f64,
    /// Bin count of the curve-fit histogram
    pub hist_bins: usize,
    /// Range an Otsu threshold must fall in to seed the fit
    pub otsu_window: (f64, f64),
    /// Lower edge of the sweep histogram
    pub sweep_min: f64,
    /// Upper edge of the sweep histogram
    pub sweep_max: f64,
    /// Bin count of the sweep histogram
    pub sweep_bins: usize,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            hist_min: -32.0,
            hist_max: -5.0,
            hist_bins: 200,
            otsu_window: (-18.0, 0.0),
            sweep_min: -30.0,
            sweep_max: 5.0,
            sweep_bins: 100,
        }
    }
}

/// Decision thresholds for the mixture metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BimodalityThresholds {
    /// Minimum Ashman separation of the fitted modes
    pub ashman: f64,
    /// Bhattacharyya coefficient between fitted and observed densities
    pub bhattacharyya: f64,
    /// Minimum area ratio of the smaller to the larger mode
    pub surface_ratio: f64,
    /// Minimum normalized between-class variance
    pub bm_coefficient: f64,
}

impl Default for BimodalityThresholds {
    fn default() -> Self {
        Self {
            ashman: 1.5,
            bhattacharyya: 0.97,
            surface_ratio: 0.1,
            bm_coefficient: 0.7,
        }
    }
}

/// Bimodality metrics of one sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricSet {
    pub ashman: f64,
    pub bhattacharyya: f64,
    pub surface_ratio: f64,
    pub bimodality_coefficient: f64,
    pub bc_coefficient: f64,
}

impl MetricSet {
    pub const NAMES: [&'static str; 5] = ["ashman", "bhc", "surface_ratio", "bm_coeff", "bc_coeff"];

    pub fn to_array(&self) -> [f64; 5] {
        [
            self.ashman,
            self.bhattacharyya,
            self.surface_ratio,
            self.bimodality_coefficient,
            self.bc_coefficient,
        ]
    }
}

/// Result of the histogram sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepEstimate {
    /// Largest normalized between-class variance over all splits
    pub sigma_max: f64,
    /// Largest mode separation over all splits
    pub ad_max: f64,
}

struct SplitMoments {
    mean: f64,
    spread: f64,
    weight: f64,
}

fn split_moments(counts: &[f64], centers: &[f64]) -> Option<SplitMoments> {
    let weight: f64 = counts.iter().sum();
    if weight <= 0.0 {
        return None;
    }
    let mean = counts.iter().zip(centers).map(|(c, b)| c * b).sum::<f64>() / weight;
    let spread = counts
        .iter()
        .zip(centers)
        .map(|(c, b)| (c * b - mean).powi(2))
        .sum::<f64>()
        .sqrt()
        / weight;
    Some(SplitMoments { mean, spread, weight })
}

/// Histogram-sweep bimodality estimate of a dB sample.
///
/// Every bin center of the smoothed histogram is tried as a split. Returns
/// `None` for fewer than three finite values and `(0, 0)` for a sample without
/// spread.
pub fn estimate_sweep(db: &[f64], params: &EstimatorParams) -> Option<SweepEstimate> {
    let finite: Vec<f64> = db.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 3 {
        return None;
    }

    let variance = stats::variance(&finite, 1)?;
    if stats::is_constant(&finite) || !(variance > 0.0) {
        return Some(SweepEstimate { sigma_max: 0.0, ad_max: 0.0 });
    }

    let hist = Histogram::new(&finite, params.sweep_min, params.sweep_max, params.sweep_bins);
    let smooth = hist.smoothed();
    let centers = hist.bin_centers();
    let total: f64 = smooth.iter().sum();

    let mut sigma_max = 0.0f64;
    let mut ad_max = 0.0f64;
    for split in 0..smooth.len() {
        let (Some(left), Some(right)) = (
            split_moments(&smooth[..=split], &centers[..=split]),
            split_moments(&smooth[split..], &centers[split..]),
        ) else {
            continue;
        };

        let delta = left.mean - right.mean;
        let sigma_b = (left.weight / total) * (right.weight / total) * delta * delta / variance;
        let ad = std::f64::consts::SQRT_2 * delta.abs()
            / (left.spread * left.spread + right.spread * right.spread).sqrt();

        if sigma_b.is_finite() {
            sigma_max = sigma_max.max(sigma_b);
        }
        if ad.is_finite() {
            ad_max = ad_max.max(ad);
        }
    }

    Some(SweepEstimate { sigma_max, ad_max })
}

/// Two-Gaussian bimodality test of a single intensity sample
pub struct BimodalityEstimator {
    samples: Vec<f64>,
    params: EstimatorParams,
    centers: Vec<f64>,
    bin_width: f64,
    density: Vec<f64>,
    threshold: Option<f64>,
    fit: FitOutcome,
}

impl BimodalityEstimator {
    /// Build the estimator from linear-power intensities
    pub fn new(intensity: &[f64], params: &EstimatorParams) -> Self {
        let samples: Vec<f64> = intensity
            .iter()
            .map(|v| 10.0 * v.log10())
            .filter(|v| v.is_finite())
            .collect();

        let hist = Histogram::new(&samples, params.hist_min, params.hist_max, params.hist_bins);
        let centers = hist.bin_centers();
        let bin_width = hist.bin_width();
        let density = hist.density();
        let threshold = fit_threshold(&samples, params.otsu_window);

        let mut estimator = Self {
            samples,
            params: params.clone(),
            centers,
            bin_width,
            density,
            threshold,
            fit: FitOutcome::Failed(FitFailure::DegenerateSample),
        };
        estimator.fit = estimator.fit_mixture();
        if let FitOutcome::Failed(reason) = estimator.fit {
            log::debug!("Bimodal curve fitting failed: {:?}", reason);
        }
        estimator
    }

    fn fit_mixture(&self) -> FitOutcome {
        let Some(threshold) = self.threshold else {
            return FitOutcome::Failed(FitFailure::DegenerateSample);
        };
        if stats::is_constant(&self.samples) || !stats::variance(&self.samples, 0).is_some_and(|v| v > 0.0) {
            return FitOutcome::Failed(FitFailure::DegenerateSample);
        }

        let left: Vec<f64> = self.samples.iter().copied().filter(|&v| v < threshold).collect();
        let right: Vec<f64> = self.samples.iter().copied().filter(|&v| v > threshold).collect();
        let (seed_left, seed_right) = match (
            stats::mean(&left).zip(stats::std_dev(&left)),
            stats::mean(&right).zip(stats::std_dev(&right)),
        ) {
            (Some(l), Some(r)) => (l, r),
            _ => ((threshold - 1.0, 1.0), (threshold + 1.0, 1.0)),
        };

        let probability = self.probability();
        let amplitude_at = |mean: f64| {
            let distance: Vec<f64> = self.centers.iter().map(|c| (c - mean).abs()).collect();
            stats::argmin(&distance).map_or(f64::NAN, |i| probability[i])
        };

        let initial = (
            GaussianMode::new(seed_left.0, seed_left.1, amplitude_at(seed_left.0)),
            GaussianMode::new(seed_right.0, seed_right.1, amplitude_at(seed_right.0)),
        );
        fit_bimodal(&self.centers, &probability, initial, &FitBounds::default())
    }

    /// Histogram mass per bin
    fn probability(&self) -> Vec<f64> {
        self.density.iter().map(|d| d * self.bin_width).collect()
    }

    /// Number of finite dB samples
    pub fn sample_len(&self) -> usize {
        self.samples.len()
    }

    /// Otsu threshold that seeded the fit, in dB
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Outcome of the two-Gaussian fit
    pub fn fit(&self) -> &FitOutcome {
        &self.fit
    }

    fn modes(&self) -> Option<(GaussianMode, GaussianMode)> {
        match self.fit {
            FitOutcome::Converged { first, second } => Some((first, second)),
            FitOutcome::Failed(_) => None,
        }
    }

    fn simulated(&self, mode: &GaussianMode) -> Vec<f64> {
        self.centers.iter().map(|&x| mode.eval(x)).collect()
    }

    /// Histogram-sweep estimate of this sample
    pub fn sweep(&self) -> Option<SweepEstimate> {
        estimate_sweep(&self.samples, &self.params)
    }

    fn sweep_sigma(&self) -> f64 {
        self.sweep().map_or(f64::NAN, |s| s.sigma_max)
    }

    /// Ashman D of the fitted modes; `None` when the fit failed
    pub fn ashman(&self) -> Option<f64> {
        let (first, second) = self.modes()?;
        Some(ashman_coefficient(&first, &second))
    }

    /// Bhattacharyya coefficient of the fitted mixture against the observed density
    pub fn bhattacharyya(&self) -> Option<f64> {
        let (first, second) = self.modes()?;
        let simulated: Vec<f64> = self
            .simulated(&first)
            .iter()
            .zip(self.simulated(&second))
            .map(|(a, b)| a + b)
            .collect();
        let simulated_total: f64 = simulated.iter().sum();
        let observed_total: f64 = self.density.iter().sum();
        Some(
            simulated
                .iter()
                .zip(&self.density)
                .map(|(s, o)| ((s / simulated_total) * (o / observed_total)).sqrt())
                .sum(),
        )
    }

    /// Area of the smaller fitted mode over the larger one
    pub fn surface_ratio(&self) -> Option<f64> {
        let (first, second) = self.modes()?;
        let area_first: f64 = self.simulated(&first).iter().sum();
        let area_second: f64 = self.simulated(&second).iter().sum();
        Some(area_first.min(area_second) / area_first.max(area_second))
    }

    /// Between-class variance at the valley of the fitted mixture.
    ///
    /// Falls back to the histogram-sweep `sigma_max` when no valley can be
    /// located between the two fitted peaks.
    pub fn bimodality_coefficient(&self) -> Option<f64> {
        let (first, second) = self.modes()?;
        Some(self.valley_coefficient(&first, &second).unwrap_or_else(|| self.sweep_sigma()))
    }

    fn valley_coefficient(&self, first: &GaussianMode, second: &GaussianMode) -> Option<f64> {
        let simul_first = self.simulated(first);
        let simul_second = self.simulated(second);
        let simul_all: Vec<f64> = simul_first.iter().zip(&simul_second).map(|(a, b)| a + b).collect();

        let start = stats::argmax(&simul_first)?.saturating_sub(1);
        let end = stats::argmax(&simul_second)?.min(simul_all.len());
        if end <= start {
            return None;
        }
        let valley = start + stats::argmin(&simul_all[start..end])?;
        let value = self.centers[valley];

        let lower: Vec<f64> = self.samples.iter().copied().filter(|&v| v <= value).collect();
        let upper: Vec<f64> = self.samples.iter().copied().filter(|&v| v >= value).collect();
        let mean_lower = stats::mean(&lower)?;
        let mean_upper = stats::mean(&upper)?;

        let mass = |keep: &dyn Fn(f64) -> bool| -> f64 {
            self.centers
                .iter()
                .zip(&self.density)
                .filter(|(c, _)| keep(**c))
                .map(|(_, d)| d)
                .sum::<f64>()
                * self.bin_width
        };
        let prob_lower = mass(&|c| c <= value);
        let prob_upper = mass(&|c| c >= value);

        let variance = stats::variance(&self.samples, 0)?;
        let sigma_b = prob_lower * prob_upper * (mean_lower - mean_upper).powi(2) / variance;
        sigma_b.is_finite().then_some(sigma_b)
    }

    /// Sarle's bimodality coefficient from sample skewness and kurtosis
    pub fn bc_coefficient(&self) -> f64 {
        let n = self.samples.len() as f64;
        let skew = stats::skewness(&self.samples);
        let kurtosis = stats::excess_kurtosis(&self.samples);
        let adjustment = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
        (skew * skew + 1.0) / (kurtosis + adjustment)
    }

    /// All metrics; mixture metrics are zero when the fit failed.
    pub fn metrics(&self) -> MetricSet {
        match (self.ashman(), self.bhattacharyya(), self.surface_ratio(), self.bimodality_coefficient()) {
            (Some(ashman), Some(bhattacharyya), Some(surface_ratio), Some(bimodality_coefficient)) => {
                MetricSet {
                    ashman,
                    bhattacharyya,
                    surface_ratio,
                    bimodality_coefficient,
                    bc_coefficient: self.bc_coefficient(),
                }
            }
            _ => MetricSet {
                bimodality_coefficient: self.sweep_sigma(),
                bc_coefficient: self.bc_coefficient(),
                ..MetricSet::default()
            },
        }
    }

    /// Whether the sample separates into two populations
    pub fn is_bimodal(&self, thresholds: &BimodalityThresholds) -> bool {
        if self.fit.is_converged() && self.samples.len() > 4 {
            let metrics = self.metrics();
            let votes = [
                metrics.ashman > thresholds.ashman,
                metrics.bimodality_coefficient > thresholds.bm_coefficient,
                metrics.bc_coefficient > BC_THRESHOLD,
            ]
            .iter()
            .filter(|&&v| v)
            .count();

            (votes >= 2 || metrics.ashman > STRONG_ASHMAN)
                && metrics.surface_ratio > thresholds.surface_ratio
        } else {
            self.sweep().is_some_and(|s| {
                s.sigma_max > thresholds.bm_coefficient && s.ad_max > SWEEP_AD_THRESHOLD
            })
        }
    }
}

/// `sqrt(2) * |mean1 - mean2| / sqrt(std1^2 + std2^2)`
pub fn ashman_coefficient(a: &GaussianMode, b: &GaussianMode) -> f64 {
    std::f64::consts::SQRT_2 * (a.mean - b.mean).abs() / (a.std * a.std + b.std * b.std).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ashman_formula() {
        let a = GaussianMode::new(-20.0, 1.0, 0.1);
        let b = GaussianMode::new(-10.0, 1.0, 0.1);
        assert_relative_eq!(ashman_coefficient(&a, &b), 10.0);
        assert_relative_eq!(ashman_coefficient(&b, &a), 10.0);
    }

    #[test]
    fn test_sweep_needs_three_samples() {
        let params = EstimatorParams::default();
        assert!(estimate_sweep(&[-10.0, -12.0], &params).is_none());
        assert!(estimate_sweep(&[-10.0, f64::NAN, -12.0, f64::NEG_INFINITY], &params).is_none());
    }

    #[test]
    fn test_sweep_constant_sample() {
        let estimate = estimate_sweep(&[-10.0; 50], &EstimatorParams::default()).unwrap();
        assert_eq!(estimate, SweepEstimate { sigma_max: 0.0, ad_max: 0.0 });
    }

    #[test]
    fn test_constant_intensity_is_rejected() {
        let estimator = BimodalityEstimator::new(&[0.1; 100], &EstimatorParams::default());
        assert_eq!(estimator.fit(), &FitOutcome::Failed(FitFailure::DegenerateSample));
        assert!(!estimator.is_bimodal(&BimodalityThresholds::default()));
        let metrics = estimator.metrics();
        assert_eq!(metrics.ashman, 0.0);
        assert_eq!(metrics.bimodality_coefficient, 0.0);
    }

    #[test]
    fn test_zero_and_nan_are_dropped() {
        let estimator = BimodalityEstimator::new(&[0.0, f64::NAN, 0.1, 0.01], &EstimatorParams::default());
        assert_eq!(estimator.sample_len(), 2);
        assert!(!estimator.is_bimodal(&BimodalityThresholds::default()));
    }
}
