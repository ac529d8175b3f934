/// Fixed-range histogram with uniform bins.
///
/// Values outside `[min, max]` are ignored; `max` itself falls into the last
/// bin.
#[derive(Debug, Clone)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<f64>,
}

/// 3-tap smoothing kernel applied before the histogram sweep
pub const SMOOTHING_KERNEL: [f64; 3] = [0.2261, 0.5478, 0.2261];

impl Histogram {
    pub fn new(values: &[f64], min: f64, max: f64, bins: usize) -> Self {
        let width = (max - min) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
        let mut counts = vec![0.0; bins];

        for &v in values {
            if !v.is_finite() || v < min || v > max {
                continue;
            }
            let index = (((v - min) / width) as usize).min(bins - 1);
            counts[index] += 1.0;
        }

        Self { edges, counts }
    }

    /// Raw count of every bin
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Number of bins
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the histogram has no bins
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Width shared by all bins
    pub fn bin_width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    /// Midpoint of every bin
    pub fn bin_centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    /// Number of values that fell inside the range
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Probability density: counts / (in-range total * bin width).
    /// All NaN when no value fell inside the range.
    pub fn density(&self) -> Vec<f64> {
        let norm = self.total() * self.bin_width();
        self.counts.iter().map(|c| c / norm).collect()
    }

    /// Counts convolved with [`SMOOTHING_KERNEL`], zero padded, same length
    pub fn smoothed(&self) -> Vec<f64> {
        let n = self.counts.len();
        (0..n)
            .map(|i| {
                let left = if i > 0 { self.counts[i - 1] } else { 0.0 };
                let right = if i + 1 < n { self.counts[i + 1] } else { 0.0 };
                SMOOTHING_KERNEL[0] * left + SMOOTHING_KERNEL[1] * self.counts[i] + SMOOTHING_KERNEL[2] * right
            })
            .collect()
    }
}
