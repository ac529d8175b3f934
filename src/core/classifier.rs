//! Per-component classification shared by both refinement phases.
//!
//! A [`RefinementPhase`] decides, for one connected component of the phase
//! mask, whether the component is accepted. Classification only reads small
//! raster windows around the component and never writes.

use crate::core::bimodality::{MetricSet, SweepEstimate};
use crate::io::block::{BlockParam, PixelBox, Window};
use crate::io::store::BlockRasterStore;
use crate::types::{IntensityBand, SarResult};
use ndarray::{Array2, Zip};
use std::path::Path;

/// One component handed to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentJob {
    /// Label of the component in the pass label raster
    pub label: i32,
    pub size: usize,
    /// Bounding box in image coordinates
    pub bbox: PixelBox,
    /// Window read by the worker (bounding box plus dilation margin)
    pub window: Window,
}

/// Band of the intensity raster a component is tested on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandSelection {
    /// 1-based band index
    pub index: usize,
    pub band: IntensityBand,
}

/// Outcome of classifying one component on one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentVerdict {
    pub label: i32,
    pub accepted: bool,
    /// Fraction of the component flagged by the ancillary data (land for the
    /// dark-land test, water for the gap-fill test); NaN when not computed
    pub ancillary_portion: f64,
    pub metrics: Option<MetricSet>,
    pub sweep: Option<SweepEstimate>,
}

impl ComponentVerdict {
    pub fn rejected(label: i32) -> Self {
        Self {
            label,
            accepted: false,
            ancillary_portion: f64::NAN,
            metrics: None,
            sweep: None,
        }
    }

    pub fn accepted(label: i32, ancillary_portion: f64) -> Self {
        Self {
            accepted: true,
            ancillary_portion,
            ..Self::rejected(label)
        }
    }
}

/// Rasters a worker reads besides the phase ancillary inputs
#[derive(Debug, Clone, Copy)]
pub struct PassRasters<'a> {
    /// Component labels of the current pass
    pub labels: &'a Path,
    /// Binary mask the phase started from (1 = candidate)
    pub phase_mask: &'a Path,
}

pub trait RefinementPhase: Sync {
    /// Short name used in scratch file names
    fn name(&self) -> &'static str;

    fn minimum_pixel(&self) -> usize;

    /// Dilation margin (and window padding) for a component of `size` pixels
    fn margin(&self, size: usize) -> usize;

    /// Whether verdicts carry a metric set worth writing out
    fn reports_metrics(&self) -> bool {
        false
    }

    /// Adjust a block of the phase mask before labeling
    fn prepare_block<S: BlockRasterStore>(
        &self,
        _store: &S,
        _mask: &mut Array2<bool>,
        _block: &BlockParam,
    ) -> SarResult<()> {
        Ok(())
    }

    fn classify<S: BlockRasterStore>(
        &self,
        store: &S,
        job: &ComponentJob,
        band: &BandSelection,
        rasters: &PassRasters<'_>,
    ) -> SarResult<ComponentVerdict>;
}

/// `max(floor, floor((sqrt(2) - 1.2) * sqrt(size)))`
pub fn dilation_margin(size: usize, floor: usize) -> usize {
    let margin = ((std::f64::consts::SQRT_2 - 1.2) * (size as f64).sqrt()) as usize;
    margin.max(floor)
}

/// Component pixels and their surroundings inside a job window
pub(crate) struct ComponentPatch {
    pub component: Array2<bool>,
    /// Pixels outside every candidate of the phase mask
    pub outside: Array2<bool>,
    pub intensity: Array2<f64>,
    /// Finite intensity and not flagged as no-data
    pub valid: Array2<bool>,
}

impl ComponentPatch {
    pub fn read<S: BlockRasterStore>(
        store: &S,
        job: &ComponentJob,
        intensity_path: &Path,
        band: &BandSelection,
        no_data_path: &Path,
        rasters: &PassRasters<'_>,
    ) -> SarResult<Self> {
        let labels: Array2<i32> = store.read_window(rasters.labels, 1, &job.window)?;
        let mask: Array2<u8> = store.read_window(rasters.phase_mask, 1, &job.window)?;
        let intensity: Array2<f64> = store.read_window(intensity_path, band.index, &job.window)?;
        let no_data: Array2<u8> = store.read_window(no_data_path, 1, &job.window)?;

        let component = labels.mapv(|l| l == job.label);
        let outside = mask.mapv(|m| m == 0);
        let valid = Zip::from(&intensity)
            .and(&no_data)
            .map_collect(|v, &nd| v.is_finite() && nd != 1);

        Ok(Self {
            component,
            outside,
            intensity,
            valid,
        })
    }

    /// Pixels a dilation of the component may grow into
    pub fn growable(&self) -> Array2<bool> {
        Zip::from(&self.valid)
            .and(&self.outside)
            .map_collect(|&v, &o| v && o)
    }

    /// Mean of `flag` over the component pixels
    pub fn portion(&self, flag: &Array2<bool>) -> f64 {
        let (hits, total) = Zip::from(&self.component)
            .and(flag)
            .fold((0usize, 0usize), |(hits, total), &c, &f| {
                if c {
                    (hits + usize::from(f), total + 1)
                } else {
                    (hits, total)
                }
            });
        if total == 0 {
            f64::NAN
        } else {
            hits as f64 / total as f64
        }
    }

    /// Intensities under `selection`, optionally restricted to usable samples
    pub fn values(&self, selection: &Array2<bool>, usable_only: bool) -> Vec<f64> {
        Zip::from(selection)
            .and(&self.intensity)
            .fold(Vec::new(), |mut acc, &s, &v| {
                if s && (!usable_only || (v.is_finite() && v != 0.0)) {
                    acc.push(v);
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dilation_margin_floors() {
        assert_eq!(dilation_margin(4, 1), 1);
        assert_eq!(dilation_margin(4, 5), 5);
        // (sqrt(2) - 1.2) * 100 = 21.4
        assert_eq!(dilation_margin(10_000, 1), 21);
        assert_eq!(dilation_margin(10_000, 5), 21);
    }

    #[test]
    fn test_rejected_verdict() {
        let verdict = ComponentVerdict::rejected(7);
        assert!(!verdict.accepted);
        assert!(verdict.ancillary_portion.is_nan());
        assert!(ComponentVerdict::accepted(7, 0.5).accepted);
    }
}
