//! Filling of water gaps falsely left as land.
//!
//! Inputs are components of the non-water mask. A component that the
//! ancillary data marks as water is filled when its intensity, together with
//! the surrounding water, shows no clear second population.

use crate::core::bimodality::{estimate_sweep, BimodalityThresholds, EstimatorParams};
use crate::core::classifier::{
    dilation_margin, BandSelection, ComponentJob, ComponentPatch, ComponentVerdict, PassRasters,
    RefinementPhase,
};
use crate::core::morphology::constrained_dilation;
use crate::io::block::BlockParam;
use crate::io::store::BlockRasterStore;
use crate::types::SarResult;
use ndarray::{Array2, Zip};
use std::path::PathBuf;

/// Water share above which a gap is tested at all
pub const WATER_DOMINANCE: f64 = 0.99;

/// Separation limits of the histogram sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapFillThresholds {
    /// Upper `sigma_max` bound of a fillable gap
    pub bt: f64,
    /// Upper `ad_max` bound of a fillable gap
    pub ad: f64,
}

impl From<&BimodalityThresholds> for GapFillThresholds {
    fn from(thresholds: &BimodalityThresholds) -> Self {
        Self {
            bt: thresholds.bm_coefficient,
            ad: thresholds.ashman,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrightWaterClassifier {
    pub intensity: PathBuf,
    pub reference_land: PathBuf,
    pub landcover: PathBuf,
    pub no_data: PathBuf,
    /// Landcover label of pixels without landcover information
    pub landcover_no_data: i32,
    pub thresholds: GapFillThresholds,
    pub estimator: EstimatorParams,
    pub minimum_pixel: usize,
}

impl BrightWaterClassifier {
    /// `(bt, ad)` for untested gaps; always above both limits
    fn untested(&self) -> (f64, f64) {
        (self.thresholds.bt + 0.5, self.thresholds.ad + 0.5)
    }
}

impl RefinementPhase for BrightWaterClassifier {
    fn name(&self) -> &'static str {
        "fill_gap"
    }

    fn minimum_pixel(&self) -> usize {
        self.minimum_pixel
    }

    fn margin(&self, size: usize) -> usize {
        dilation_margin(size, 5)
    }

    fn prepare_block<S: BlockRasterStore>(
        &self,
        store: &S,
        mask: &mut Array2<bool>,
        block: &BlockParam,
    ) -> SarResult<()> {
        let no_data: Array2<u8> = store.get_raster_block(&self.no_data, block)?;
        Zip::from(mask).and(&no_data).for_each(|m, &nd| {
            if nd == 1 {
                *m = false;
            }
        });
        Ok(())
    }

    fn classify<S: BlockRasterStore>(
        &self,
        store: &S,
        job: &ComponentJob,
        band: &BandSelection,
        rasters: &PassRasters<'_>,
    ) -> SarResult<ComponentVerdict> {
        if job.size < self.minimum_pixel {
            return Ok(ComponentVerdict::rejected(job.label));
        }

        let patch = ComponentPatch::read(store, job, &self.intensity, band, &self.no_data, rasters)?;
        let reference_land: Array2<u8> = store.read_window(&self.reference_land, 1, &job.window)?;
        let landcover: Array2<i32> = store.read_window(&self.landcover, 1, &job.window)?;
        let is_water = Zip::from(&reference_land)
            .and(&landcover)
            .map_collect(|&land, &cover| land == 0 || cover == self.landcover_no_data);

        let portion = patch.portion(&is_water);
        let water_portion = if portion.is_nan() { 0.0 } else { portion };

        let (bt, ad, sweep) = if water_portion > WATER_DOMINANCE {
            let dilated = constrained_dilation(
                patch.component.view(),
                self.margin(job.size),
                patch.growable().view(),
            );
            let sample: Vec<f64> = patch
                .values(&dilated, false)
                .into_iter()
                .map(|v| 10.0 * v.log10())
                .collect();
            match estimate_sweep(&sample, &self.estimator) {
                Some(estimate) => (estimate.sigma_max, estimate.ad_max, Some(estimate)),
                None => {
                    let (bt, ad) = self.untested();
                    (bt, ad, None)
                }
            }
        } else {
            let (bt, ad) = self.untested();
            (bt, ad, None)
        };

        Ok(ComponentVerdict {
            label: job.label,
            accepted: bt < self.thresholds.bt || ad < self.thresholds.ad,
            ancillary_portion: water_portion,
            metrics: None,
            sweep,
        })
    }
}
