//! Removal of dark land falsely detected as water.
//!
//! A water component mostly covered by reference land is kept only when its
//! intensity is separable from the surrounding land, i.e. the component plus
//! its adjacent ring form a bimodal sample.

use crate::core::bimodality::{BimodalityEstimator, BimodalityThresholds, EstimatorParams};
use crate::core::classifier::{
    dilation_margin, BandSelection, ComponentJob, ComponentPatch, ComponentVerdict, PassRasters,
    RefinementPhase,
};
use crate::core::morphology::{constrained_dilation, ring};
use crate::core::stats;
use crate::io::store::BlockRasterStore;
use crate::types::SarResult;
use std::path::PathBuf;

/// Land share above which a component has to prove it is water
pub const LAND_DOMINANCE: f64 = 0.8;

/// Percentile of the adjacent ring compared with the component median
const ADJACENT_PERCENTILE: f64 = 15.0;

/// Smallest usable sample handed to the bimodality test
const MIN_SAMPLES: usize = 5;

#[derive(Debug, Clone)]
pub struct DarkLandClassifier {
    pub intensity: PathBuf,
    pub reference_land: PathBuf,
    pub no_data: PathBuf,
    pub thresholds: BimodalityThresholds,
    pub estimator: EstimatorParams,
    pub minimum_pixel: usize,
    /// Keep the metric set of every tested component
    pub collect_metrics: bool,
}

impl RefinementPhase for DarkLandClassifier {
    fn name(&self) -> &'static str {
        "dark_land"
    }

    fn minimum_pixel(&self) -> usize {
        self.minimum_pixel
    }

    fn margin(&self, size: usize) -> usize {
        dilation_margin(size, 1)
    }

    fn reports_metrics(&self) -> bool {
        self.collect_metrics
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
        let land = store
            .read_window::<u8>(&self.reference_land, 1, &job.window)?
            .mapv(|v| v == 1);
        let land_portion = patch.portion(&land);

        if land_portion.is_nan() {
            return Ok(ComponentVerdict::rejected(job.label));
        }
        if land_portion <= LAND_DOMINANCE {
            return Ok(ComponentVerdict::accepted(job.label, land_portion));
        }

        let dilated = constrained_dilation(
            patch.component.view(),
            self.margin(job.size),
            patch.growable().view(),
        );
        let adjacent = ring(patch.component.view(), dilated.view());

        let center: Vec<f64> = patch
            .values(&patch.component, false)
            .into_iter()
            .filter(|v| v.is_finite())
            .collect();
        let surrounding: Vec<f64> = patch
            .values(&adjacent, false)
            .into_iter()
            .filter(|v| v.is_finite())
            .collect();

        let mut verdict = ComponentVerdict {
            ancillary_portion: land_portion,
            ..ComponentVerdict::rejected(job.label)
        };

        if let (Some(center), Some(adjacent_low)) = (
            stats::median(&center),
            stats::percentile(&surrounding, ADJACENT_PERCENTILE),
        ) {
            if center > adjacent_low {
                log::debug!(
                    "component {} brighter than its surroundings ({:.4} > {:.4})",
                    job.label,
                    center,
                    adjacent_low
                );
                verdict.accepted = true;
                return Ok(verdict);
            }
        }

        let sample = patch.values(&dilated, true);
        if sample.len() < MIN_SAMPLES {
            return Ok(verdict);
        }

        let estimator = BimodalityEstimator::new(&sample, &self.estimator);
        verdict.accepted = estimator.is_bimodal(&self.thresholds);
        if self.collect_metrics {
            verdict.metrics = Some(estimator.metrics());
        }
        Ok(verdict)
    }
}
