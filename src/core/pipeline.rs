//! End-to-end bimodality refinement of a water mask.
//!
//! 1. validate the ancillary rasters,
//! 2. remove dark land falsely classified as water (co-pol bands),
//! 3. fill water gaps in the inverted result (all backscatter bands),
//! 4. OR the two results into the refined mask.

use crate::config::RefinementConfig;
use crate::context::RunContext;
use crate::core::bright_water::{BrightWaterClassifier, GapFillThresholds};
use crate::core::classifier::BandSelection;
use crate::core::dark_land::DarkLandClassifier;
use crate::core::dispatch::ParallelDispatcher;
use crate::core::reconcile::{BlockBoundaryReconciler, PhaseSummary};
use crate::io::block::block_param_generator;
use crate::io::merge::{merge_binary_layers, MergeMode};
use crate::io::store::{BlockRasterStore, WriteOptions};
use crate::types::{IntensityBand, RasterMeta, SarError, SarResult};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct RefinementSummary {
    pub run_id: String,
    pub started: DateTime<Utc>,
    pub rows: usize,
    pub cols: usize,
    pub dark_land: PhaseSummary,
    pub fill_gap: PhaseSummary,
    pub output: PathBuf,
    pub water_pixels_in: usize,
    pub water_pixels_out: usize,
    pub elapsed_seconds: f64,
}

pub struct RefinementPipeline<'a, S: BlockRasterStore> {
    config: RefinementConfig,
    store: &'a S,
}

impl<'a, S: BlockRasterStore> RefinementPipeline<'a, S> {
    pub fn new(config: RefinementConfig, store: &'a S) -> SarResult<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    pub fn run(&self) -> SarResult<RefinementSummary> {
        let config = &self.config;
        let ctx = RunContext::begin("refine_bimodality", &config.scratch_dir, config.debug_mode)?;
        let target = ctx.target().to_string();

        let meta = self.validate_inputs()?;
        self.check_degenerate(&meta)?;
        log::info!(
            target: target.as_str(),
            "Refining {}x{} water mask with bands {:?}",
            meta.rows,
            meta.cols,
            config.polarizations
        );

        let options = WriteOptions::new(config.cog, ctx.scratch_dir());
        let reference_land = match &config.inputs.reference_land {
            Some(path) => path.clone(),
            None => self.derive_reference_land(&ctx, &meta, &options)?,
        };

        let dispatcher = ParallelDispatcher::new(config.number_workers)?;
        let reconciler = BlockBoundaryReconciler::new(
            self.store,
            &dispatcher,
            &ctx,
            meta.clone(),
            config.lines_per_block,
            options.clone(),
        );

        let dark_land = DarkLandClassifier {
            intensity: config.inputs.intensity.clone(),
            reference_land: reference_land.clone(),
            no_data: config.inputs.no_data.clone(),
            thresholds: config.thresholds,
            estimator: config.estimator.clone(),
            minimum_pixel: config.minimum_pixel,
            collect_metrics: ctx.debug(),
        };
        let water_after_dark_land = ctx.scratch_path("water_after_dark_land.tif");
        let dark_land_summary = reconciler.run(
            &dark_land,
            &config.inputs.water_mask,
            &selections(config.copol_bands()),
            &water_after_dark_land,
        )?;

        let non_water = ctx.scratch_path("non_water.tif");
        self.invert(&water_after_dark_land, &non_water, &meta, &options)?;

        let bright_water = BrightWaterClassifier {
            intensity: config.inputs.intensity.clone(),
            reference_land,
            landcover: config.inputs.landcover.clone(),
            no_data: config.inputs.no_data.clone(),
            landcover_no_data: config.landcover_labels.no_data,
            thresholds: GapFillThresholds::from(&config.thresholds),
            estimator: config.estimator.clone(),
            minimum_pixel: config.minimum_pixel,
        };
        let filled_gaps = ctx.scratch_path("filled_gaps.tif");
        let fill_gap_summary = reconciler.run(
            &bright_water,
            &non_water,
            &selections(config.backscatter_bands()),
            &filled_gaps,
        )?;

        merge_binary_layers(
            self.store,
            &[water_after_dark_land, filled_gaps],
            &[1, 1],
            &config.output_path,
            config.lines_per_block,
            MergeMode::Or,
            &options,
        )?;

        let water_pixels_in = self.count_set(&config.inputs.water_mask, &meta)?;
        let water_pixels_out = self.count_set(&config.output_path, &meta)?;
        log::info!(
            target: target.as_str(),
            "Water pixels {} -> {} ({} dark-land components kept, {} gaps filled)",
            water_pixels_in,
            water_pixels_out,
            dark_land_summary.accepted(),
            fill_gap_summary.accepted()
        );

        let run_id = ctx.run_id().to_string();
        let started = ctx.started();
        let summary_path = ctx.scratch_path("refinement_summary.json");
        let elapsed = ctx.finish();

        let summary = RefinementSummary {
            run_id,
            started,
            rows: meta.rows,
            cols: meta.cols,
            dark_land: dark_land_summary,
            fill_gap: fill_gap_summary,
            output: config.output_path.clone(),
            water_pixels_in,
            water_pixels_out,
            elapsed_seconds: elapsed.as_secs_f64(),
        };
        std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

        Ok(summary)
    }

    /// Check that every input exists and shares the water mask grid
    fn validate_inputs(&self) -> SarResult<RasterMeta> {
        let inputs = &self.config.inputs;
        let mut paths = vec![&inputs.water_mask, &inputs.intensity, &inputs.landcover, &inputs.no_data];
        if let Some(reference_land) = &inputs.reference_land {
            paths.push(reference_land);
        }
        for path in &paths {
            if !self.store.exists(path) {
                return Err(SarError::MissingAncillaryFile(path.to_path_buf()));
            }
        }

        let meta = self.store.meta(&inputs.water_mask)?;
        if meta.rows == 0 || meta.cols == 0 {
            return Err(SarError::InvalidFormat(format!(
                "{} is empty",
                inputs.water_mask.display()
            )));
        }
        for path in &paths[1..] {
            let other = self.store.meta(path)?;
            if other.shape() != meta.shape() {
                return Err(SarError::InvalidFormat(format!(
                    "{} has shape {:?}, water mask has {:?}",
                    path.display(),
                    other.shape(),
                    meta.shape()
                )));
            }
        }

        let band_count = self.store.band_count(&inputs.intensity)?;
        if band_count < self.config.polarizations.len() {
            return Err(SarError::InvalidFormat(format!(
                "{} has {} bands, {} configured",
                inputs.intensity.display(),
                band_count,
                self.config.polarizations.len()
            )));
        }

        Ok(meta)
    }

    /// Reject intensity bands without signal and landcover without classes
    fn check_degenerate(&self, meta: &RasterMeta) -> SarResult<()> {
        let inputs = &self.config.inputs;
        let blocks = block_param_generator(self.config.lines_per_block, meta.shape(), 0)?;

        for (index, band) in self.config.backscatter_bands() {
            let (mut sum, mut count) = (0.0f64, 0usize);
            for block in &blocks {
                let data: Array2<f64> = self.store.get_band_block(&inputs.intensity, index, block)?;
                for v in data.iter().filter(|v| v.is_finite()) {
                    sum += v;
                    count += 1;
                }
            }
            let mean = if count == 0 { f64::NAN } else { sum / count as f64 };
            if !mean.is_finite() || mean == 0.0 {
                return Err(SarError::DegenerateAncillaryData(format!(
                    "intensity band {} of {} has mean {}",
                    band,
                    inputs.intensity.display(),
                    mean
                )));
            }
        }

        let no_data_label = self.config.landcover_labels.no_data;
        let mut classified = false;
        for block in &blocks {
            let landcover: Array2<i32> = self.store.get_raster_block(&inputs.landcover, block)?;
            if landcover.iter().any(|&v| v != no_data_label) {
                classified = true;
                break;
            }
        }
        if !classified {
            return Err(SarError::DegenerateAncillaryData(format!(
                "{} contains no landcover classes",
                inputs.landcover.display()
            )));
        }
        Ok(())
    }

    fn derive_reference_land(
        &self,
        ctx: &RunContext,
        meta: &RasterMeta,
        options: &WriteOptions,
    ) -> SarResult<PathBuf> {
        let labels = self.config.landcover_labels;
        let path = ctx.scratch_path("reference_land.tif");
        log::info!(target: ctx.target(), "Deriving reference land from {}", self.config.inputs.landcover.display());

        for block in block_param_generator(self.config.lines_per_block, meta.shape(), 0)? {
            let landcover: Array2<i32> = self.store.get_raster_block(&self.config.inputs.landcover, &block)?;
            let land = landcover.mapv(|v| u8::from(labels.is_land(v)));
            self.store.write_raster_block(&path, &land, &block, meta, options)?;
        }
        Ok(path)
    }

    fn invert(&self, input: &Path, output: &Path, meta: &RasterMeta, options: &WriteOptions) -> SarResult<()> {
        for block in block_param_generator(self.config.lines_per_block, meta.shape(), 0)? {
            let data: Array2<u8> = self.store.get_raster_block(input, &block)?;
            let inverted = data.mapv(|v| u8::from(v != 1));
            self.store.write_raster_block(output, &inverted, &block, meta, options)?;
        }
        Ok(())
    }

    fn count_set(&self, path: &Path, meta: &RasterMeta) -> SarResult<usize> {
        let mut count = 0;
        for block in block_param_generator(self.config.lines_per_block, meta.shape(), 0)? {
            let data: Array2<u8> = self.store.get_raster_block(path, &block)?;
            count += data.iter().filter(|&&v| v == 1).count();
        }
        Ok(count)
    }
}

fn selections(bands: Vec<(usize, IntensityBand)>) -> Vec<BandSelection> {
    bands
        .into_iter()
        .map(|(index, band)| BandSelection { index, band })
        .collect()
}
