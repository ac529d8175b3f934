//! Two-pass execution of a refinement phase.
//!
//! The block pass labels the phase mask one row block at a time and
//! classifies every component that lies fully inside its block. Components
//! touching a seam between blocks are deferred through a check mask; the
//! full-image pass labels only the deferred pixels, as one block, so each of
//! them is scored on its complete extent. The two pass outputs are OR-merged.

use crate::context::RunContext;
use crate::core::bimodality::MetricSet;
use crate::core::classifier::{BandSelection, ComponentJob, PassRasters, RefinementPhase};
use crate::core::dispatch::ParallelDispatcher;
use crate::core::labeling::label_components;
use crate::io::block::{block_param_generator, BlockParam, Window};
use crate::io::merge::{merge_binary_layers, MergeMode};
use crate::io::store::{BlockRasterStore, WriteOptions};
use crate::types::{IntensityBand, RasterMeta, SarError, SarResult};
use ndarray::Array2;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Counters of one pass over the phase mask
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub pass: usize,
    pub lines_per_block: usize,
    pub blocks: usize,
    pub components: usize,
    pub dispatched: usize,
    pub deferred: usize,
    pub accepted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub bands: Vec<IntensityBand>,
    pub passes: Vec<PassSummary>,
    pub output: PathBuf,
}

impl PhaseSummary {
    pub fn accepted(&self) -> usize {
        self.passes.iter().map(|p| p.accepted).sum()
    }

    pub fn deferred(&self) -> usize {
        self.passes.iter().map(|p| p.deferred).sum()
    }
}

/// Per-label results of one block, indexed by local label (0 = background)
struct BlockVerdicts {
    accepted: Vec<bool>,
    checked: Vec<bool>,
    portion: Vec<Vec<f64>>,
    metrics: Vec<Vec<MetricSet>>,
}

impl BlockVerdicts {
    fn new(max_label: usize, bands: usize) -> Self {
        Self {
            accepted: vec![false; max_label + 1],
            checked: vec![false; max_label + 1],
            portion: vec![vec![-1.0; max_label + 1]; bands],
            metrics: vec![vec![MetricSet::default(); max_label + 1]; bands],
        }
    }
}

pub struct BlockBoundaryReconciler<'a, S: BlockRasterStore> {
    store: &'a S,
    dispatcher: &'a ParallelDispatcher,
    ctx: &'a RunContext,
    meta: RasterMeta,
    lines_per_block: usize,
    options: WriteOptions,
}

impl<'a, S: BlockRasterStore> BlockBoundaryReconciler<'a, S> {
    pub fn new(
        store: &'a S,
        dispatcher: &'a ParallelDispatcher,
        ctx: &'a RunContext,
        meta: RasterMeta,
        lines_per_block: usize,
        options: WriteOptions,
    ) -> Self {
        Self {
            store,
            dispatcher,
            ctx,
            meta,
            lines_per_block,
            options,
        }
    }

    fn scratch(&self, phase: &str, name: &str, pass: usize) -> PathBuf {
        self.ctx.scratch_path(&format!("{}_{}_{}.tif", name, phase, pass))
    }

    /// Run `phase` over the binary raster `input` (1 = candidate) and write the
    /// accepted components to `output`.
    pub fn run<P: RefinementPhase>(
        &self,
        phase: &P,
        input: &Path,
        bands: &[BandSelection],
        output: &Path,
    ) -> SarResult<PhaseSummary> {
        let target = self.ctx.target();
        let mut summary = PhaseSummary {
            phase: phase.name().to_string(),
            bands: bands.iter().map(|b| b.band).collect(),
            passes: Vec::new(),
            output: output.to_path_buf(),
        };

        if bands.is_empty() {
            log::warn!(
                target: target,
                "{}: no backscatter band to test, passing {} through",
                phase.name(),
                input.display()
            );
            merge_binary_layers(
                self.store,
                &[input.to_path_buf()],
                &[1],
                output,
                self.lines_per_block,
                MergeMode::Or,
                &self.options,
            )?;
            return Ok(summary);
        }

        let phase_mask = self.ctx.scratch_path(&format!("{}_mask.tif", phase.name()));
        self.prepare_mask(phase, input, &phase_mask)?;

        let mut pass_outputs = Vec::new();
        let mut source = phase_mask.clone();
        for (pass, lines_per_block) in [self.lines_per_block, self.meta.rows].into_iter().enumerate() {
            if pass > 0 && summary.passes.iter().all(|p| p.deferred == 0) {
                log::info!(target: target, "{}: no deferred components, skipping full-image pass", phase.name());
                break;
            }

            let pass_output = self.scratch(phase.name(), "refined", pass);
            let check = self.scratch(phase.name(), "check", pass);
            let pass_summary = self.run_pass(
                phase,
                pass,
                lines_per_block,
                &source,
                &phase_mask,
                bands,
                &pass_output,
                &check,
            )?;

            log::info!(
                target: target,
                "{} pass {}: {} components, {} classified, {} deferred, {} accepted",
                phase.name(),
                pass,
                pass_summary.components,
                pass_summary.dispatched,
                pass_summary.deferred,
                pass_summary.accepted
            );

            summary.passes.push(pass_summary);
            pass_outputs.push(pass_output);
            source = check;
        }

        merge_binary_layers(
            self.store,
            &pass_outputs,
            &vec![1u8; pass_outputs.len()],
            output,
            self.lines_per_block,
            MergeMode::Or,
            &self.options,
        )?;

        Ok(summary)
    }

    /// Copy `input` to `phase_mask` with the phase's own masking applied
    fn prepare_mask<P: RefinementPhase>(&self, phase: &P, input: &Path, phase_mask: &Path) -> SarResult<()> {
        let input_meta = self.store.meta(input)?;
        if input_meta.shape() != self.meta.shape() {
            return Err(SarError::InvalidFormat(format!(
                "{} has shape {:?}, expected {:?}",
                input.display(),
                input_meta.shape(),
                self.meta.shape()
            )));
        }

        for block in block_param_generator(self.lines_per_block, self.meta.shape(), 0)? {
            let data: Array2<u8> = self.store.get_raster_block(input, &block)?;
            let mut mask = data.mapv(|v| v == 1);
            phase.prepare_block(self.store, &mut mask, &block)?;
            self.store
                .write_raster_block(phase_mask, &mask.mapv(u8::from), &block, &self.meta, &self.options)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pass<P: RefinementPhase>(
        &self,
        phase: &P,
        pass: usize,
        lines_per_block: usize,
        source: &Path,
        phase_mask: &Path,
        bands: &[BandSelection],
        pass_output: &Path,
        check: &Path,
    ) -> SarResult<PassSummary> {
        let (rows, cols) = self.meta.shape();
        let labels_path = self.scratch(phase.name(), "labels", pass);
        let rasters = PassRasters {
            labels: &labels_path,
            phase_mask,
        };
        let blocks = block_param_generator(lines_per_block, (rows, cols), 0)?;

        let mut summary = PassSummary {
            pass,
            lines_per_block,
            blocks: blocks.len(),
            ..PassSummary::default()
        };
        let mut label_offset: i32 = 0;

        for block in &blocks {
            log::debug!(
                target: self.ctx.target(),
                "{} pass {} block rows {}..{}",
                phase.name(),
                pass,
                block.read_start_line,
                block.read_start_line + block.read_length
            );

            let data: Array2<u8> = self.store.get_raster_block(source, block)?;
            let labeling = label_components(data.mapv(|v| v == 1).view());
            let max_label = labeling.len();

            let global_labels = labeling.labels.mapv(|l| {
                if l == 0 {
                    0
                } else {
                    label_offset + l as i32
                }
            });
            self.store
                .write_raster_block(&labels_path, &global_labels, block, &self.meta, &self.options)?;

            let mut verdicts = BlockVerdicts::new(max_label, bands.len());
            let mut jobs = Vec::new();
            for component in &labeling.components {
                let local = component.label as usize;
                if block.is_artificial_edge(component.bbox.y0, rows)
                    || block.is_artificial_edge(component.bbox.y1, rows)
                {
                    verdicts.checked[local] = true;
                    continue;
                }

                let bbox = component.bbox.shifted_rows(block.read_start_line);
                jobs.push(ComponentJob {
                    label: label_offset + component.label as i32,
                    size: component.pixel_count,
                    bbox,
                    window: Window::around(&bbox, phase.margin(component.pixel_count), rows, cols),
                });
            }

            for (band_index, band) in bands.iter().enumerate() {
                let results = self.dispatcher.dispatch(phase, self.store, &jobs, band, &rasters);
                for verdict in results {
                    let local = (verdict.label - label_offset) as usize;
                    verdicts.accepted[local] |= verdict.accepted;
                    verdicts.portion[band_index][local] = verdict.ancillary_portion;
                    if let Some(metrics) = verdict.metrics {
                        verdicts.metrics[band_index][local] = metrics;
                    }
                }
            }

            summary.components += max_label;
            summary.dispatched += jobs.len();
            summary.deferred += verdicts.checked.iter().filter(|&&c| c).count();
            summary.accepted += verdicts.accepted.iter().filter(|&&a| a).count();

            let labels = &labeling.labels;
            let refined = labels.mapv(|l| u8::from(verdicts.accepted[l as usize]));
            let checked = labels.mapv(|l| u8::from(verdicts.checked[l as usize]));
            self.store
                .write_raster_block(pass_output, &refined, block, &self.meta, &self.options)?;
            self.store
                .write_raster_block(check, &checked, block, &self.meta, &self.options)?;

            if self.ctx.debug() {
                self.write_debug_block(phase, pass, block, labels, bands, &verdicts)?;
            }

            label_offset = label_offset
                .checked_add(max_label as i32)
                .ok_or_else(|| SarError::Processing("component label overflow".to_string()))?;
        }

        Ok(summary)
    }

    fn write_debug_block<P: RefinementPhase>(
        &self,
        phase: &P,
        pass: usize,
        block: &BlockParam,
        labels: &Array2<u32>,
        bands: &[BandSelection],
        verdicts: &BlockVerdicts,
    ) -> SarResult<()> {
        for (band_index, band) in bands.iter().enumerate() {
            let portion = &verdicts.portion[band_index];
            let portion_image = labels.mapv(|l| portion[l as usize] as f32);
            let path = self.ctx.scratch_path(&format!(
                "{}_portion_{}_{}.tif",
                phase.name(),
                band.band,
                pass
            ));
            self.store
                .write_raster_block(&path, &portion_image, block, &self.meta, &self.options)?;

            if !phase.reports_metrics() {
                continue;
            }
            let metrics = &verdicts.metrics[band_index];
            for (metric_index, name) in MetricSet::NAMES.iter().enumerate() {
                let image = labels.mapv(|l| metrics[l as usize].to_array()[metric_index] as f32);
                let path = self.ctx.scratch_path(&format!(
                    "{}_binary_{}_{}_{}.tif",
                    phase.name(),
                    name,
                    band.band,
                    pass
                ));
                self.store
                    .write_raster_block(&path, &image, block, &self.meta, &self.options)?;
            }
        }
        Ok(())
    }
}
