//! Run configuration.
//!
//! Every raster the refinement reads is named by its role in
//! [`AncillaryInputs`]; all other settings default to the values used for
//! operational processing.

use crate::core::bimodality::{BimodalityThresholds, EstimatorParams};
use crate::types::{IntensityBand, Polarization, SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rasters consumed by the refinement, all on the same grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncillaryInputs {
    /// Filtered intensity in linear power, one band per entry of `polarizations`
    pub intensity: PathBuf,
    /// Landcover classification
    pub landcover: PathBuf,
    /// Binary reference land (1 = land); derived from landcover when absent
    #[serde(default)]
    pub reference_land: Option<PathBuf>,
    /// Initial binary water classification (1 = water)
    pub water_mask: PathBuf,
    /// 1 where no valid data exists
    pub no_data: PathBuf,
}

/// Landcover class values the refinement relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandcoverLabels {
    pub permanent_water: i32,
    pub no_data: i32,
    /// Open sea class, when the landcover product has one
    pub open_sea: Option<i32>,
}

impl Default for LandcoverLabels {
    fn default() -> Self {
        Self {
            permanent_water: 80,
            no_data: 0,
            open_sea: None,
        }
    }
}

impl LandcoverLabels {
    /// Whether a landcover value counts as land for the reference mask
    pub fn is_land(&self, value: i32) -> bool {
        match self.open_sea {
            Some(open_sea) => value != open_sea && value != self.permanent_water,
            None => value != self.no_data && value != self.permanent_water,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub inputs: AncillaryInputs,
    pub scratch_dir: PathBuf,
    pub output_path: PathBuf,
    /// Band order of the intensity raster
    pub polarizations: Vec<IntensityBand>,
    /// Co-polarized channels used to remove dark land
    pub copol: Vec<Polarization>,
    pub minimum_pixel: usize,
    pub thresholds: BimodalityThresholds,
    pub estimator: EstimatorParams,
    pub landcover_labels: LandcoverLabels,
    pub number_workers: usize,
    pub lines_per_block: usize,
    pub debug_mode: bool,
    /// Write Cloud Optimized GeoTIFFs
    pub cog: bool,
}

impl Default for AncillaryInputs {
    fn default() -> Self {
        Self {
            intensity: PathBuf::from("intensity.tif"),
            landcover: PathBuf::from("landcover.tif"),
            reference_land: None,
            water_mask: PathBuf::from("water_mask.tif"),
            no_data: PathBuf::from("no_data.tif"),
        }
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            inputs: AncillaryInputs::default(),
            scratch_dir: PathBuf::from("scratch"),
            output_path: PathBuf::from("refined_water.tif"),
            polarizations: vec![
                IntensityBand::Backscatter(Polarization::VV),
                IntensityBand::Backscatter(Polarization::VH),
            ],
            copol: vec![Polarization::VV, Polarization::HH],
            minimum_pixel: 4,
            thresholds: BimodalityThresholds::default(),
            estimator: EstimatorParams::default(),
            landcover_labels: LandcoverLabels::default(),
            number_workers: 4,
            lines_per_block: 500,
            debug_mode: false,
            cog: true,
        }
    }
}

impl RefinementConfig {
    pub fn from_json_file(path: &Path) -> SarResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SarResult<()> {
        if self.lines_per_block == 0 {
            return Err(SarError::Config("lines_per_block must be positive".to_string()));
        }
        if self.number_workers == 0 {
            return Err(SarError::Config("number_workers must be positive".to_string()));
        }
        if self.polarizations.is_empty() {
            return Err(SarError::Config("at least one intensity band is required".to_string()));
        }
        if self.estimator.hist_bins < 2 || self.estimator.sweep_bins < 2 {
            return Err(SarError::Config("histograms need at least two bins".to_string()));
        }
        if !(self.estimator.hist_min < self.estimator.hist_max)
            || !(self.estimator.sweep_min < self.estimator.sweep_max)
        {
            return Err(SarError::Config("histogram range is empty".to_string()));
        }
        let (low, high) = self.estimator.otsu_window;
        if !(low < high) {
            return Err(SarError::Config(format!("invalid Otsu window [{}, {}]", low, high)));
        }
        Ok(())
    }

    /// Co-polarized backscatter bands with their 1-based raster index
    pub fn copol_bands(&self) -> Vec<(usize, IntensityBand)> {
        self.indexed_bands()
            .filter(|(_, band)| band.polarization().is_some_and(|p| self.copol.contains(&p)))
            .collect()
    }

    /// All backscatter bands with their 1-based raster index
    pub fn backscatter_bands(&self) -> Vec<(usize, IntensityBand)> {
        self.indexed_bands().filter(|(_, band)| band.is_backscatter()).collect()
    }

    fn indexed_bands(&self) -> impl Iterator<Item = (usize, IntensityBand)> + '_ {
        self.polarizations.iter().enumerate().map(|(i, band)| (i + 1, *band))
    }
}
