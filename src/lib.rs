//! sarwater: bimodality-based refinement of SAR water masks
//!
//! Takes a preliminary binary water classification and tests every connected
//! water (or gap) component against the backscatter around it. Components
//! whose intensity does not separate from the surroundings are reclassified.
//! Rasters are processed in row blocks with a second full-image pass for
//! components that cross block seams.

pub mod types;
pub mod config;
pub mod context;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    GeoTransform, IntensityBand, Polarization, RasterMeta, SarError, SarResult,
};
pub use config::{AncillaryInputs, LandcoverLabels, RefinementConfig};
pub use context::RunContext;
pub use io::{BlockRasterStore, GdalRasterStore, MemoryRasterStore, WriteOptions};
pub use crate::core::{RefinementPipeline, RefinementSummary};
