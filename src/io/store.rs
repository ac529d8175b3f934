//! Block-oriented raster storage contract
//!
//! Every stage of the refinement talks to rasters through [`BlockRasterStore`]:
//! the driver reads and writes whole row blocks, workers read small windows.
//! Implementations must tolerate concurrent window reads from many threads;
//! writes only ever come from the driver thread.

use crate::io::block::{BlockParam, Window};
use crate::types::{RasterMeta, SarError, SarResult};
use gdal::raster::GdalType;
use ndarray::{s, Array2, ArrayView2};
use num_traits::NumCast;
use std::path::{Path, PathBuf};

/// Pixel types the store can read and write
pub trait RasterElement: GdalType + NumCast + Copy + Default + Send + Sync + 'static {}

impl RasterElement for u8 {}
impl RasterElement for i32 {}
impl RasterElement for u32 {}
impl RasterElement for f32 {}
impl RasterElement for f64 {}

/// How output rasters are written
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Rewrite finished rasters as Cloud Optimized GeoTIFF
    pub cog: bool,
    /// Directory for temporary files created while finalizing
    pub scratch_dir: Option<PathBuf>,
}

impl WriteOptions {
    pub fn new(cog: bool, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            cog,
            scratch_dir: Some(scratch_dir.into()),
        }
    }
}

pub trait BlockRasterStore: Sync {
    fn exists(&self, path: &Path) -> bool;

    fn meta(&self, path: &Path) -> SarResult<RasterMeta>;

    fn band_count(&self, path: &Path) -> SarResult<usize>;

    /// Read `window` of 1-based `band`
    fn read_window<T: RasterElement>(
        &self,
        path: &Path,
        band: usize,
        window: &Window,
    ) -> SarResult<Array2<T>>;

    /// Write `data` at `(x_off, y_off)` of band 1.
    ///
    /// With `create` set the raster is (re)created with the grid of `meta`,
    /// otherwise it must already exist.
    fn write_window<T: RasterElement>(
        &self,
        path: &Path,
        data: ArrayView2<T>,
        offset: (usize, usize),
        meta: &RasterMeta,
        create: bool,
    ) -> SarResult<()>;

    /// Called once a raster has been completely written
    fn finalize(&self, _path: &Path, _options: &WriteOptions) -> SarResult<()> {
        Ok(())
    }

    fn get_raster_block<T: RasterElement>(
        &self,
        path: &Path,
        block: &BlockParam,
    ) -> SarResult<Array2<T>> {
        self.get_band_block(path, 1, block)
    }

    fn get_band_block<T: RasterElement>(
        &self,
        path: &Path,
        band: usize,
        block: &BlockParam,
    ) -> SarResult<Array2<T>> {
        self.read_window(path, band, &block.window())
    }

    /// Write the rows of `data` owned by `block`.
    ///
    /// The first block creates the raster; the last one finalizes it.
    fn write_raster_block<T: RasterElement>(
        &self,
        path: &Path,
        data: &Array2<T>,
        block: &BlockParam,
        meta: &RasterMeta,
        options: &WriteOptions,
    ) -> SarResult<()> {
        if data.dim() != (block.block_length, block.data_width) {
            return Err(SarError::Processing(format!(
                "Block array {:?} does not match block shape ({}, {})",
                data.dim(),
                block.block_length,
                block.data_width
            )));
        }

        let offset = block.write_offset();
        let rows = data.slice(s![offset..offset + block.write_length, ..]);
        self.write_window(path, rows, (0, block.write_start_line), meta, block.is_first())?;

        if block.is_last(meta.rows) {
            self.finalize(path, options)?;
        }
        Ok(())
    }

    fn read_raster<T: RasterElement>(&self, path: &Path) -> SarResult<Array2<T>> {
        let meta = self.meta(path)?;
        let window = Window {
            x_off: 0,
            y_off: 0,
            width: meta.cols,
            height: meta.rows,
        };
        self.read_window(path, 1, &window)
    }
}
