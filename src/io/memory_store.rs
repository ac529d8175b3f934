use crate::io::block::Window;
use crate::io::store::{BlockRasterStore, RasterElement};
use crate::types::{RasterMeta, SarError, SarResult};
use ndarray::{s, Array2, ArrayView2};
use num_traits::NumCast;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MemoryRaster {
    meta: RasterMeta,
    bands: Vec<Array2<f64>>,
}

/// In-process raster store keyed by path.
///
/// Pixels are held as `f64` and cast on the way in and out, so a layer
/// written as `u8` can be read back as `f32` just like a GeoTIFF.
#[derive(Debug, Default)]
pub struct MemoryRasterStore {
    rasters: Mutex<HashMap<PathBuf, MemoryRaster>>,
}

impl MemoryRasterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SarResult<MutexGuard<'_, HashMap<PathBuf, MemoryRaster>>> {
        self.rasters
            .lock()
            .map_err(|_| SarError::Processing("memory raster store lock poisoned".to_string()))
    }

    /// Register a single-band raster
    pub fn insert<T: RasterElement>(
        &self,
        path: impl Into<PathBuf>,
        meta: RasterMeta,
        data: &Array2<T>,
    ) -> SarResult<()> {
        self.insert_bands(path, meta, std::slice::from_ref(data))
    }

    /// Register a multi-band raster; every band must match `meta`
    pub fn insert_bands<T: RasterElement>(
        &self,
        path: impl Into<PathBuf>,
        meta: RasterMeta,
        bands: &[Array2<T>],
    ) -> SarResult<()> {
        if bands.iter().any(|band| band.dim() != meta.shape()) {
            return Err(SarError::InvalidFormat(format!(
                "band shape does not match raster shape {:?}",
                meta.shape()
            )));
        }
        let bands = bands.iter().map(|band| band.mapv(to_f64)).collect();
        self.lock()?
            .insert(path.into(), MemoryRaster { meta, bands });
        Ok(())
    }
}

fn to_f64<T: RasterElement>(value: T) -> f64 {
    <f64 as NumCast>::from(value).unwrap_or(f64::NAN)
}

fn from_f64<T: RasterElement>(value: f64) -> T {
    <T as NumCast>::from(value).unwrap_or_default()
}

impl BlockRasterStore for MemoryRasterStore {
    fn exists(&self, path: &Path) -> bool {
        self.lock().map(|map| map.contains_key(path)).unwrap_or(false)
    }

    fn meta(&self, path: &Path) -> SarResult<RasterMeta> {
        self.lock()?
            .get(path)
            .map(|raster| raster.meta.clone())
            .ok_or_else(|| SarError::Processing(format!("raster not found: {}", path.display())))
    }

    fn band_count(&self, path: &Path) -> SarResult<usize> {
        self.lock()?
            .get(path)
            .map(|raster| raster.bands.len())
            .ok_or_else(|| SarError::Processing(format!("raster not found: {}", path.display())))
    }

    fn read_window<T: RasterElement>(
        &self,
        path: &Path,
        band: usize,
        window: &Window,
    ) -> SarResult<Array2<T>> {
        let rasters = self.lock()?;
        let raster = rasters
            .get(path)
            .ok_or_else(|| SarError::Processing(format!("raster not found: {}", path.display())))?;

        if !window.fits(raster.meta.rows, raster.meta.cols) {
            return Err(SarError::Processing(format!(
                "Window {:?} exceeds raster {}",
                window,
                path.display()
            )));
        }
        let data = band
            .checked_sub(1)
            .and_then(|index| raster.bands.get(index))
            .ok_or_else(|| {
                SarError::Processing(format!("band {} not present in {}", band, path.display()))
            })?;

        Ok(data
            .slice(s![
                window.y_off..window.y_off + window.height,
                window.x_off..window.x_off + window.width
            ])
            .mapv(from_f64))
    }

    fn write_window<T: RasterElement>(
        &self,
        path: &Path,
        data: ArrayView2<T>,
        offset: (usize, usize),
        meta: &RasterMeta,
        create: bool,
    ) -> SarResult<()> {
        let mut rasters = self.lock()?;
        if create {
            rasters.insert(
                path.to_path_buf(),
                MemoryRaster {
                    meta: meta.clone(),
                    bands: vec![Array2::zeros(meta.shape())],
                },
            );
        }
        let raster = rasters
            .get_mut(path)
            .ok_or_else(|| SarError::Processing(format!("raster not found: {}", path.display())))?;

        let (height, width) = data.dim();
        let (x_off, y_off) = offset;
        if x_off + width > raster.meta.cols || y_off + height > raster.meta.rows {
            return Err(SarError::Processing(format!(
                "write of {}x{} at ({}, {}) exceeds raster {}",
                width,
                height,
                x_off,
                y_off,
                path.display()
            )));
        }

        raster.bands[0]
            .slice_mut(s![y_off..y_off + height, x_off..x_off + width])
            .zip_mut_with(&data, |dst, &src| *dst = to_f64(src));
        Ok(())
    }
}
