use crate::io::block::Window;
use crate::io::store::{BlockRasterStore, RasterElement, WriteOptions};
use crate::types::{GeoTransform, RasterMeta, SarError, SarResult};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use ndarray::{Array2, ArrayView2};
use std::path::Path;

/// GeoTIFF-backed raster store.
///
/// Every call opens its own dataset handle, so concurrent window reads from
/// worker threads never share GDAL state.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalRasterStore;

impl GdalRasterStore {
    pub fn new() -> Self {
        Self
    }

    fn open_for_update(path: &Path) -> SarResult<Dataset> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        };
        Ok(Dataset::open_ex(path, options)?)
    }

    fn create<T: RasterElement>(path: &Path, meta: &RasterMeta) -> SarResult<Dataset> {
        log::debug!(
            "Creating {}x{} GeoTIFF: {}",
            meta.cols,
            meta.rows,
            path.display()
        );

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let creation_options = [
            RasterCreationOption { key: "TILED", value: "YES" },
            RasterCreationOption { key: "COMPRESS", value: "DEFLATE" },
            RasterCreationOption { key: "BIGTIFF", value: "IF_SAFER" },
        ];
        let mut dataset = driver.create_with_band_type_with_options::<T, _>(
            path,
            meta.cols as isize,
            meta.rows as isize,
            1,
            &creation_options,
        )?;

        dataset.set_geo_transform(&meta.geo_transform.to_gdal())?;
        if !meta.projection.is_empty() {
            dataset.set_projection(&meta.projection)?;
        }
        Ok(dataset)
    }
}

impl BlockRasterStore for GdalRasterStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn meta(&self, path: &Path) -> SarResult<RasterMeta> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let geo_transform = dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_default();

        Ok(RasterMeta {
            rows: height,
            cols: width,
            geo_transform,
            projection: dataset.projection(),
        })
    }

    fn band_count(&self, path: &Path) -> SarResult<usize> {
        let dataset = Dataset::open(path)?;
        Ok(dataset.raster_count().max(0) as usize)
    }

    fn read_window<T: RasterElement>(
        &self,
        path: &Path,
        band: usize,
        window: &Window,
    ) -> SarResult<Array2<T>> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        if !window.fits(height, width) {
            return Err(SarError::Processing(format!(
                "Window {:?} exceeds {}x{} raster {}",
                window,
                width,
                height,
                path.display()
            )));
        }

        let rasterband = dataset.rasterband(band as isize)?;
        let array = rasterband.read_as_array::<T>(
            (window.x_off as isize, window.y_off as isize),
            (window.width, window.height),
            (window.width, window.height),
            None,
        )?;
        Ok(array)
    }

    fn write_window<T: RasterElement>(
        &self,
        path: &Path,
        data: ArrayView2<T>,
        offset: (usize, usize),
        meta: &RasterMeta,
        create: bool,
    ) -> SarResult<()> {
        let dataset = if create {
            Self::create::<T>(path, meta)?
        } else {
            Self::open_for_update(path)?
        };

        let (height, width) = data.dim();
        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<T> = data.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((offset.0 as isize, offset.1 as isize), (width, height), &buffer)?;
        Ok(())
    }

    fn finalize(&self, path: &Path, options: &WriteOptions) -> SarResult<()> {
        if !options.cog {
            return Ok(());
        }

        let scratch_dir = match &options.scratch_dir {
            Some(dir) => dir.clone(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| ".".into()),
        };

        let staged = tempfile::Builder::new()
            .prefix("cog_")
            .suffix(".tif")
            .tempfile_in(&scratch_dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| SarError::Io(e.error))?;

        {
            let source = Dataset::open(path)?;
            let driver = DriverManager::get_driver_by_name("COG")?;
            let cog_options = [
                RasterCreationOption { key: "COMPRESS", value: "DEFLATE" },
                RasterCreationOption { key: "BIGTIFF", value: "IF_SAFER" },
            ];
            source.create_copy(&driver, &staged, &cog_options)?;
        }

        std::fs::rename(&staged, path)?;
        log::debug!("Converted {} to COG", path.display());
        Ok(())
    }
}
