//! Raster I/O: block iteration, windowed access and layer merging

pub mod block;
pub mod store;
pub mod gdal_store;
pub mod memory_store;
pub mod merge;

pub use block::{block_param_generator, BlockParam, PixelBox, Window};
pub use store::{BlockRasterStore, RasterElement, WriteOptions};
pub use gdal_store::GdalRasterStore;
pub use memory_store::MemoryRasterStore;
pub use merge::{merge_binary_layers, MergeMode};
