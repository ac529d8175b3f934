use crate::io::block::block_param_generator;
use crate::io::store::{BlockRasterStore, WriteOptions};
use crate::types::{SarError, SarResult};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How binary layers are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    Or,
    And,
}

/// Combine binary layers block by block.
///
/// Pixel `p` of layer `i` is considered set when it equals `value_list[i]`.
/// The result is written as a byte raster on the grid of the first layer.
pub fn merge_binary_layers<S: BlockRasterStore>(
    store: &S,
    layer_list: &[PathBuf],
    value_list: &[u8],
    merged_path: &Path,
    lines_per_block: usize,
    mode: MergeMode,
    options: &WriteOptions,
) -> SarResult<()> {
    if layer_list.is_empty() {
        return Err(SarError::Processing("No layers to merge".to_string()));
    }
    if layer_list.len() != value_list.len() {
        return Err(SarError::Processing(format!(
            "{} layers but {} values to merge",
            layer_list.len(),
            value_list.len()
        )));
    }

    let meta = store.meta(&layer_list[0])?;
    for layer in &layer_list[1..] {
        let other = store.meta(layer)?;
        if other.shape() != meta.shape() {
            return Err(SarError::InvalidFormat(format!(
                "{} has shape {:?}, expected {:?}",
                layer.display(),
                other.shape(),
                meta.shape()
            )));
        }
    }

    log::info!(
        "Merging {} binary layers ({:?}) into {}",
        layer_list.len(),
        mode,
        merged_path.display()
    );

    for block in block_param_generator(lines_per_block, meta.shape(), 0)? {
        let mut merged = Array2::from_elem((block.block_length, block.data_width), mode == MergeMode::And);

        for (layer, &value) in layer_list.iter().zip(value_list) {
            let data: Array2<u8> = store.get_raster_block(layer, &block)?;
            Zip::from(&mut merged).and(&data).for_each(|m, &d| {
                let set = d == value;
                *m = match mode {
                    MergeMode::Or => *m || set,
                    MergeMode::And => *m && set,
                };
            });
        }

        let merged = merged.mapv(u8::from);
        store.write_raster_block(merged_path, &merged, &block, &meta, options)?;
    }

    Ok(())
}
