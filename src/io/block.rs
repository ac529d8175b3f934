use crate::types::{SarError, SarResult};

/// Row window of a raster processed as one block.
///
/// `read_*` describes the rows pulled from disk (write window plus padding),
/// `write_*` the rows this block is responsible for in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockParam {
    pub read_start_line: usize,
    pub read_length: usize,
    pub write_start_line: usize,
    pub write_length: usize,
    /// Number of rows in the array handed to the caller (== read_length)
    pub block_length: usize,
    pub data_width: usize,
    /// Padding rows requested on each side (clipped at the raster edges)
    pub padding: usize,
}

impl BlockParam {
    /// Offset of the first written row inside the block array
    pub fn write_offset(&self) -> usize {
        self.write_start_line - self.read_start_line
    }

    pub fn is_first(&self) -> bool {
        self.write_start_line == 0
    }

    pub fn is_last(&self, rows: usize) -> bool {
        self.write_start_line + self.write_length >= rows
    }

    /// Whether block row `row` lies on a seam shared with another block.
    ///
    /// The true first and last rows of the image are not seams.
    pub fn is_artificial_edge(&self, row: usize, rows: usize) -> bool {
        (row == 0 && self.read_start_line > 0)
            || (row + 1 == self.block_length && self.read_start_line + self.block_length < rows)
    }

    pub fn window(&self) -> Window {
        Window {
            x_off: 0,
            y_off: self.read_start_line,
            width: self.data_width,
            height: self.read_length,
        }
    }
}

/// Split a `(rows, cols)` raster into consecutive row blocks
pub fn block_param_generator(
    lines_per_block: usize,
    shape: (usize, usize),
    pad: usize,
) -> SarResult<Vec<BlockParam>> {
    if lines_per_block == 0 {
        return Err(SarError::Processing(
            "lines_per_block must be positive".to_string(),
        ));
    }

    let (rows, cols) = shape;
    let mut blocks = Vec::with_capacity(rows.div_ceil(lines_per_block));

    for write_start_line in (0..rows).step_by(lines_per_block) {
        let write_length = lines_per_block.min(rows - write_start_line);
        let read_start_line = write_start_line.saturating_sub(pad);
        let read_end = (write_start_line + write_length + pad).min(rows);
        let read_length = read_end - read_start_line;

        blocks.push(BlockParam {
            read_start_line,
            read_length,
            write_start_line,
            write_length,
            block_length: read_length,
            data_width: cols,
            padding: pad,
        });
    }

    log::debug!(
        "Generated {} blocks of up to {} lines for {}x{} raster",
        blocks.len(),
        lines_per_block,
        rows,
        cols
    );

    Ok(blocks)
}

/// Inclusive pixel bounding box (x = column, y = row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x0: usize,
    pub x1: usize,
    pub y0: usize,
    pub y1: usize,
}

impl PixelBox {
    pub fn point(x: usize, y: usize) -> Self {
        Self { x0: x, x1: x, y0: y, y1: y }
    }

    pub fn include(&mut self, x: usize, y: usize) {
        self.x0 = self.x0.min(x);
        self.x1 = self.x1.max(x);
        self.y0 = self.y0.min(y);
        self.y1 = self.y1.max(y);
    }

    pub fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }

    pub fn shifted_rows(&self, offset: usize) -> Self {
        Self {
            y0: self.y0 + offset,
            y1: self.y1 + offset,
            ..*self
        }
    }
}

/// Rectangular raster window in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    /// Expand `bbox` by `margin` on every side, clipped to `(rows, cols)`
    pub fn around(bbox: &PixelBox, margin: usize, rows: usize, cols: usize) -> Self {
        let x0 = bbox.x0.saturating_sub(margin);
        let y0 = bbox.y0.saturating_sub(margin);
        let x1 = (bbox.x1 + margin + 1).min(cols);
        let y1 = (bbox.y1 + margin + 1).min(rows);
        Self {
            x_off: x0,
            y_off: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        self.x_off + self.width <= cols && self.y_off + self.height <= rows
    }
}
