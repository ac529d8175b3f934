use ndarray::{Array2, ArrayView2, Zip};

const CROSS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Binary dilation with a 3x3 cross, repeated `iterations` times.
///
/// Only pixels where `allowed` is true may be added; pixels of `seed` are
/// always kept.
pub fn constrained_dilation(
    seed: ArrayView2<bool>,
    iterations: usize,
    allowed: ArrayView2<bool>,
) -> Array2<bool> {
    let (height, width) = seed.dim();
    let mut result = seed.to_owned();
    let mut frontier: Vec<(usize, usize)> = result
        .indexed_iter()
        .filter(|(_, set)| **set)
        .map(|(index, _)| index)
        .collect();

    for _ in 0..iterations {
        let mut next = Vec::new();
        for &(row, col) in &frontier {
            for (dr, dc) in CROSS {
                let (Some(r), Some(c)) = (row.checked_add_signed(dr), col.checked_add_signed(dc)) else {
                    continue;
                };
                if r >= height || c >= width || result[[r, c]] || !allowed[[r, c]] {
                    continue;
                }
                result[[r, c]] = true;
                next.push((r, c));
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    result
}

/// Pixels of `dilated` that are not part of `seed`
pub fn ring(seed: ArrayView2<bool>, dilated: ArrayView2<bool>) -> Array2<bool> {
    Zip::from(&seed).and(&dilated).map_collect(|&s, &d| d && !s)
}
