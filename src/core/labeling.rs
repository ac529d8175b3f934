//! Connected-component labeling of binary masks.
//!
//! Two-pass labeling with union-find over 8-connected neighbours. Final labels
//! are consecutive from 1 in raster order of each component's first pixel;
//! 0 is background.

use crate::io::block::PixelBox;
use ndarray::{Array2, ArrayView2};

/// Statistics of one labeled component (block coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedComponent {
    pub label: u32,
    pub pixel_count: usize,
    pub bbox: PixelBox,
}

#[derive(Debug, Clone)]
pub struct ComponentLabeling {
    pub labels: Array2<u32>,
    pub components: Vec<ConnectedComponent>,
}

impl ComponentLabeling {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn max_label(&self) -> u32 {
        self.components.len() as u32
    }
}

fn find_root(parents: &mut [u32], label: u32) -> u32 {
    let mut current = label as usize;
    while parents[current] as usize != current {
        parents[current] = parents[parents[current] as usize];
        current = parents[current] as usize;
    }
    current as u32
}

fn union_labels(parents: &mut [u32], a: u32, b: u32) {
    let root_a = find_root(parents, a);
    let root_b = find_root(parents, b);
    if root_a < root_b {
        parents[root_b as usize] = root_a;
    } else if root_b < root_a {
        parents[root_a as usize] = root_b;
    }
}

/// Label the 8-connected components of `mask`
pub fn label_components(mask: ArrayView2<bool>) -> ComponentLabeling {
    let (height, width) = mask.dim();
    let mut labels = Array2::<u32>::zeros((height, width));
    let mut parents: Vec<u32> = vec![0];

    // first pass: provisional labels from the already visited neighbours
    for row in 0..height {
        for col in 0..width {
            if !mask[[row, col]] {
                continue;
            }

            let mut neighbours = [0u32; 4];
            if col > 0 {
                neighbours[0] = labels[[row, col - 1]];
            }
            if row > 0 {
                if col > 0 {
                    neighbours[1] = labels[[row - 1, col - 1]];
                }
                neighbours[2] = labels[[row - 1, col]];
                if col + 1 < width {
                    neighbours[3] = labels[[row - 1, col + 1]];
                }
            }

            let smallest = neighbours.iter().copied().filter(|&l| l > 0).min();
            match smallest {
                None => {
                    let label = parents.len() as u32;
                    parents.push(label);
                    labels[[row, col]] = label;
                }
                Some(smallest) => {
                    labels[[row, col]] = smallest;
                    for &n in neighbours.iter().filter(|&&l| l > 0 && l != smallest) {
                        union_labels(&mut parents, smallest, n);
                    }
                }
            }
        }
    }

    // resolve equivalences to consecutive labels
    let mut relabel = vec![0u32; parents.len()];
    let mut next = 0u32;
    for provisional in 1..parents.len() as u32 {
        let root = find_root(&mut parents, provisional);
        if relabel[root as usize] == 0 {
            next += 1;
            relabel[root as usize] = next;
        }
        relabel[provisional as usize] = relabel[root as usize];
    }

    let mut components: Vec<Option<ConnectedComponent>> = vec![None; next as usize];
    for ((row, col), label) in labels.indexed_iter_mut() {
        if *label == 0 {
            continue;
        }
        *label = relabel[*label as usize];
        let component = components[*label as usize - 1].get_or_insert(ConnectedComponent {
            label: *label,
            pixel_count: 0,
            bbox: PixelBox::point(col, row),
        });
        component.pixel_count += 1;
        component.bbox.include(col, row);
    }

    ComponentLabeling {
        labels,
        components: components.into_iter().flatten().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn mask(pattern: &[&str]) -> Array2<bool> {
        let rows = pattern.len();
        let cols = pattern[0].len();
        Array2::from_shape_fn((rows, cols), |(r, c)| pattern[r].as_bytes()[c] == b'#')
    }

    #[test]
    fn test_empty_mask() {
        let labeling = label_components(Array2::from_elem((4, 4), false).view());
        assert!(labeling.is_empty());
        assert_eq!(labeling.max_label(), 0);
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let m = mask(&["#..", ".#.", "..#"]);
        let labeling = label_components(m.view());
        assert_eq!(labeling.len(), 1);
        assert_eq!(labeling.components[0].pixel_count, 3);
        assert_eq!(labeling.components[0].bbox, PixelBox { x0: 0, x1: 2, y0: 0, y1: 2 });
    }

    #[test]
    fn test_u_shape_merges() {
        let m = mask(&["#.#", "#.#", "###", "...", "##."]);
        let labeling = label_components(m.view());
        assert_eq!(labeling.len(), 2);
        assert_eq!(labeling.components[0].pixel_count, 7);
        assert_eq!(labeling.components[1].pixel_count, 2);
        assert_eq!(labeling.labels.row(4), array![2u32, 2, 0]);
    }

    #[test]
    fn test_labels_follow_raster_order() {
        let m = mask(&["..#", "...", "#.."]);
        let labeling = label_components(m.view());
        assert_eq!(labeling.labels[[0, 2]], 1);
        assert_eq!(labeling.labels[[2, 0]], 2);
    }

    #[test]
    fn test_anti_diagonal_equivalence() {
        // two provisional labels joined through the upper-right neighbour
        let m = mask(&["#.#", ".#.", "#.."]);
        let labeling = label_components(m.view());
        assert_eq!(labeling.len(), 1);
        assert_eq!(labeling.components[0].pixel_count, 4);
    }
}
