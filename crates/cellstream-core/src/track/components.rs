use ndarray::{Array2, ArrayView2};

use crate::frame::MaskPixel;

/// Connected blobs of one mask frame.
#[derive(Clone, Debug)]
pub struct Components {
    /// Per-pixel blob label, `0` = background. Labels are `1..=count()`,
    /// numbered in raster order of each blob's first pixel.
    pub labels: Array2<u32>,
    /// Pixel count of blob `l` at index `l - 1`.
    pub areas: Vec<usize>,
}

impl Components {
    pub fn count(&self) -> usize {
        self.areas.len()
    }

    pub fn area(&self, label: u32) -> usize {
        label
            .checked_sub(1)
            .and_then(|i| self.areas.get(i as usize))
            .copied()
            .unwrap_or(0)
    }
}

/// Two-pass union-find labeling with 8-connectivity.
pub fn label_components<M: MaskPixel>(mask: ArrayView2<'_, M>) -> Components {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    if h == 0 || w == 0 {
        return Components {
            labels,
            areas: Vec::new(),
        };
    }

    let mut next_label: u32 = 1;
    // Index 0 unused; provisional labels start at 1.
    let mut parent: Vec<u32> = vec![0];

    // Pass 1: provisional labels from the already-visited neighbors
    // (up-left, up, up-right, left).
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]].is_cell() {
                continue;
            }

            let mut current = 0u32;
            let mut visit = |lbl: u32, parent: &mut Vec<u32>| {
                if lbl == 0 {
                    return;
                }
                if current == 0 {
                    current = lbl;
                } else if current != lbl {
                    union(parent, current, lbl);
                    current = current.min(lbl);
                }
            };

            if row > 0 {
                if col > 0 {
                    visit(labels[[row - 1, col - 1]], &mut parent);
                }
                visit(labels[[row - 1, col]], &mut parent);
                if col + 1 < w {
                    visit(labels[[row - 1, col + 1]], &mut parent);
                }
            }
            if col > 0 {
                visit(labels[[row, col - 1]], &mut parent);
            }

            if current == 0 {
                parent.push(next_label);
                current = next_label;
                next_label += 1;
            }
            labels[[row, col]] = current;
        }
    }

    // Pass 2: resolve roots and renumber consecutively in raster order.
    let mut final_label = vec![0u32; next_label as usize];
    let mut areas: Vec<usize> = Vec::new();
    for lbl in labels.iter_mut() {
        if *lbl == 0 {
            continue;
        }
        let root = find(&parent, *lbl) as usize;
        if final_label[root] == 0 {
            areas.push(0);
            final_label[root] = areas.len() as u32;
        }
        let resolved = final_label[root];
        areas[resolved as usize - 1] += 1;
        *lbl = resolved;
    }

    Components { labels, areas }
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
