use std::collections::VecDeque;

use ndarray::Array2;

/// Binary structuring element stored as offsets from its centre.
#[derive(Clone, Debug)]
pub struct StructuringElement {
    offsets: Vec<(isize, isize)>,
}

impl StructuringElement {
    /// Full `size x size` square.
    pub fn square(size: usize) -> Self {
        let r = (size / 2) as isize;
        let offsets = (-r..=r)
            .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
            .collect();
        Self { offsets }
    }

    /// 3x3 cross (centre plus its four direct neighbours).
    pub fn cross() -> Self {
        Self {
            offsets: vec![(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)],
        }
    }

    /// `size x size` square with its four corner pixels removed.
    pub fn square_without_corners(size: usize) -> Self {
        let r = (size / 2) as isize;
        let offsets = (-r..=r)
            .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| !(dr.abs() == r && dc.abs() == r))
            .collect();
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Binary dilation: a pixel becomes true if any pixel under the element is
/// true. Out-of-bounds pixels count as false.
pub fn dilate(mask: &Array2<bool>, se: &StructuringElement) -> Array2<bool> {
    let (h, w) = mask.dim();
    let mut result = Array2::from_elem((h, w), false);

    for row in 0..h {
        for col in 0..w {
            result[[row, col]] = se.offsets.iter().any(|&(dr, dc)| {
                match neighbor(row, col, dr, dc, h, w) {
                    Some((nr, nc)) => mask[[nr, nc]],
                    None => false,
                }
            });
        }
    }

    result
}

/// Binary erosion: a pixel stays true only if all pixels under the element
/// are true. Out-of-bounds pixels take `border_value`.
pub fn erode(mask: &Array2<bool>, se: &StructuringElement, border_value: bool) -> Array2<bool> {
    let (h, w) = mask.dim();
    let mut result = Array2::from_elem((h, w), false);

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            result[[row, col]] = se.offsets.iter().all(|&(dr, dc)| {
                match neighbor(row, col, dr, dc, h, w) {
                    Some((nr, nc)) => mask[[nr, nc]],
                    None => border_value,
                }
            });
        }
    }

    result
}

/// Morphological opening: `iterations` erosions followed by as many dilations.
pub fn opening(mask: &Array2<bool>, se: &StructuringElement, iterations: usize) -> Array2<bool> {
    let mut result = mask.clone();
    for _ in 0..iterations {
        result = erode(&result, se, false);
    }
    for _ in 0..iterations {
        result = dilate(&result, se);
    }
    result
}

/// Fill background regions that are not 4-connected to the image border.
pub fn fill_holes(mask: &Array2<bool>) -> Array2<bool> {
    let (h, w) = mask.dim();
    if h == 0 || w == 0 {
        return mask.clone();
    }

    let mut outside = Array2::from_elem((h, w), false);
    let mut queue = VecDeque::new();

    let seed = |r: usize, c: usize, outside: &mut Array2<bool>, queue: &mut VecDeque<_>| {
        if !mask[[r, c]] && !outside[[r, c]] {
            outside[[r, c]] = true;
            queue.push_back((r, c));
        }
    };
    for col in 0..w {
        seed(0, col, &mut outside, &mut queue);
        seed(h - 1, col, &mut outside, &mut queue);
    }
    for row in 0..h {
        seed(row, 0, &mut outside, &mut queue);
        seed(row, w - 1, &mut outside, &mut queue);
    }

    while let Some((r, c)) = queue.pop_front() {
        for (dr, dc) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            if let Some((nr, nc)) = neighbor(r, c, dr, dc, h, w) {
                if !mask[[nr, nc]] && !outside[[nr, nc]] {
                    outside[[nr, nc]] = true;
                    queue.push_back((nr, nc));
                }
            }
        }
    }

    outside.mapv(|o| !o)
}

#[inline]
fn neighbor(
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    h: usize,
    w: usize,
) -> Option<(usize, usize)> {
    let nr = row as isize + dr;
    let nc = col as isize + dc;
    if nr < 0 || nr >= h as isize || nc < 0 || nc >= w as isize {
        None
    } else {
        Some((nr as usize, nc as usize))
    }
}
