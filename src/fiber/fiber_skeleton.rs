use log::debug;

use super::fiber_binarizer::BinaryMask;
use super::morphology::{close_mask, neighbor_count, neighbors, remove_small_objects, ring};
use super::FiberConfig;
use crate::linalg::Pixel;

/// 1-pixel-wide, topology-preserving reduction of a [`BinaryMask`].
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pixels: BinaryMask,
}

impl Skeleton {
    /// Wraps a mask that is already one pixel wide.
    pub fn from_thin_mask(pixels: BinaryMask) -> Skeleton {
        Skeleton { pixels }
    }

    pub fn mask(&self) -> &BinaryMask {
        &self.pixels
    }

    pub fn dim(&self) -> (usize, usize) {
        self.pixels.dim()
    }

    pub fn contains(&self, p: Pixel) -> bool {
        p.0 < self.pixels.nrows() && p.1 < self.pixels.ncols() && self.pixels[p]
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.pixels.iter().any(|&v| v)
    }

    pub fn degree(&self, p: Pixel) -> usize {
        neighbor_count(&self.pixels, p)
    }

    pub fn neighbors(&self, p: Pixel) -> Vec<Pixel> {
        neighbors(&self.pixels, p)
    }
}

pub struct FiberSkeletonizer {
    pub small_object_size: usize,
    pub spur_length: usize,
    pub closing_passes: usize,
}

impl FiberSkeletonizer {
    pub fn new(config: &FiberConfig) -> FiberSkeletonizer {
        FiberSkeletonizer {
            small_object_size: config.small_object_size,
            spur_length: config.spur_length,
            closing_passes: config.closing_passes,
        }
    }

    pub fn skeletonize(&self, mask: &BinaryMask) -> Skeleton {
        let mut pixels = thin(mask);

        if self.spur_length > 0 {
            // pruning can expose a non-thin junction knot, so thin once more
            pixels = thin(&prune_spurs(&pixels, self.spur_length));
        }
        pixels = remove_small_objects(&pixels, self.small_object_size);

        if self.closing_passes > 0 {
            for _ in 0..self.closing_passes {
                pixels = close_mask(&pixels);
            }
            pixels = remove_small_objects(&pixels, self.small_object_size);
        }

        debug!(
            "skeleton: {} of {} mask pixels kept",
            pixels.iter().filter(|&&v| v).count(),
            mask.iter().filter(|&&v| v).count()
        );

        Skeleton { pixels }
    }
}

// N, S, E, W border directions as indices into RING.
const BORDER_DIRECTIONS: [usize; 4] = [2, 6, 0, 4];

/// 8-connectivity number of the neighborhood (Yokoi). A border pixel whose
/// number is 1 can be removed without changing topology.
fn connectivity_number(x: &[bool; 8]) -> usize {
    let bg = |k: usize| !x[k % 8];

    [0usize, 2, 4, 6]
        .iter()
        .filter(|&&k| bg(k) && !(bg(k + 1) && bg(k + 2)))
        .count()
}

fn is_deletable(pixels: &BinaryMask, p: Pixel) -> bool {
    let x = ring(pixels, p);
    let count = x.iter().filter(|&&v| v).count();

    // a single neighbor marks a line tip
    count >= 2 && connectivity_number(&x) == 1
}

/// Directional sequential thinning. Candidates are collected per sub-pass
/// and re-checked right before removal, so topology is preserved even though
/// removals are applied immediately.
pub fn thin(mask: &BinaryMask) -> BinaryMask {
    let mut pixels = mask.clone();
    let (rows, cols) = pixels.dim();

    loop {
        let mut removed = 0usize;

        for &direction in BORDER_DIRECTIONS.iter() {
            let mut candidates = Vec::new();
            for r in 0..rows {
                for c in 0..cols {
                    if pixels[[r, c]] && !ring(&pixels, (r, c))[direction] && is_deletable(&pixels, (r, c)) {
                        candidates.push((r, c));
                    }
                }
            }

            for p in candidates {
                if is_deletable(&pixels, p) {
                    pixels[p] = false;
                    removed += 1;
                }
            }
        }

        if removed == 0 {
            break;
        }
    }

    pixels
}

/// Removes branches that run from an endpoint to a junction in at most
/// `max_length` pixels (the junction itself stays).
pub fn prune_spurs(pixels: &BinaryMask, max_length: usize) -> BinaryMask {
    let (rows, cols) = pixels.dim();
    let mut spurs: Vec<Pixel> = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            if !pixels[[r, c]] || neighbor_count(pixels, (r, c)) != 1 {
                continue;
            }

            let mut chain = vec![(r, c)];
            let mut previous: Option<Pixel> = None;
            let mut current = (r, c);

            while chain.len() <= max_length {
                let next: Vec<Pixel> = neighbors(pixels, current)
                    .into_iter()
                    .filter(|&q| Some(q) != previous && !chain.contains(&q))
                    .collect();
                if next.len() != 1 {
                    break;
                }

                let degree = neighbor_count(pixels, next[0]);
                if degree >= 3 {
                    spurs.extend(chain.iter().copied());
                    break;
                }
                if degree != 2 {
                    break;
                }

                previous = Some(current);
                current = next[0];
                chain.push(current);
            }
        }
    }

    let mut pruned = pixels.clone();
    for p in spurs {
        pruned[p] = false;
    }

    pruned
}
