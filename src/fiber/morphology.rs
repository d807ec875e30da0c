//! Square-kernel morphology and component filtering over `ndarray` grids,
//! run through `imageproc` image views.
//!
//! Out-of-bounds neighbors are ignored, so borders neither grow nor shrink
//! objects artificially.

use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_close, grayscale_dilate, Mask};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::Array2;

use crate::linalg::Pixel;

/// 8-neighborhood offsets in ring order: E, NE, N, NW, W, SW, S, SE.
pub const RING: [(isize, isize); 8] = [
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
];

fn offset(p: Pixel, (dr, dc): (isize, isize), (rows, cols): (usize, usize)) -> Option<Pixel> {
    let r = p.0.checked_add_signed(dr)?;
    let c = p.1.checked_add_signed(dc)?;

    if r < rows && c < cols {
        Some((r, c))
    } else {
        None
    }
}

/// Foreground 8-neighbors of `p`, in ring order.
pub fn neighbors(mask: &Array2<bool>, p: Pixel) -> Vec<Pixel> {
    RING.iter()
        .filter_map(|&d| offset(p, d, mask.dim()))
        .filter(|&q| mask[q])
        .collect()
}

/// Foreground flags of the 8-neighborhood of `p` in ring order; outside counts as background.
pub fn ring(mask: &Array2<bool>, p: Pixel) -> [bool; 8] {
    let mut out = [false; 8];
    for (slot, &d) in out.iter_mut().zip(RING.iter()) {
        *slot = offset(p, d, mask.dim()).map_or(false, |q| mask[q]);
    }

    out
}

pub fn neighbor_count(mask: &Array2<bool>, p: Pixel) -> usize {
    ring(mask, p).iter().filter(|&&v| v).count()
}

/// Largest square kernel side an imageproc [`Mask`] can hold.
pub const MAX_KERNEL: usize = 511;

/// `kernel`x`kernel` structuring element anchored at its center; for an even
/// side the anchor sits right of and below the middle.
fn square_mask(kernel: usize) -> Mask {
    let side = kernel.clamp(1, MAX_KERNEL);
    let anchor = (side / 2) as u8;

    Mask::from_image(&GrayImage::from_pixel(side as u32, side as u32, Luma([255u8])), anchor, anchor)
}

pub fn to_gray_image(src: &Array2<u8>) -> GrayImage {
    let (rows, cols) = src.dim();

    GrayImage::from_fn(cols as u32, rows as u32, |x, y| Luma([src[[y as usize, x as usize]]]))
}

fn from_gray_image(image: &GrayImage) -> Array2<u8> {
    Array2::from_shape_fn((image.height() as usize, image.width() as usize), |(r, c)| {
        image.get_pixel(c as u32, r as u32)[0]
    })
}

fn mask_to_gray(mask: &Array2<bool>) -> GrayImage {
    to_gray_image(&mask.mapv(|v| if v { 255u8 } else { 0u8 }))
}

fn gray_to_mask(image: &GrayImage) -> Array2<bool> {
    from_gray_image(image).mapv(|v| v > 0)
}

/// Max filter over a `kernel`x`kernel` window.
pub fn dilate(src: &Array2<u8>, kernel: usize) -> Array2<u8> {
    from_gray_image(&grayscale_dilate(&to_gray_image(src), &square_mask(kernel)))
}

pub fn dilate_mask(mask: &Array2<bool>, kernel: usize) -> Array2<bool> {
    gray_to_mask(&grayscale_dilate(&mask_to_gray(mask), &square_mask(kernel)))
}

/// 3x3 closing: dilation followed by erosion.
pub fn close_mask(mask: &Array2<bool>) -> Array2<bool> {
    gray_to_mask(&grayscale_close(&mask_to_gray(mask), &Mask::square(1)))
}

/// Drops 8-connected components with fewer than `min_size` pixels.
pub fn remove_small_objects(mask: &Array2<bool>, min_size: usize) -> Array2<bool> {
    if min_size <= 1 {
        return mask.clone();
    }

    let labels = connected_components(&mask_to_gray(mask), Connectivity::Eight, Luma([0u8]));

    let mut sizes: Vec<usize> = Vec::new();
    for pixel in labels.pixels() {
        let label = pixel[0] as usize;
        if label >= sizes.len() {
            sizes.resize(label + 1, 0);
        }
        sizes[label] += 1;
    }

    Array2::from_shape_fn(mask.dim(), |(r, c)| {
        let label = labels.get_pixel(c as u32, r as u32)[0] as usize;
        label != 0 && sizes[label] >= min_size
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn two_by_two_dilation_spreads_down_right() {
        let src = array![[0u8, 0, 0], [0, 9, 0], [0, 0, 0]];
        let out = dilate(&src, 2);

        assert_eq!(out, array![[0u8, 0, 0], [0, 9, 9], [0, 9, 9]]);
    }

    #[test]
    fn closing_fills_single_pixel_gap() {
        let mut mask = Array2::from_elem((5, 9), false);
        for c in 1..8 {
            mask[[2, c]] = c != 4;
        }

        let closed = close_mask(&mask);

        assert!(closed[[2, 4]]);
        assert!(!closed[[0, 4]]);
        assert!(closed[[2, 1]]);
    }

    #[test]
    fn three_by_three_dilation_is_centered() {
        let src = array![[0u8, 0, 0, 0], [0, 9, 0, 0], [0, 0, 0, 0], [0, 0, 0, 4]];
        let out = dilate(&src, 3);

        assert_eq!(out, array![[9u8, 9, 9, 0], [9, 9, 9, 0], [9, 9, 9, 4], [0, 0, 4, 4]]);
    }

    #[test]
    fn mask_dilation_matches_gray_dilation() {
        let mask = array![[false, false, false], [false, true, false], [false, false, false]];
        let dilated = dilate_mask(&mask, 2);

        assert_eq!(dilated, dilate(&mask.mapv(u8::from), 2).mapv(|v| v > 0));
        assert!(dilated[[2, 2]]);
        assert!(!dilated[[0, 0]]);
    }

    #[test]
    fn oversized_kernel_is_clamped() {
        let src = Array2::from_elem((4, 4), 7u8);

        assert_eq!(dilate(&src, 4096), src);
    }

    #[test]
    fn small_components_are_removed() {
        let mut mask = Array2::from_elem((20, 20), false);
        for c in 0..15 {
            mask[[2, c]] = true;
        }
        mask[[10, 10]] = true;
        mask[[11, 11]] = true;

        let cleaned = remove_small_objects(&mask, 5);

        assert!(cleaned[[2, 0]]);
        assert!(cleaned[[2, 14]]);
        assert!(!cleaned[[10, 10]]);
        assert!(!cleaned[[11, 11]]);
    }

    #[test]
    fn diagonal_pixels_are_one_component() {
        let mask = array![[true, false, false], [false, true, false], [false, false, true]];

        assert_eq!(remove_small_objects(&mask, 3), mask);
    }

    #[test]
    fn ring_marks_outside_as_background() {
        let mask = array![[true, true], [true, false]];

        assert_eq!(ring(&mask, (0, 0)), [true, false, false, false, false, false, true, false]);
        assert_eq!(neighbor_count(&mask, (0, 0)), 2);
        assert_eq!(neighbors(&mask, (1, 1)), vec![(0, 1), (0, 0), (1, 0)]);
    }
}
