use image::{DynamicImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::definitions::Image;
use imageproc::filter::separable_filter_equal;
use log::debug;
use ndarray::Array2;

use super::morphology::{dilate, dilate_mask, remove_small_objects, to_gray_image};
use super::{FiberConfig, FiberError};

/// Foreground mask, `true` where a fiber pixel is expected.
pub type BinaryMask = Array2<bool>;

pub struct FiberBinarizer {
    pub brightness_threshold: u8,
    pub normalize_polarity: bool,
    pub dilation_kernel: usize,
    pub block_size: usize,
    pub offset: i32,
    pub small_object_size: usize,
    pub mask_dilate_iterations: usize,
}

impl FiberBinarizer {
    pub fn for_segmentation(config: &FiberConfig) -> FiberBinarizer {
        FiberBinarizer {
            brightness_threshold: config.brightness_threshold,
            normalize_polarity: true,
            dilation_kernel: config.dilation_kernel,
            block_size: config.adaptive_block_size,
            offset: config.adaptive_offset,
            small_object_size: config.small_object_size,
            mask_dilate_iterations: config.mask_dilate_iterations,
        }
    }

    pub fn for_clustering(config: &FiberConfig) -> FiberBinarizer {
        FiberBinarizer {
            brightness_threshold: config.brightness_threshold,
            normalize_polarity: config.cluster.normalize_polarity,
            dilation_kernel: config.dilation_kernel,
            block_size: config.cluster.adaptive_block_size,
            offset: config.adaptive_offset,
            small_object_size: config.small_object_size,
            mask_dilate_iterations: config.cluster.mask_dilate_iterations,
        }
    }

    pub fn binarize(&self, raster: &DynamicImage) -> Result<BinaryMask, FiberError> {
        let mut gray = to_gray(raster)?;

        if self.normalize_polarity {
            let (normalized, inverted) = normalize_polarity(&gray, self.brightness_threshold);
            debug!("polarity normalization: inverted={}", inverted);
            gray = normalized;
        }

        let dilated = dilate(&gray, self.dilation_kernel);
        let thresholded = adaptive_threshold(&dilated, self.block_size, self.offset);
        let mut mask = remove_small_objects(&thresholded, self.small_object_size);

        for _ in 0..self.mask_dilate_iterations {
            mask = dilate_mask(&mask, self.dilation_kernel);
        }

        debug!(
            "binarized {}x{} raster: {} foreground pixels",
            mask.ncols(),
            mask.nrows(),
            mask.iter().filter(|&&v| v).count()
        );

        Ok(mask)
    }
}

/// Grayscale view of the raster as a (rows, cols) array.
pub fn to_gray(raster: &DynamicImage) -> Result<Array2<u8>, FiberError> {
    let gray = raster.to_luma8();
    let (width, height) = gray.dimensions();

    if width == 0 || height == 0 {
        return Err(FiberError::InvalidImage);
    }

    Array2::from_shape_vec((height as usize, width as usize), gray.into_raw())
        .map_err(|_| FiberError::InvalidImage)
}

/// Inverts the raster when its Otsu mask is mostly bright, so fibers always
/// end up brighter than the background. Returns the normalized raster and
/// whether it was inverted.
pub fn normalize_polarity(gray: &Array2<u8>, brightness_threshold: u8) -> (Array2<u8>, bool) {
    if gray.is_empty() {
        return (gray.clone(), false);
    }

    let level = otsu_level(&to_gray_image(gray));
    let bright = gray.iter().filter(|&&v| v > level).count();
    let otsu_mean = bright as f64 * 255.0 / gray.len() as f64;

    if otsu_mean >= brightness_threshold as f64 {
        (gray.mapv(|v| 255 - v), true)
    } else {
        (gray.clone(), false)
    }
}

fn gaussian_kernel(block_size: usize) -> Vec<f64> {
    let sigma = 0.3 * ((block_size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (block_size / 2) as f64;

    let weights: Vec<f64> = (0..block_size)
        .map(|i| {
            let x = i as f64 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    weights.into_iter().map(|w| w / sum).collect()
}

/// Gaussian-weighted adaptive threshold. A pixel is foreground when it exceeds
/// its local mean by more than `-offset`. Borders replicate the edge pixels.
pub fn adaptive_threshold(gray: &Array2<u8>, block_size: usize, offset: i32) -> BinaryMask {
    let (rows, cols) = gray.dim();
    if rows == 0 || cols == 0 {
        return Array2::from_elem((rows, cols), false);
    }

    let levels: Image<Luma<f64>> =
        ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| Luma([gray[[y as usize, x as usize]] as f64]));
    let local_mean = separable_filter_equal(&levels, &gaussian_kernel(block_size));

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mean = local_mean.get_pixel(c as u32, r as u32)[0].round().clamp(0.0, 255.0) as i32;

        gray[[r, c]] as i32 - mean > -offset
    })
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma, RgbImage, Rgb};

    use super::*;

    fn dark_fibers_on_white() -> GrayImage {
        GrayImage::from_fn(120, 80, |x, y| {
            if (38..41).contains(&y) && (10..110).contains(&x) {
                Luma([20u8])
            } else {
                Luma([235u8])
            }
        })
    }

    #[test]
    fn bright_background_is_inverted() {
        let gray = to_gray(&DynamicImage::ImageLuma8(dark_fibers_on_white())).unwrap();
        let (normalized, inverted) = normalize_polarity(&gray, 128);

        assert!(inverted);
        assert_eq!(normalized[[0, 0]], 20);
        assert_eq!(normalized[[39, 50]], 235);
    }

    #[test]
    fn dark_background_is_kept() {
        let gray = to_gray(&DynamicImage::ImageLuma8(dark_fibers_on_white())).unwrap().mapv(|v| 255 - v);
        let (normalized, inverted) = normalize_polarity(&gray, 128);

        assert!(!inverted);
        assert_eq!(normalized, gray);
    }

    #[test]
    fn mask_marks_fibers_not_background() {
        let config = FiberConfig::default();
        let raster = DynamicImage::ImageLuma8(dark_fibers_on_white());
        let mask = FiberBinarizer::for_segmentation(&config).binarize(&raster).unwrap();

        let foreground = mask.iter().filter(|&&v| v).count();
        assert!(mask[[39, 60]]);
        assert!(!mask[[5, 5]]);
        assert!(!mask[[70, 100]]);
        assert!(foreground < mask.len() / 5);
    }

    #[test]
    fn color_raster_matches_its_grayscale() {
        let rgb = RgbImage::from_fn(120, 80, |x, y| {
            if (38..41).contains(&y) && (10..110).contains(&x) {
                Rgb([20u8, 20, 20])
            } else {
                Rgb([235u8, 235, 235])
            }
        });
        let config = FiberConfig::default();
        let binarizer = FiberBinarizer::for_segmentation(&config);

        let from_rgb = binarizer.binarize(&DynamicImage::ImageRgb8(rgb)).unwrap();
        let from_gray = binarizer.binarize(&DynamicImage::ImageLuma8(dark_fibers_on_white())).unwrap();

        assert_eq!(from_rgb, from_gray);
    }

    #[test]
    fn empty_raster_is_invalid() {
        let config = FiberConfig::default();
        let result = FiberBinarizer::for_segmentation(&config).binarize(&DynamicImage::new_luma8(0, 0));

        assert_eq!(result, Err(FiberError::InvalidImage));
    }

    #[test]
    fn uniform_raster_has_no_foreground() {
        let gray = Array2::from_elem((30, 30), 90u8);
        let mask = adaptive_threshold(&gray, 11, -2);

        assert!(mask.iter().all(|&v| !v));
    }

    #[test]
    fn bright_ridge_passes_adaptive_threshold() {
        let gray = Array2::from_shape_fn((30, 30), |(_, c)| if c == 15 { 200u8 } else { 10u8 });
        let mask = adaptive_threshold(&gray, 11, -2);

        assert!(mask.column(15).iter().all(|&v| v));
        assert!(!mask[[10, 5]]);
        assert!(!mask[[10, 14]]);
    }

    #[test]
    fn edge_ridge_sees_replicated_border() {
        let gray = Array2::from_shape_fn((30, 30), |(_, c)| if c == 0 { 200u8 } else { 10u8 });
        let mask = adaptive_threshold(&gray, 11, -2);

        assert!(mask.column(0).iter().all(|&v| v));
        assert_eq!(mask.iter().filter(|&&v| v).count(), 30);
    }

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(11);

        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((kernel[0] - kernel[10]).abs() < 1e-15);
        assert!(kernel[5] > kernel[4]);
    }
}
