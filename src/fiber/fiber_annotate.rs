use ab_glyph::{Font, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};

use super::fiber_cluster::ClusterEstimate;

const CLUSTER_COLORS: [Rgb<u8>; 2] = [Rgb([255, 0, 0]), Rgb([0, 0, 255])];
const CENTROID_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BISECTOR_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const ENDPOINT_RADIUS: i32 = 5;
const CENTROID_RADIUS: i32 = 8;
const BISECTOR_HALF_LENGTH: f64 = 200.0;
// cap height of the overlay text at a 1000 px wide image
const TEXT_HEIGHT: f32 = 30.0;

/// Draws the refined endpoints, centroids and perpendicular bisector of an
/// aggregate estimate over an RGB copy of the raster.
pub fn annotate(raster: &DynamicImage, estimate: &ClusterEstimate) -> RgbImage {
    let mut canvas = raster.to_rgb8();

    for (points, color) in estimate.refined.iter().zip(CLUSTER_COLORS) {
        for &(row, col) in points {
            draw_filled_circle_mut(&mut canvas, (col as i32, row as i32), ENDPOINT_RADIUS, color);
        }
    }

    for &(row, col) in &estimate.centroids {
        draw_filled_circle_mut(&mut canvas, (col as i32, row as i32), CENTROID_RADIUS, CENTROID_COLOR);
    }

    if let Some((start, end)) = bisector(estimate) {
        for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            draw_line_segment_mut(
                &mut canvas,
                (start.0 + dx, start.1 + dy),
                (end.0 + dx, end.1 + dy),
                BISECTOR_COLOR,
            );
        }
    }

    canvas
}

/// [`annotate`], plus the three length readouts in the top-left corner.
pub fn annotate_with_text(raster: &DynamicImage, estimate: &ClusterEstimate, font: &impl Font) -> RgbImage {
    let mut canvas = annotate(raster, estimate);
    let height = TEXT_HEIGHT * canvas.width() as f32 / 1000.0;
    let scale = PxScale::from(height.max(1.0));

    let lines = [
        format!("Machine Setting Fiber Length (MSFL) = {:.2} mm", estimate.msfl),
        format!("Image-Based Fiber Length (IFL) = {:.2} mm", estimate.ifl),
        format!("Mean Length (ML) = {:.2} mm", estimate.mean_length),
    ];

    for (line, baseline) in lines.iter().zip([50, 100, 150]) {
        let top = (baseline - height as i32).max(0);
        draw_text_mut(&mut canvas, TEXT_COLOR, 50, top, scale, font, line);
    }

    canvas
}

/// Segment endpoints, as (x, y), of the perpendicular bisector of the centroids.
fn bisector(estimate: &ClusterEstimate) -> Option<((f32, f32), (f32, f32))> {
    let [(r0, c0), (r1, c1)] = estimate.centroids;
    let (dr, dc) = (r1 - r0, c1 - c0);
    let length = (dr * dr + dc * dc).sqrt();
    if !length.is_finite() || length <= f64::EPSILON {
        return None;
    }

    let (mid_r, mid_c) = ((r0 + r1) / 2.0, (c0 + c1) / 2.0);
    // perpendicular unit vector in (row, col)
    let (pr, pc) = (dc / length, -dr / length);

    let start = (mid_c - pc * BISECTOR_HALF_LENGTH, mid_r - pr * BISECTOR_HALF_LENGTH);
    let end = (mid_c + pc * BISECTOR_HALF_LENGTH, mid_r + pr * BISECTOR_HALF_LENGTH);

    Some(((start.0 as f32, start.1 as f32), (end.0 as f32, end.1 as f32)))
}

#[cfg(test)]
mod tests {
    use image::GrayImage;

    use super::*;

    fn estimate() -> ClusterEstimate {
        ClusterEstimate {
            msfl: 61.0,
            ifl: 63.0,
            mean_length: 60.0,
            centroids: [(20.0, 20.0), (20.0, 80.0)],
            endpoints: vec![(20, 10), (20, 90)],
            labels: vec![0, 1],
            refined: [vec![(20, 10)], vec![(20, 90)]],
            half_lengths: [40.0, 40.0],
        }
    }

    #[test]
    fn markers_use_cluster_colors() {
        let raster = DynamicImage::ImageLuma8(GrayImage::new(100, 100));

        let canvas = annotate(&raster, &estimate());

        assert_eq!(canvas.dimensions(), (100, 100));
        assert_eq!(*canvas.get_pixel(20, 20), CENTROID_COLOR);
        assert_eq!(*canvas.get_pixel(80, 20), CENTROID_COLOR);
        assert_eq!(*canvas.get_pixel(10, 20), CLUSTER_COLORS[0]);
        assert_eq!(*canvas.get_pixel(90, 20), CLUSTER_COLORS[1]);
    }

    #[test]
    fn bisector_crosses_the_midpoint() {
        let raster = DynamicImage::ImageLuma8(GrayImage::new(100, 100));

        let canvas = annotate(&raster, &estimate());

        assert_eq!(*canvas.get_pixel(50, 60), BISECTOR_COLOR);
        assert_eq!(*canvas.get_pixel(51, 90), BISECTOR_COLOR);
        assert_eq!(*canvas.get_pixel(60, 60), Rgb([0, 0, 0]));
    }

    #[test]
    fn coincident_centroids_draw_no_bisector() {
        let mut degenerate = estimate();
        degenerate.centroids = [(20.0, 20.0), (20.0, 20.0)];

        assert_eq!(bisector(&degenerate), None);
    }
}
