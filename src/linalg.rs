use ndarray::ArrayView1;

/// Pixel coordinate as (row, col).
pub type Pixel = (usize, usize);

pub fn norm(array: &ArrayView1<f64>) -> f64 {
    (array[0] * array[0] + array[1] * array[1]).sqrt()
}

pub fn euclidean(a: Pixel, b: Pixel) -> f64 {
    let dr = a.0 as f64 - b.0 as f64;
    let dc = a.1 as f64 - b.1 as f64;

    (dr * dr + dc * dc).sqrt()
}

/// Sum of distances between consecutive points.
pub fn path_length(points: &[Pixel]) -> f64 {
    points
        .windows(2)
        .map(|pair| euclidean(pair[0], pair[1]))
        .sum()
}

/// Vector pointing from `inner` to `terminal`, as (d_row, d_col).
pub fn direction(terminal: Pixel, inner: Pixel) -> (f64, f64) {
    (
        terminal.0 as f64 - inner.0 as f64,
        terminal.1 as f64 - inner.1 as f64,
    )
}

/// Deviation in degrees, in [0, 180], of two outward endpoint directions from
/// being exactly opposed. Zero means the two fragments continue each other in a
/// straight line.
pub fn angle_deviation(first: (f64, f64), second: (f64, f64)) -> f64 {
    let rad = second.0.atan2(second.1) - first.0.atan2(first.1);

    (rad.to_degrees().rem_euclid(360.0) - 180.0).abs()
}

pub fn chebyshev(a: Pixel, b: Pixel) -> usize {
    a.0.abs_diff(b.0).max(a.1.abs_diff(b.1))
}
