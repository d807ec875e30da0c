use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_stats::QuantileExt;
use serde::Serialize;

use super::fiber_skeleton::Skeleton;
use super::skeleton_graph::trace_paths;
use super::{FiberConfig, FiberError};
use crate::linalg::{norm, Pixel};

/// Aggregate length estimate for a whole fiber beard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterEstimate {
    /// Machine setting fiber length.
    pub msfl: f64,
    /// Image-based fiber length.
    pub ifl: f64,
    /// Calibrated distance between the two endpoint centroids.
    pub mean_length: f64,
    /// (row, col) centroids of cluster 0 and cluster 1.
    pub centroids: [(f64, f64); 2],
    pub endpoints: Vec<Pixel>,
    /// Cluster of each endpoint, parallel to `endpoints`.
    pub labels: Vec<usize>,
    /// Farthest endpoints of each cluster from the bisector.
    pub refined: [Vec<Pixel>; 2],
    /// Uncalibrated distance from the bisector for each cluster.
    pub half_lengths: [f64; 2],
}

struct KMeans {
    labels: Vec<usize>,
    centroids: [Array1<f64>; 2],
    iterations: usize,
}

fn distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    norm(&(a - b).view())
}

fn farthest_from(points: &Array2<f64>, origin: &ArrayView1<f64>) -> Result<usize, FiberError> {
    points
        .map_axis(Axis(1), |row| distance(&row, origin))
        .argmax()
        .map_err(|_| FiberError::InsufficientEndpoints(points.nrows()))
}

/// Two-cluster Lloyd iteration with farthest-point initialization, so the
/// result is reproducible for a given input.
fn kmeans2(points: &Array2<f64>, max_iterations: usize) -> Result<KMeans, FiberError> {
    let mean = points
        .mean_axis(Axis(0))
        .ok_or(FiberError::InsufficientEndpoints(points.nrows()))?;

    let first = farthest_from(points, &mean.view())?;
    let second = farthest_from(points, &points.row(first))?;
    let mut centroids = [points.row(first).to_owned(), points.row(second).to_owned()];

    let mut labels: Vec<usize> = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        let assigned: Vec<usize> = points
            .outer_iter()
            .map(|p| {
                let d0 = distance(&p, &centroids[0].view());
                let d1 = distance(&p, &centroids[1].view());
                if d1 < d0 { 1 } else { 0 }
            })
            .collect();
        iterations += 1;

        if assigned == labels {
            converged = true;
            break;
        }
        labels = assigned;

        for (k, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == k).collect();
            if let Some(center) = points.select(Axis(0), &members).mean_axis(Axis(0)) {
                *centroid = center;
            }
        }
    }

    if !converged {
        warn!("k-means stopped after {} iterations without stable labels", max_iterations);
    }

    Ok(KMeans {
        labels,
        centroids,
        iterations,
    })
}

pub struct ClusterLengthEstimator {
    pub max_junction: f64,
    pub min_path_length: f64,
    pub top_fraction: f64,
    pub ifl_offset: f64,
    pub max_iterations: usize,
}

impl ClusterLengthEstimator {
    pub fn new(config: &FiberConfig) -> ClusterLengthEstimator {
        ClusterLengthEstimator {
            max_junction: config.cluster.max_junction,
            min_path_length: config.cluster.min_path_length,
            top_fraction: config.cluster.top_fraction,
            ifl_offset: config.cluster.ifl_offset,
            max_iterations: config.cluster.max_iterations,
        }
    }

    /// Heads then tails of the qualifying paths that are true skeleton ends.
    pub fn candidate_endpoints(&self, skeleton: &Skeleton) -> Vec<Pixel> {
        let paths: Vec<_> = trace_paths(skeleton)
            .into_iter()
            .filter(|path| path.length > self.max_junction && path.length > self.min_path_length)
            .collect();

        paths
            .iter()
            .map(|path| path.head())
            .chain(paths.iter().map(|path| path.tail()))
            .filter(|&p| skeleton.degree(p) == 1)
            .collect()
    }

    pub fn estimate(&self, skeleton: &Skeleton, calibration_factor: f64) -> Result<ClusterEstimate, FiberError> {
        self.estimate_endpoints(self.candidate_endpoints(skeleton), calibration_factor)
    }

    pub fn estimate_endpoints(&self, endpoints: Vec<Pixel>, calibration_factor: f64) -> Result<ClusterEstimate, FiberError> {
        if endpoints.len() < 2 {
            return Err(FiberError::InsufficientEndpoints(endpoints.len()));
        }

        let points = Array2::from_shape_fn((endpoints.len(), 2), |(i, axis)| {
            if axis == 0 { endpoints[i].0 as f64 } else { endpoints[i].1 as f64 }
        });
        let KMeans { labels, centroids, iterations } = kmeans2(&points, self.max_iterations)?;

        let span = &centroids[1] - &centroids[0];
        let separation = norm(&span.view());
        if !separation.is_finite() || separation <= f64::EPSILON {
            return Err(FiberError::DegenerateCentroids);
        }

        let unit = &span / separation;
        let mid = (&centroids[0] + &centroids[1]) / 2.0;
        let from_bisector: Vec<f64> = points
            .outer_iter()
            .map(|p| (&p - &mid).dot(&unit).abs())
            .collect();

        let mut refined: [Vec<Pixel>; 2] = [Vec::new(), Vec::new()];
        let mut half_lengths = [0.0; 2];
        for k in 0..2 {
            let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == k).collect();
            members.sort_by(|&a, &b| from_bisector[b].total_cmp(&from_bisector[a]));

            let keep = ((self.top_fraction * members.len() as f64).floor() as usize).max(1);
            members.truncate(keep);

            half_lengths[k] = members
                .iter()
                .map(|&i| from_bisector[i])
                .fold(f64::INFINITY, f64::min);
            if !half_lengths[k].is_finite() {
                return Err(FiberError::DegenerateCentroids);
            }
            refined[k] = members.iter().map(|&i| endpoints[i]).collect();
        }

        let msfl = (half_lengths[0] + half_lengths[1]) * calibration_factor;
        let estimate = ClusterEstimate {
            msfl,
            ifl: msfl + self.ifl_offset,
            mean_length: separation * calibration_factor,
            centroids: [
                (centroids[0][0], centroids[0][1]),
                (centroids[1][0], centroids[1][1]),
            ],
            endpoints,
            labels,
            refined,
            half_lengths,
        };

        debug!(
            "endpoint clustering: {} endpoints, {} iterations, msfl {:.3}, mean {:.3}",
            estimate.endpoints.len(),
            iterations,
            estimate.msfl,
            estimate.mean_length
        );

        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ClusterLengthEstimator {
        ClusterLengthEstimator::new(&FiberConfig::default())
    }

    #[test]
    fn vertical_separation_is_handled() {
        let endpoints = vec![(0, 10), (1, 10), (100, 10), (101, 10)];

        let estimate = estimator().estimate_endpoints(endpoints, 1.0).unwrap();

        assert_eq!(estimate.labels, vec![0, 0, 1, 1]);
        assert_eq!(estimate.centroids, [(0.5, 10.0), (100.5, 10.0)]);
        assert_eq!(estimate.mean_length, 100.0);
        assert_eq!(estimate.msfl, 101.0);
        assert_eq!(estimate.ifl, 103.0);
        assert_eq!(estimate.refined, [vec![(0, 10)], vec![(101, 10)]]);
    }

    #[test]
    fn calibration_scales_lengths() {
        let endpoints = vec![(10, 0), (10, 1), (10, 100), (10, 101)];

        let estimate = estimator().estimate_endpoints(endpoints, 0.5).unwrap();

        assert_eq!(estimate.mean_length, 50.0);
        assert_eq!(estimate.msfl, 50.5);
        assert_eq!(estimate.half_lengths, [50.5, 50.5]);
    }

    #[test]
    fn msfl_does_not_exceed_extreme_span() {
        let endpoints = vec![(3, 0), (9, 2), (14, 5), (2, 198), (11, 201), (15, 195)];

        let estimate = estimator().estimate_endpoints(endpoints.clone(), 1.0).unwrap();

        let max_span = endpoints
            .iter()
            .flat_map(|&a| endpoints.iter().map(move |&b| crate::linalg::euclidean(a, b)))
            .fold(0.0, f64::max);
        assert!(estimate.msfl > 0.0);
        assert!(estimate.msfl <= max_span);
        assert!(estimate.labels[..3].iter().all(|&l| l == estimate.labels[0]));
        assert!(estimate.labels[3..].iter().all(|&l| l != estimate.labels[0]));
    }

    #[test]
    fn single_endpoint_is_insufficient() {
        assert_eq!(
            estimator().estimate_endpoints(vec![(4, 4)], 1.0),
            Err(FiberError::InsufficientEndpoints(1))
        );
    }

    #[test]
    fn coincident_endpoints_are_degenerate() {
        assert_eq!(
            estimator().estimate_endpoints(vec![(5, 5), (5, 5)], 1.0),
            Err(FiberError::DegenerateCentroids)
        );
    }

    #[test]
    fn loop_skeleton_has_no_endpoints() {
        let mask = Array2::from_shape_fn((40, 40), |(r, c)| {
            ((r == 5 || r == 30) && (5..=30).contains(&c)) || ((c == 5 || c == 30) && (5..=30).contains(&r))
        });
        let skeleton = Skeleton::from_thin_mask(mask);

        assert!(estimator().candidate_endpoints(&skeleton).is_empty());
        assert_eq!(estimator().estimate(&skeleton, 1.0), Err(FiberError::InsufficientEndpoints(0)));
    }

    #[test]
    fn endpoints_come_from_long_paths_only() {
        let mask = Array2::from_shape_fn((40, 80), |(r, c)| (r == 10 && (5..70).contains(&c)) || (r == 30 && (5..12).contains(&c)));
        let skeleton = Skeleton::from_thin_mask(mask);

        assert_eq!(estimator().candidate_endpoints(&skeleton), vec![(10, 5), (10, 69)]);
    }
}
