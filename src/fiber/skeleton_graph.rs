use std::collections::HashSet;

use log::debug;
use ndarray::Array2;
use serde::Serialize;

use super::fiber_skeleton::Skeleton;
use crate::linalg::{path_length, Pixel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    End,
    Junction,
    Isolated,
    Loop,
}

impl NodeKind {
    fn from_degree(degree: usize) -> NodeKind {
        match degree {
            0 => NodeKind::Isolated,
            1 => NodeKind::End,
            2 => NodeKind::Loop,
            _ => NodeKind::Junction,
        }
    }
}

/// Walk between two skeleton nodes; both terminal nodes are included.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub points: Vec<Pixel>,
    pub length: f64,
    pub start_kind: NodeKind,
    pub end_kind: NodeKind,
}

impl Path {
    pub fn new(points: Vec<Pixel>, start_kind: NodeKind, end_kind: NodeKind) -> Path {
        let length = path_length(&points);

        Path {
            points,
            length,
            start_kind,
            end_kind,
        }
    }

    pub fn head(&self) -> Pixel {
        self.points[0]
    }

    pub fn tail(&self) -> Pixel {
        self.points[self.points.len() - 1]
    }

    pub fn pixel_count(&self) -> usize {
        self.points.len()
    }

    pub fn reversed(&self) -> Path {
        let mut points = self.points.clone();
        points.reverse();

        Path {
            points,
            length: self.length,
            start_kind: self.end_kind,
            end_kind: self.start_kind,
        }
    }
}

pub struct SkeletonGraphExtractor {
    pub max_junction: f64,
}

impl SkeletonGraphExtractor {
    pub fn new(max_junction: f64) -> SkeletonGraphExtractor {
        SkeletonGraphExtractor { max_junction }
    }

    /// Paths longer than the junction threshold, in tracing order.
    pub fn extract(&self, skeleton: &Skeleton) -> Vec<Path> {
        let all = trace_paths(skeleton);
        let total = all.len();

        let paths: Vec<Path> = all
            .into_iter()
            .filter(|path| path.length > self.max_junction)
            .collect();

        debug!(
            "skeleton graph: {} paths traced, {} longer than {}",
            total,
            paths.len(),
            self.max_junction
        );

        paths
    }
}

fn edge_key(a: Pixel, b: Pixel) -> (Pixel, Pixel) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Decomposes the skeleton into every node-to-node path. Nodes are pixels
/// whose degree is not 2. Closed loops of degree-2 pixels become one path
/// that starts and ends on their first pixel in row-major order.
pub fn trace_paths(skeleton: &Skeleton) -> Vec<Path> {
    let (rows, cols) = skeleton.dim();
    let degree = Array2::from_shape_fn((rows, cols), |(r, c)| {
        if skeleton.contains((r, c)) { skeleton.degree((r, c)) } else { 0 }
    });

    let mut walked: HashSet<(Pixel, Pixel)> = HashSet::new();
    let mut on_path = Array2::from_elem((rows, cols), false);
    let mut paths = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            let node = (r, c);
            if !skeleton.contains(node) || degree[node] == 2 {
                continue;
            }

            if degree[node] == 0 {
                paths.push(Path::new(vec![node], NodeKind::Isolated, NodeKind::Isolated));
                continue;
            }

            for next in skeleton.neighbors(node) {
                if walked.contains(&edge_key(node, next)) {
                    continue;
                }
                walked.insert(edge_key(node, next));

                let mut points = vec![node, next];
                let mut previous = node;
                let mut current = next;

                while degree[current] == 2 {
                    on_path[current] = true;

                    let following = skeleton
                        .neighbors(current)
                        .into_iter()
                        .find(|&q| q != previous);
                    let following = match following {
                        Some(q) if !walked.contains(&edge_key(current, q)) => q,
                        _ => break,
                    };

                    walked.insert(edge_key(current, following));
                    points.push(following);
                    previous = current;
                    current = following;
                }

                let end_kind = NodeKind::from_degree(degree[current]);
                paths.push(Path::new(points, NodeKind::from_degree(degree[node]), end_kind));
            }
        }
    }

    for r in 0..rows {
        for c in 0..cols {
            let start = (r, c);
            if !skeleton.contains(start) || degree[start] != 2 || on_path[start] {
                continue;
            }

            on_path[start] = true;
            let mut points = vec![start];
            let mut previous = start;
            let mut current = match skeleton.neighbors(start).first() {
                Some(&q) => q,
                None => continue,
            };

            while current != start && !on_path[current] {
                on_path[current] = true;
                points.push(current);

                let following = skeleton
                    .neighbors(current)
                    .into_iter()
                    .find(|&q| q != previous);
                match following {
                    Some(q) => {
                        previous = current;
                        current = q;
                    }
                    None => break,
                }
            }

            if current == start {
                points.push(start);
            }
            paths.push(Path::new(points, NodeKind::Loop, NodeKind::Loop));
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use std::f64::consts::SQRT_2;

    use super::*;

    fn skeleton_of(rows: usize, cols: usize, pixels: &[Pixel]) -> Skeleton {
        let mut mask = Array2::from_elem((rows, cols), false);
        for &p in pixels {
            mask[p] = true;
        }

        Skeleton::from_thin_mask(mask)
    }

    #[test]
    fn straight_line_is_one_path() {
        let pixels: Vec<Pixel> = (0..100).map(|c| (5, c)).collect();
        let paths = trace_paths(&skeleton_of(10, 100, &pixels));

        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].pixel_count(), 100);
        assert_eq!(paths[0].length, 99.0);
        assert_eq!(paths[0].head(), (5, 0));
        assert_eq!(paths[0].tail(), (5, 99));
        assert_eq!(paths[0].start_kind, NodeKind::End);
        assert_eq!(paths[0].end_kind, NodeKind::End);
    }

    #[test]
    fn t_junction_splits_into_three_paths() {
        let mut pixels: Vec<Pixel> = (0..41).filter(|&c| c != 20).map(|c| (20, c)).collect();
        pixels.extend((21..40).map(|r| (r, 20)));
        let paths = trace_paths(&skeleton_of(40, 41, &pixels));

        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(path.points.contains(&(21, 20)));
            assert!(path.length >= (path.pixel_count() - 1) as f64);
        }

        let lengths: Vec<f64> = paths.iter().map(|p| p.length).collect();
        assert!((lengths[0] - (19.0 + SQRT_2)).abs() < 1e-9);
        assert!((lengths[1] - (19.0 + SQRT_2)).abs() < 1e-9);
        assert_eq!(lengths[2], 18.0);
        assert_eq!(paths[1].head(), (20, 40));

        let junction_ends = paths
            .iter()
            .filter(|p| p.start_kind == NodeKind::Junction || p.end_kind == NodeKind::Junction)
            .count();
        assert_eq!(junction_ends, 3);
    }

    #[test]
    fn diamond_ring_is_closed_loop() {
        let pixels = [
            (0, 3), (1, 2), (1, 4), (2, 1), (2, 5), (3, 0),
            (3, 6), (4, 1), (4, 5), (5, 2), (5, 4), (6, 3),
        ];
        let paths = trace_paths(&skeleton_of(7, 7, &pixels));

        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].start_kind, NodeKind::Loop);
        assert_eq!(paths[0].head(), paths[0].tail());
        assert_eq!(paths[0].pixel_count(), 13);
        assert!((paths[0].length - 12.0 * SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn isolated_pixel_is_zero_length_path() {
        let paths = trace_paths(&skeleton_of(5, 5, &[(2, 2)]));

        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].length, 0.0);
        assert_eq!(paths[0].pixel_count(), 1);
    }

    #[test]
    fn short_paths_are_junction_artifacts() {
        let mut pixels: Vec<Pixel> = (0..61).map(|c| (20, c)).collect();
        pixels.extend((21..26).map(|r| (r, 30)));
        let paths = SkeletonGraphExtractor::new(10.0).extract(&skeleton_of(40, 61, &pixels));

        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.length > 10.0));
    }

    #[test]
    fn reversed_swaps_kinds() {
        let path = Path::new(vec![(0, 0), (0, 1), (1, 2)], NodeKind::End, NodeKind::Junction);
        let reversed = path.reversed();

        assert_eq!(reversed.head(), (1, 2));
        assert_eq!(reversed.start_kind, NodeKind::Junction);
        assert_eq!(reversed.length, path.length);
    }
}
