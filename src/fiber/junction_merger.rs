use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::SQRT_2;

use log::{debug, warn};
use ndarray::Array2;

use super::fiber_skeleton::Skeleton;
use super::skeleton_graph::Path;
use super::FiberConfig;
use crate::linalg::{angle_deviation, chebyshev, direction, Pixel};

const SKELETON_COST: f64 = 1.0;
const BACKGROUND_COST: f64 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Head,
    Tail,
}

/// Terminal pixel of a path together with its outward direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub position: Pixel,
    pub direction: (f64, f64),
    pub path_id: usize,
    pub side: Side,
    pub consumed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeCandidate {
    pub first: usize,
    pub second: usize,
    pub deviation: f64,
    pub cost: f64,
    /// Least-cost route from the first endpoint to the second, both included.
    pub route: Vec<Pixel>,
}

pub struct JunctionMerger {
    pub max_junction: f64,
    pub max_angle: f64,
    pub delta: usize,
    pub max_searches: usize,
}

impl JunctionMerger {
    pub fn new(config: &FiberConfig) -> JunctionMerger {
        JunctionMerger {
            max_junction: config.max_junction,
            max_angle: config.max_angle,
            delta: config.delta,
            max_searches: config.max_connectivity_searches,
        }
    }

    /// Heads of all paths in order, then all tails in order.
    pub fn endpoints(&self, paths: &[Path]) -> Vec<Endpoint> {
        let heads = paths.iter().enumerate().map(|(id, path)| {
            let k = self.delta.min(path.pixel_count() - 1);
            Endpoint {
                position: path.head(),
                direction: direction(path.head(), path.points[k]),
                path_id: id,
                side: Side::Head,
                consumed: false,
            }
        });
        let tails = paths.iter().enumerate().map(|(id, path)| {
            let n = path.pixel_count();
            let k = self.delta.min(n - 1);
            Endpoint {
                position: path.tail(),
                direction: direction(path.tail(), path.points[n - 1 - k]),
                path_id: id,
                side: Side::Tail,
                consumed: false,
            }
        });

        heads.chain(tails).collect()
    }

    /// Endpoint pairs on different paths that are connected through the
    /// skeleton within `max_junction` and continue each other within
    /// `max_angle`, sorted by deviation. Ties keep enumeration order.
    pub fn candidates(&self, endpoints: &[Endpoint], skeleton: &Skeleton) -> Vec<MergeCandidate> {
        let mut candidates = Vec::new();
        let mut searches = 0usize;

        'pairs: for i1 in 0..endpoints.len() {
            for i2 in (i1 + 1)..endpoints.len() {
                let (e1, e2) = (&endpoints[i1], &endpoints[i2]);
                if e1.path_id == e2.path_id {
                    continue;
                }
                if chebyshev(e1.position, e2.position) as f64 > self.max_junction {
                    continue;
                }

                let deviation = angle_deviation(e1.direction, e2.direction);
                if deviation > self.max_angle {
                    continue;
                }

                if searches == self.max_searches {
                    warn!(
                        "connectivity search limit of {} reached, remaining endpoint pairs skipped",
                        self.max_searches
                    );
                    break 'pairs;
                }
                searches += 1;

                if let Some((cost, route)) = least_cost_route(skeleton, e1.position, e2.position, self.max_junction) {
                    candidates.push(MergeCandidate {
                        first: i1,
                        second: i2,
                        deviation,
                        cost,
                        route,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| a.deviation.total_cmp(&b.deviation));
        debug!(
            "junction merge: {} endpoints, {} route searches, {} candidates",
            endpoints.len(),
            searches,
            candidates.len()
        );

        candidates
    }

    /// Greedily joins paths across junctions, best continuation first. Each
    /// surviving path keeps the id (input index) of the first path it absorbed
    /// into; absorbed paths disappear from the output.
    pub fn merge(&self, paths: Vec<Path>, skeleton: &Skeleton) -> Vec<(usize, Path)> {
        let mut endpoints = self.endpoints(&paths);
        let candidates = self.candidates(&endpoints, skeleton);
        let mut arena: Vec<Option<Path>> = paths.into_iter().map(Some).collect();
        let mut merges = 0usize;

        for candidate in candidates {
            let (e1, e2) = (&endpoints[candidate.first], &endpoints[candidate.second]);
            if e1.consumed || e2.consumed {
                continue;
            }

            let (a, b) = (e1.path_id, e2.path_id);
            if a == b {
                // both ends of one path: joining them would close a loop
                continue;
            }

            let (left, right) = match (&arena[a], &arena[b]) {
                (Some(left), Some(right)) => (
                    if e1.side == Side::Head { left.reversed() } else { left.clone() },
                    if e2.side == Side::Tail { right.reversed() } else { right.clone() },
                ),
                _ => continue,
            };

            let route = &candidate.route;
            let interior = if route.len() > 2 { &route[1..route.len() - 1] } else { &[][..] };

            let mut points = left.points;
            points.extend_from_slice(interior);
            let skip = usize::from(points.last() == right.points.first());
            points.extend_from_slice(&right.points[skip..]);

            arena[a] = Some(Path::new(points, left.start_kind, right.end_kind));
            arena[b] = None;

            for endpoint in endpoints.iter_mut().filter(|e| !e.consumed) {
                if endpoint.path_id == b {
                    endpoint.path_id = a;
                    endpoint.side = Side::Tail;
                } else if endpoint.path_id == a {
                    endpoint.side = Side::Head;
                }
            }
            endpoints[candidate.first].consumed = true;
            endpoints[candidate.second].consumed = true;
            merges += 1;
        }

        debug!("junction merge: {} merges applied", merges);

        arena
            .into_iter()
            .enumerate()
            .filter_map(|(id, path)| path.map(|path| (id, path)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    cost: f64,
    pixel: Pixel,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

// reversed so the BinaryHeap pops the cheapest state first
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.pixel.cmp(&self.pixel))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra over the 8-connected grid where skeleton pixels cost 1 and
/// background pixels 255; a step costs its length times the mean of its two
/// pixel costs. Gives up once the cheapest open route exceeds `max_cost`.
pub fn least_cost_route(skeleton: &Skeleton, from: Pixel, to: Pixel, max_cost: f64) -> Option<(f64, Vec<Pixel>)> {
    let (rows, cols) = skeleton.dim();
    if from.0 >= rows || from.1 >= cols || to.0 >= rows || to.1 >= cols {
        return None;
    }

    // every step costs at least 1, so no affordable route leaves this window
    let margin = max_cost.max(0.0).ceil() as usize;
    let r0 = from.0.min(to.0).saturating_sub(margin);
    let c0 = from.1.min(to.1).saturating_sub(margin);
    let r1 = (from.0.max(to.0) + margin + 1).min(rows);
    let c1 = (from.1.max(to.1) + margin + 1).min(cols);

    let pixel_cost = |p: Pixel| if skeleton.contains(p) { SKELETON_COST } else { BACKGROUND_COST };
    let local = |p: Pixel| (p.0 - r0, p.1 - c0);

    let mut best = Array2::from_elem((r1 - r0, c1 - c0), f64::INFINITY);
    let mut previous: Array2<Option<Pixel>> = Array2::from_elem((r1 - r0, c1 - c0), None);
    let mut open = BinaryHeap::new();

    best[local(from)] = 0.0;
    open.push(State { cost: 0.0, pixel: from });

    while let Some(State { cost, pixel }) = open.pop() {
        if cost > best[local(pixel)] {
            continue;
        }
        if cost > max_cost {
            return None;
        }

        if pixel == to {
            let mut route = vec![to];
            let mut current = to;
            while let Some(p) = previous[local(current)] {
                route.push(p);
                current = p;
            }
            route.reverse();

            return Some((cost, route));
        }

        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }

                let next = match (pixel.0.checked_add_signed(dr), pixel.1.checked_add_signed(dc)) {
                    (Some(r), Some(c)) if (r0..r1).contains(&r) && (c0..c1).contains(&c) => (r, c),
                    _ => continue,
                };

                let step = if dr != 0 && dc != 0 { SQRT_2 } else { 1.0 };
                let next_cost = cost + step * (pixel_cost(pixel) + pixel_cost(next)) / 2.0;
                if next_cost < best[local(next)] {
                    best[local(next)] = next_cost;
                    previous[local(next)] = Some(pixel);
                    open.push(State { cost: next_cost, pixel: next });
                }
            }
        }
    }

    None
}
