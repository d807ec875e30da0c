use serde::Serialize;

use super::skeleton_graph::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiberLength {
    pub id: usize,
    pub length: f64,
}

pub struct FiberLengthCalculator {
    pub min_path_length: f64,
}

impl FiberLengthCalculator {
    /// Lengths in pixels of the merged paths longer than `min_path_length`,
    /// keeping the survivors' ids and order.
    pub fn calculate_fiber_lengths(&self, merged: &[(usize, Path)]) -> Vec<FiberLength> {
        merged
            .iter()
            .filter(|(_, path)| path.length > self.min_path_length)
            .map(|(id, path)| FiberLength { id: *id, length: path.length })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::skeleton_graph::NodeKind;

    fn row_path(len: usize) -> Path {
        Path::new((0..len).map(|c| (0, c)).collect(), NodeKind::End, NodeKind::End)
    }

    #[test]
    fn short_paths_are_dropped() {
        let calculator = FiberLengthCalculator { min_path_length: 30.0 };
        let merged = vec![(0, row_path(20)), (3, row_path(31)), (4, row_path(32)), (7, row_path(101))];

        let lengths = calculator.calculate_fiber_lengths(&merged);

        assert_eq!(
            lengths,
            vec![
                FiberLength { id: 4, length: 31.0 },
                FiberLength { id: 7, length: 100.0 },
            ]
        );
    }

    #[test]
    fn nothing_in_nothing_out() {
        let calculator = FiberLengthCalculator { min_path_length: 0.0 };

        assert!(calculator.calculate_fiber_lengths(&[]).is_empty());
    }
}
