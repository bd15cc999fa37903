use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open row range `[start, end)` of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchRange {
    pub start: usize,
    pub end: usize,
}

impl BatchRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Connection alias used by the worker that owns this batch.
    pub fn worker_alias(&self) -> String {
        format!("worker_{}", self.start)
    }
}

impl fmt::Display for BatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Owned copy of one slice of the dataset, handed to exactly one worker.
#[derive(Debug, Clone)]
pub struct Batch {
    pub range: BatchRange,
    pub ids: Vec<i64>,
    pub vectors: Vec<Vec<f32>>,
}

/// Split `[0, len)` into consecutive ranges of `batch_size`; the last may be shorter.
pub fn plan_batches(len: usize, batch_size: usize) -> Vec<BatchRange> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..len)
        .step_by(batch_size)
        .map(|start| BatchRange::new(start, (start + batch_size).min(len)))
        .collect()
}

pub(crate) fn make_batches(ids: &[i64], vectors: &[Vec<f32>], batch_size: usize) -> Vec<Batch> {
    plan_batches(ids.len(), batch_size)
        .into_iter()
        .map(|range| Batch {
            range,
            ids: ids[range.start..range.end].to_vec(),
            vectors: vectors[range.start..range.end].to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn four_rows_in_batches_of_two() {
        assert_eq!(
            plan_batches(4, 2),
            vec![BatchRange::new(0, 2), BatchRange::new(2, 4)]
        );
    }

    #[test]
    fn last_batch_may_be_shorter() {
        assert_eq!(
            plan_batches(2500, 1000),
            vec![
                BatchRange::new(0, 1000),
                BatchRange::new(1000, 2000),
                BatchRange::new(2000, 2500),
            ]
        );
    }

    #[test]
    fn empty_dataset_has_no_batches() {
        assert!(plan_batches(0, 1000).is_empty());
        assert!(plan_batches(10, 0).is_empty());
    }

    #[test]
    fn batches_copy_matching_slices() {
        let ids = vec![1, 2, 3];
        let vectors = vec![vec![0.1], vec![0.2], vec![0.3]];
        let batches = make_batches(&ids, &vectors, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].ids, vec![3]);
        assert_eq!(batches[1].vectors, vec![vec![0.3]]);
        assert_eq!(batches[1].range.worker_alias(), "worker_2");
        assert_eq!(batches[0].range.to_string(), "[0, 2)");
    }

    proptest! {
        #[test]
        fn every_row_lands_in_exactly_one_batch(len in 0usize..5000, batch_size in 1usize..700) {
            let ranges = plan_batches(len, batch_size);
            let mut next = 0;
            for range in &ranges {
                prop_assert_eq!(range.start, next);
                prop_assert!(!range.is_empty());
                prop_assert!(range.len() <= batch_size);
                next = range.end;
            }
            prop_assert_eq!(next, len);
            prop_assert_eq!(ranges.len(), len.div_ceil(batch_size));
        }
    }
}
