use serde::{Deserialize, Serialize};

/// Statistics about an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Number of batches dispatched
    pub total_batches: usize,

    /// Batches committed to the store
    pub success_count: usize,

    /// Rows the store acknowledged
    pub inserted_rows: usize,

    /// Size of the worker pool
    pub workers: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,
}

impl IngestReport {
    pub fn new(total_batches: usize, workers: usize) -> Self {
        Self {
            total_batches,
            workers,
            ..Self::default()
        }
    }

    pub fn add_success(&mut self, rows: usize) {
        self.success_count += 1;
        self.inserted_rows += rows;
    }

    pub const fn failed_count(&self) -> usize {
        self.total_batches - self.success_count
    }

    pub const fn is_complete(&self) -> bool {
        self.success_count == self.total_batches
    }
}
