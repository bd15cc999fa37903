use crate::batch::BatchRange;
use crate::index_manager::IndexStep;
use crate::stats::IngestReport;
use embedload_vector_store::{ConnectionError, StoreError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    BatchInsert(#[from] BatchInsertError),

    #[error(transparent)]
    IndexReplace(#[from] IndexReplaceError),

    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("collection {collection} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("collection {0} does not exist")]
    MissingCollection(String),

    #[error("vector at row {row} has length {actual}, expected {expected}")]
    RaggedVectors {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("got {ids} ids but {vectors} vectors")]
    LengthMismatch { ids: usize, vectors: usize },

    #[error("batch size must be positive")]
    ZeroBatchSize,

    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),
}

/// Why one batch did not make it into the store.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("collection {0} does not exist")]
    MissingCollection(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(Debug)]
pub struct BatchFailure {
    pub range: BatchRange,
    pub error: BatchError,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error inserting batch {}: {}", self.range, self.error)
    }
}

/// One or more batches failed. Batches that succeeded stay committed in the
/// store; nothing is rolled back.
#[derive(Debug)]
pub struct BatchInsertError {
    pub report: IngestReport,
    pub failures: Vec<BatchFailure>,
}

impl BatchInsertError {
    pub fn failed_ranges(&self) -> Vec<BatchRange> {
        self.failures.iter().map(|f| f.range).collect()
    }
}

impl fmt::Display for BatchInsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} batches failed to insert",
            self.failures.len(),
            self.report.total_batches
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} ({})", failure.range, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchInsertError {}

/// A step of the index replacement failed; later steps were not attempted.
#[derive(Error, Debug)]
#[error("index replacement on {collection} failed at step {step}: {source}")]
pub struct IndexReplaceError {
    pub collection: String,
    pub step: IndexStep,
    #[source]
    pub source: StoreError,
}
