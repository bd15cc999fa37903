//! # Embedload Indexer
//!
//! Write side of the store: collection setup, bulk ingestion and index rebuilds.
//!
//! ## Pipeline
//!
//! ```text
//! ids + vectors
//!     │
//!     ├──> ensure_collection (create / recreate, schema check)
//!     │
//!     ├──> IngestPipeline (fixed-size batches, bounded worker pool)
//!     │      └─> one connection + one insert call per batch
//!     │
//!     └──> replace_index (release → drop → create → load)
//!            └─> Searchable collection
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use embedload_indexer::{ensure_collection, replace_default_index, IngestConfig, IngestPipeline, SetupMode};
//! use embedload_vector_store::{ConnectionConfig, Connector, MilvusRestBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = Connector::new(Arc::new(MilvusRestBackend::new()), ConnectionConfig::default());
//!     let ids = vec![1_i64, 2];
//!     let vectors = vec![vec![0.1_f32; 768], vec![0.2; 768]];
//!
//!     let setup = connector.open("default").await?;
//!     ensure_collection(&*setup, "SOICT", 768, SetupMode::Recreate).await?;
//!
//!     let pipeline = IngestPipeline::new(connector.clone(), IngestConfig::default());
//!     let report = pipeline.insert_all("SOICT", &ids, &vectors).await?;
//!     println!("Inserted {}/{} batches", report.success_count, report.total_batches);
//!
//!     replace_default_index(&*setup, "SOICT").await?;
//!     Ok(())
//! }
//! ```

mod batch;
mod collection;
mod error;
mod index_manager;
mod limits;
mod pipeline;
mod stats;

pub use batch::{plan_batches, Batch, BatchRange};
pub use collection::{ensure_collection, require_collection, SetupMode};
pub use error::{
    BatchError, BatchFailure, BatchInsertError, IndexReplaceError, IndexerError,
    PreconditionError, Result, SchemaError,
};
pub use index_manager::{replace_default_index, replace_index, IndexReplaceReport, IndexStep};
pub use limits::{
    default_worker_count, effective_workers, worker_count_from_env, DEFAULT_WORKER_CAP, WORKERS_ENV,
};
pub use pipeline::{IngestConfig, IngestOutcome, IngestPipeline, DEFAULT_BATCH_SIZE};
pub use stats::IngestReport;
