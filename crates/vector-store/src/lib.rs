//! # Embedload Vector Store
//!
//! Client-side view of a remote similarity-search store.
//!
//! ## Features
//!
//! - **Fixed schema**: int64 primary key plus one float vector field
//! - **Store RPC surface** as object-safe async traits
//! - **Milvus REST backend** for real deployments
//! - **In-memory backend** with fault injection for tests and dry runs
//! - **Resilient connections** with bounded retry and guaranteed release
//!
//! ## Architecture
//!
//! ```text
//! Connector (retry, alias)
//!     │
//!     ├──> StoreBackend::connect
//!     │      ├─> MilvusRestBackend (HTTP, /v2/vectordb)
//!     │      └─> MemoryStore (in-process)
//!     │
//!     └──> Connection guard
//!            └─> StoreSession RPCs, disconnect on drop
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use embedload_vector_store::{ConnectionConfig, Connector, MilvusRestBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = Connector::new(
//!         Arc::new(MilvusRestBackend::new()),
//!         ConnectionConfig::default(),
//!     );
//!     let conn = connector.open("default").await?;
//!     println!("has SOICT: {}", conn.has_collection("SOICT").await?);
//!     Ok(())
//! }
//! ```

mod backend;
mod connector;
mod error;
mod flat_index;
mod memory;
mod milvus;
mod types;

pub use backend::{Endpoint, StoreBackend, StoreSession};
pub use connector::{
    Connection, ConnectionConfig, Connector, DEFAULT_HOST, DEFAULT_MAX_RETRIES, DEFAULT_PORT,
    DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
};
pub use error::{ConnectionError, Result, StoreError};
pub use flat_index::cosine_similarity;
pub use memory::{MemoryStore, StoreOp};
pub use milvus::MilvusRestBackend;
pub use types::{
    CollectionSchema, Hit, IndexParams, IndexSpec, IndexType, MetricType, SearchParams,
    VectorRecord, DEFAULT_DIMENSION, DEFAULT_NLIST, DEFAULT_NPROBE, ID_FIELD, VECTOR_FIELD,
};
