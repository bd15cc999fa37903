//! # Embedload Search
//!
//! Read side of the store. Query embeddings are searched in fixed-size batches and
//! each query's chunk-level hits are folded into parent-level results:
//!
//! ```text
//! queries ──chunks(batch_size)──> store search (top_k) ──> aggregate ──> SearchResult { qid, cid, cosine }
//!                                                              │
//!                                              ParentMapping (chunk id → parent ids)
//! ```

mod error;
mod mapping;
mod searcher;

pub use error::{Result, SearchError};
pub use mapping::ParentMapping;
pub use searcher::{
    aggregate, BatchedSearcher, SearchConfig, SearchReport, SearchResult, SearchRun,
    DEFAULT_SEARCH_BATCH_SIZE, DEFAULT_TOP_K,
};
