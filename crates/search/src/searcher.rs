use crate::error::{Result, SearchError};
use crate::mapping::ParentMapping;
use embedload_vector_store::{Connector, Hit, SearchParams, StoreError, StoreSession, VECTOR_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

pub const DEFAULT_TOP_K: usize = 50;
pub const DEFAULT_SEARCH_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Neighbours requested per query.
    pub top_k: usize,
    /// Queries per store call.
    pub batch_size: usize,
    pub params: SearchParams,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_SEARCH_BATCH_SIZE,
            params: SearchParams::default(),
        }
    }
}

/// Aggregated answer for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Global position of the query in the input.
    pub qid: usize,
    /// Distinct parent ids of every hit, ascending.
    pub cid: Vec<i64>,
    /// Hit scores in the order the store returned them.
    pub cosine: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub collection: String,
    pub total_queries: usize,
    pub batches: usize,
    pub time_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRun {
    pub report: SearchReport,
    pub results: Vec<SearchResult>,
}

/// Fold one batch of raw hits into per-query results.
///
/// `hits[j]` belongs to query `offset + j`. Hit ids with no entry in `mapping`
/// add nothing to `cid`, but their scores are still kept in `cosine`.
pub fn aggregate(offset: usize, hits: &[Vec<Hit>], mapping: &ParentMapping) -> Vec<SearchResult> {
    hits.iter()
        .enumerate()
        .map(|(j, query_hits)| {
            let cid: BTreeSet<i64> = query_hits
                .iter()
                .flat_map(|hit| mapping.parents(hit.id).iter().copied())
                .collect();
            SearchResult {
                qid: offset + j,
                cid: cid.into_iter().collect(),
                cosine: query_hits.iter().map(|hit| hit.score).collect(),
            }
        })
        .collect()
}

pub struct BatchedSearcher {
    config: SearchConfig,
}

impl BatchedSearcher {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search every query against `collection` in sequential batches.
    ///
    /// The collection must already be loaded. Results come back in ascending
    /// `qid` order; an empty query set makes no store call.
    pub async fn search(
        &self,
        session: &dyn StoreSession,
        collection: &str,
        queries: &[Vec<f32>],
        mapping: &ParentMapping,
    ) -> Result<Vec<SearchResult>> {
        self.validate()?;

        let mut results = Vec::with_capacity(queries.len());
        for (n, chunk) in queries.chunks(self.config.batch_size).enumerate() {
            let offset = n * self.config.batch_size;
            let hits = session
                .search(
                    collection,
                    VECTOR_FIELD,
                    chunk,
                    self.config.top_k,
                    &self.config.params,
                )
                .await?;
            if hits.len() != chunk.len() {
                return Err(StoreError::Protocol(format!(
                    "search returned {} hit lists for {} queries",
                    hits.len(),
                    chunk.len()
                ))
                .into());
            }
            log::debug!(
                "Searched queries {offset}..{} against '{collection}'",
                offset + chunk.len()
            );
            results.extend(aggregate(offset, &hits, mapping));
        }
        Ok(results)
    }

    /// Connect as `alias`, make sure `collection` exists and is loaded, then
    /// run [`BatchedSearcher::search`]. The connection is released on return.
    pub async fn run(
        &self,
        connector: &Connector,
        alias: &str,
        collection: &str,
        queries: &[Vec<f32>],
        mapping: &ParentMapping,
    ) -> Result<SearchRun> {
        self.validate()?;
        let start = Instant::now();

        let results = connector
            .with_connection(alias, |conn| async move {
                if !conn.has_collection(collection).await? {
                    return Err(SearchError::MissingCollection(collection.to_string()));
                }
                if !conn.is_loaded(collection).await? {
                    log::info!("Loading collection '{collection}' into memory...");
                    conn.load(collection).await?;
                }
                self.search(&*conn, collection, queries, mapping).await
            })
            .await?;

        let report = SearchReport {
            collection: collection.to_string(),
            total_queries: results.len(),
            batches: queries.len().div_ceil(self.config.batch_size),
            time_ms: start.elapsed().as_millis() as u64,
        };
        log::info!(
            "Searched {} queries in {} batches ({} ms)",
            report.total_queries,
            report.batches,
            report.time_ms
        );
        Ok(SearchRun { report, results })
    }

    fn validate(&self) -> Result<()> {
        if self.config.top_k == 0 {
            return Err(SearchError::Precondition("top_k must be positive".into()));
        }
        if self.config.batch_size == 0 {
            return Err(SearchError::Precondition(
                "batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
