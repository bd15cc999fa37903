use crate::batch::{make_batches, Batch, BatchRange};
use crate::error::{
    BatchError, BatchFailure, BatchInsertError, PreconditionError, Result, SchemaError,
};
use crate::limits::{default_worker_count, effective_workers};
use crate::stats::IngestReport;
use embedload_vector_store::{Connector, VectorRecord};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    /// Rows per insert call.
    pub batch_size: usize,
    /// Upper bound on concurrently running workers.
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_worker_count(),
        }
    }
}

/// Result of dispatching every batch, before deciding whether the run failed.
#[derive(Debug)]
pub struct IngestOutcome {
    pub report: IngestReport,
    /// Failed batches in ascending range order.
    pub failures: Vec<BatchFailure>,
}

impl IngestOutcome {
    pub fn into_result(self) -> std::result::Result<IngestReport, BatchInsertError> {
        if self.failures.is_empty() {
            Ok(self.report)
        } else {
            Err(BatchInsertError {
                report: self.report,
                failures: self.failures,
            })
        }
    }
}

/// Parallel batched ingestion.
///
/// Every batch is inserted by its own worker over its own connection (alias
/// `worker_{start}`), with at most `workers` batches in flight. A batch is a
/// single insert call and is never retried here; only the connect step is
/// retried, by the [`Connector`].
pub struct IngestPipeline {
    connector: Connector,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(connector: Connector, config: IngestConfig) -> Self {
        Self { connector, config }
    }

    pub const fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Insert every `(ids[i], vectors[i])` pair into `collection`.
    ///
    /// Fails with [`BatchInsertError`] listing every failed range if any batch
    /// failed. Batches that succeeded are **not** rolled back: the store is not
    /// transactional across batches, so a partial failure leaves those rows
    /// committed and queryable.
    pub async fn insert_all(
        &self,
        collection: &str,
        ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> Result<IngestReport> {
        let outcome = self.ingest(collection, ids, vectors).await?;
        Ok(outcome.into_result()?)
    }

    pub async fn insert_records(
        &self,
        collection: &str,
        records: &[VectorRecord],
    ) -> Result<IngestReport> {
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.vector.clone()).collect();
        self.insert_all(collection, &ids, &vectors).await
    }

    /// Dispatch all batches and collect per-batch outcomes without failing on
    /// batch errors. Precondition violations are still returned as errors, before
    /// anything is sent.
    pub async fn ingest(
        &self,
        collection: &str,
        ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> Result<IngestOutcome> {
        validate_input(ids, vectors, self.config.batch_size)?;

        let start = Instant::now();
        let batches = make_batches(ids, vectors, self.config.batch_size);
        let workers = effective_workers(self.config.workers, batches.len());
        let mut report = IngestReport::new(batches.len(), workers);

        log::info!(
            "Starting parallel insertion of {} rows in {} batches with {workers} workers...",
            ids.len(),
            batches.len()
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let collection: Arc<str> = Arc::from(collection);
        let mut pool = WorkerPool::with_capacity(batches.len());

        for batch in batches {
            let range = batch.range;
            let connector = self.connector.clone();
            let semaphore = Arc::clone(&semaphore);
            let collection = Arc::clone(&collection);
            let handle = tokio::spawn(async move {
                // The semaphore is never closed; acquire failures are not expected.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .unwrap_or_else(|_| unreachable!("ingest worker semaphore closed"));
                insert_batch(&connector, &collection, batch).await
            });
            pool.push(range, handle);
        }

        let mut failures = Vec::new();
        for (range, handle) in pool.handles.iter_mut() {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(BatchError::Panicked(err.to_string())),
            };
            match result {
                Ok(rows) => report.add_success(rows),
                Err(error) => {
                    log::error!("Error inserting batch {range}: {error}");
                    failures.push(BatchFailure {
                        range: *range,
                        error,
                    });
                }
            }
        }

        report.time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "Inserted {}/{} batches successfully ({} rows, {} ms)",
            report.success_count,
            report.total_batches,
            report.inserted_rows,
            report.time_ms
        );

        Ok(IngestOutcome { report, failures })
    }
}

fn validate_input(ids: &[i64], vectors: &[Vec<f32>], batch_size: usize) -> Result<()> {
    if ids.len() != vectors.len() {
        return Err(PreconditionError::LengthMismatch {
            ids: ids.len(),
            vectors: vectors.len(),
        }
        .into());
    }
    if batch_size == 0 {
        return Err(PreconditionError::ZeroBatchSize.into());
    }
    if let Some(first) = vectors.first() {
        let expected = first.len();
        if let Some((row, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != expected)
        {
            return Err(SchemaError::RaggedVectors {
                row,
                expected,
                actual: v.len(),
            }
            .into());
        }
    }
    Ok(())
}

async fn insert_batch(
    connector: &Connector,
    collection: &str,
    batch: Batch,
) -> std::result::Result<usize, BatchError> {
    let Batch {
        range,
        ids,
        vectors,
    } = batch;

    let conn = connector.open(&range.worker_alias()).await?;
    if !conn.has_collection(collection).await? {
        return Err(BatchError::MissingCollection(collection.to_string()));
    }
    let rows = conn.insert(collection, &ids, &vectors).await?;
    log::info!("Successfully inserted batch {}:{}", range.start, range.end);
    Ok(rows)
}

/// Spawned workers, aborted if the pipeline future is dropped before they finish.
struct WorkerPool {
    handles: Vec<(BatchRange, JoinHandle<std::result::Result<usize, BatchError>>)>,
}

impl WorkerPool {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, range: BatchRange, handle: JoinHandle<std::result::Result<usize, BatchError>>) {
        self.handles.push((range, handle));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}
