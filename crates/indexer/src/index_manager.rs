use crate::error::{IndexReplaceError, Result};
use embedload_vector_store::{IndexSpec, StoreError, StoreSession, VECTOR_FIELD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Steps of an index replacement, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStep {
    Release,
    DropIndex,
    CreateIndex,
    Load,
}

impl fmt::Display for IndexStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Release => "release",
            Self::DropIndex => "drop_index",
            Self::CreateIndex => "create_index",
            Self::Load => "load",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReplaceReport {
    pub collection: String,
    pub spec: IndexSpec,
    /// The collection was loaded and had to be released first.
    pub released: bool,
    /// An existing index was dropped.
    pub dropped_index: bool,
    pub time_ms: u64,
}

/// Swap the collection's ANN index for one built from `spec`.
///
/// Runs release → drop → create → load. Release and drop only happen when the
/// collection is loaded / indexed, so the sequence is safe to repeat. The first
/// failing step aborts the rest and is named in the error; the collection may
/// then be left released or without an index.
///
/// Callers must not run two replacements, or a replacement and an ingestion,
/// against the same collection at once.
pub async fn replace_index(
    session: &dyn StoreSession,
    collection: &str,
    spec: &IndexSpec,
) -> Result<IndexReplaceReport> {
    let start = Instant::now();
    let step_err = |step: IndexStep| {
        move |source: StoreError| IndexReplaceError {
            collection: collection.to_string(),
            step,
            source,
        }
    };

    let released = if session
        .is_loaded(collection)
        .await
        .map_err(step_err(IndexStep::Release))?
    {
        log::info!("Releasing collection '{collection}' from memory...");
        session
            .release(collection)
            .await
            .map_err(step_err(IndexStep::Release))?;
        true
    } else {
        false
    };

    let dropped_index = if session
        .has_index(collection)
        .await
        .map_err(step_err(IndexStep::DropIndex))?
    {
        log::info!("Dropping existing index on '{collection}'...");
        session
            .drop_index(collection)
            .await
            .map_err(step_err(IndexStep::DropIndex))?;
        true
    } else {
        false
    };

    log::info!("Creating new index on '{collection}': {spec}");
    session
        .create_index(collection, VECTOR_FIELD, spec)
        .await
        .map_err(step_err(IndexStep::CreateIndex))?;

    log::info!("Loading collection '{collection}' into memory...");
    session
        .load(collection)
        .await
        .map_err(step_err(IndexStep::Load))?;

    let report = IndexReplaceReport {
        collection: collection.to_string(),
        spec: *spec,
        released,
        dropped_index,
        time_ms: start.elapsed().as_millis() as u64,
    };
    log::info!(
        "Index replacement on '{collection}' completed in {} ms",
        report.time_ms
    );
    Ok(report)
}

/// [`replace_index`] with [`IndexSpec::default`] (IVF_FLAT, cosine, nlist 768).
pub async fn replace_default_index(
    session: &dyn StoreSession,
    collection: &str,
) -> Result<IndexReplaceReport> {
    replace_index(session, collection, &IndexSpec::default()).await
}
