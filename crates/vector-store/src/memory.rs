//! In-process store backend.
//!
//! Mirrors the remote store's observable rules (load needs an index, an index
//! must be released before it is dropped, primary keys are unique) and adds
//! fault injection plus connection counters so callers can be tested without a
//! running server. All sessions opened from clones of one [`MemoryStore`] share
//! the same state.

use crate::backend::{Endpoint, StoreBackend, StoreSession};
use crate::error::{Result, StoreError};
use crate::flat_index::FlatIndex;
use crate::types::{CollectionSchema, Hit, IndexSpec, SearchParams};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    HasCollection,
    CreateCollection,
    DropCollection,
    DescribeCollection,
    Insert,
    IsLoaded,
    Load,
    Release,
    HasIndex,
    CreateIndex,
    DropIndex,
    Search,
    Disconnect,
}

struct MemoryCollection {
    schema: CollectionSchema,
    rows: FlatIndex,
    index: Option<IndexSpec>,
    loaded: bool,
}

#[derive(Default)]
struct Faults {
    connects: u32,
    ops: HashMap<StoreOp, u32>,
    insert_ids: HashSet<i64>,
}

#[derive(Default)]
struct Counters {
    connect_attempts: usize,
    open: usize,
    disconnects: usize,
    inserts: usize,
    searches: usize,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, MemoryCollection>,
    aliases: HashSet<String>,
    faults: Faults,
    counters: Counters,
}

impl MemoryState {
    fn take_fault(&mut self, op: StoreOp) -> Result<()> {
        if let Some(remaining) = self.faults.ops.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Injected(format!("{op:?}")));
            }
        }
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<&MemoryCollection> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut MemoryCollection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().faults.connects = count;
    }

    /// Fail the next call to `op` once.
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_times(op, 1);
    }

    pub fn fail_times(&self, op: StoreOp, count: u32) {
        *self.lock().faults.ops.entry(op).or_insert(0) += count;
    }

    /// Fail every insert call whose batch contains `id`.
    pub fn fail_inserts_containing(&self, id: i64) {
        self.lock().faults.insert_ids.insert(id);
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().counters.connect_attempts
    }

    pub fn open_connections(&self) -> usize {
        self.lock().counters.open
    }

    pub fn disconnects(&self) -> usize {
        self.lock().counters.disconnects
    }

    pub fn insert_calls(&self) -> usize {
        self.lock().counters.inserts
    }

    pub fn search_calls(&self) -> usize {
        self.lock().counters.searches
    }

    pub fn row_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, |c| c.rows.len())
    }

    pub fn contains_id(&self, collection: &str, id: i64) -> bool {
        self.lock()
            .collections
            .get(collection)
            .is_some_and(|c| c.rows.contains(id))
    }

    pub fn index_spec(&self, collection: &str) -> Option<IndexSpec> {
        self.lock().collections.get(collection).and_then(|c| c.index)
    }

    pub fn is_collection_loaded(&self, collection: &str) -> bool {
        self.lock()
            .collections
            .get(collection)
            .is_some_and(|c| c.loaded)
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn connect(&self, alias: &str, endpoint: &Endpoint) -> Result<Box<dyn StoreSession>> {
        let mut state = self.lock();
        state.counters.connect_attempts += 1;

        if state.faults.connects > 0 {
            state.faults.connects -= 1;
            return Err(StoreError::Unavailable(format!("{endpoint} refused connection")));
        }
        if !state.aliases.insert(alias.to_string()) {
            return Err(StoreError::Protocol(format!(
                "alias {alias} is already connected"
            )));
        }
        state.counters.open += 1;

        Ok(Box::new(MemorySession {
            alias: alias.to_string(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemorySession {
    alias: String,
    state: Arc<Mutex<MemoryState>>,
    closed: AtomicBool,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    fn guard(&self, op: StoreOp) -> Result<MutexGuard<'_, MemoryState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Protocol(format!(
                "session {} is closed",
                self.alias
            )));
        }
        let mut state = self.lock();
        match op {
            StoreOp::Insert => state.counters.inserts += 1,
            StoreOp::Search => state.counters.searches += 1,
            _ => {}
        }
        state.take_fault(op)?;
        Ok(state)
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    fn alias(&self) -> &str {
        &self.alias
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let state = self.guard(StoreOp::HasCollection)?;
        Ok(state.collections.contains_key(name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let mut state = self.guard(StoreOp::CreateCollection)?;
        if state.collections.contains_key(&schema.name) {
            return Err(StoreError::CollectionExists(schema.name.clone()));
        }
        state.collections.insert(
            schema.name.clone(),
            MemoryCollection {
                schema: schema.clone(),
                rows: FlatIndex::new(schema.dimension),
                index: None,
                loaded: false,
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let mut state = self.guard(StoreOp::DropCollection)?;
        state
            .collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema> {
        let state = self.guard(StoreOp::DescribeCollection)?;
        Ok(state.collection(name)?.schema.clone())
    }

    async fn insert(&self, collection: &str, ids: &[i64], vectors: &[Vec<f32>]) -> Result<usize> {
        let mut state = self.guard(StoreOp::Insert)?;

        if ids.len() != vectors.len() {
            return Err(StoreError::Protocol(format!(
                "insert got {} ids but {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        if let Some(id) = ids.iter().find(|id| state.faults.insert_ids.contains(*id)) {
            return Err(StoreError::Injected(format!("insert of id {id}")));
        }

        let target = state.collection_mut(collection)?;
        // Validate the whole batch before touching the rows so a rejected call writes nothing.
        let mut seen = HashSet::with_capacity(ids.len());
        for (id, vector) in ids.iter().zip(vectors) {
            target.rows.check_dimension(vector)?;
            if target.rows.contains(*id) || !seen.insert(*id) {
                return Err(StoreError::DuplicateId {
                    collection: collection.to_string(),
                    id: *id,
                });
            }
        }
        for (id, vector) in ids.iter().zip(vectors) {
            target.rows.add(*id, vector)?;
        }
        Ok(ids.len())
    }

    async fn is_loaded(&self, collection: &str) -> Result<bool> {
        let state = self.guard(StoreOp::IsLoaded)?;
        Ok(state.collection(collection)?.loaded)
    }

    async fn load(&self, collection: &str) -> Result<()> {
        let mut state = self.guard(StoreOp::Load)?;
        let target = state.collection_mut(collection)?;
        if target.index.is_none() {
            return Err(StoreError::IndexNotFound(collection.to_string()));
        }
        target.loaded = true;
        Ok(())
    }

    async fn release(&self, collection: &str) -> Result<()> {
        let mut state = self.guard(StoreOp::Release)?;
        state.collection_mut(collection)?.loaded = false;
        Ok(())
    }

    async fn has_index(&self, collection: &str) -> Result<bool> {
        let state = self.guard(StoreOp::HasIndex)?;
        Ok(state.collection(collection)?.index.is_some())
    }

    async fn create_index(&self, collection: &str, field: &str, spec: &IndexSpec) -> Result<()> {
        let mut state = self.guard(StoreOp::CreateIndex)?;
        let target = state.collection_mut(collection)?;
        if field != target.schema.vector_field() {
            return Err(StoreError::Remote {
                code: 1100,
                message: format!("field {field} is not a vector field"),
            });
        }
        match target.index {
            Some(existing) if existing != *spec => Err(StoreError::Remote {
                code: 65535,
                message: format!("at most one distinct index is allowed per field: {existing}"),
            }),
            _ => {
                target.index = Some(*spec);
                Ok(())
            }
        }
    }

    async fn drop_index(&self, collection: &str) -> Result<()> {
        let mut state = self.guard(StoreOp::DropIndex)?;
        let target = state.collection_mut(collection)?;
        if target.loaded {
            return Err(StoreError::Remote {
                code: 65535,
                message: "index cannot be dropped, collection is loaded".to_string(),
            });
        }
        if target.index.take().is_none() {
            return Err(StoreError::IndexNotFound(collection.to_string()));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        field: &str,
        queries: &[Vec<f32>],
        top_k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Vec<Hit>>> {
        let state = self.guard(StoreOp::Search)?;

        let target = state.collection(collection)?;
        if !target.loaded {
            return Err(StoreError::NotLoaded(collection.to_string()));
        }
        if field != target.schema.vector_field() {
            return Err(StoreError::Remote {
                code: 1100,
                message: format!("field {field} is not a vector field"),
            });
        }
        if let Some(index) = target.index {
            if index.metric != params.metric {
                return Err(StoreError::Remote {
                    code: 1100,
                    message: format!(
                        "metric type not match: index uses {}, search asked for {}",
                        index.metric, params.metric
                    ),
                });
            }
        }

        queries
            .iter()
            .map(|query| -> Result<Vec<Hit>> {
                let neighbors = target.rows.search(query, top_k, params.metric)?;
                Ok(neighbors
                    .into_iter()
                    .map(|(id, score)| Hit { id, score })
                    .collect())
            })
            .collect()
    }

    fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        // A failed teardown still releases the alias.
        let outcome = state.take_fault(StoreOp::Disconnect);
        if !self.closed.swap(true, Ordering::AcqRel) {
            state.aliases.remove(&self.alias);
            state.counters.open = state.counters.open.saturating_sub(1);
            state.counters.disconnects += 1;
        }
        outcome
    }
}
