use async_trait::async_trait;
use embedload_search::{BatchedSearcher, ParentMapping, SearchConfig, SearchError};
use embedload_vector_store::{
    CollectionSchema, ConnectionConfig, Connector, Endpoint, Hit, IndexSpec, MemoryStore,
    SearchParams, StoreBackend, StoreError, StoreSession, VECTOR_FIELD,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const COLLECTION: &str = "SOICT";

fn connector(store: &MemoryStore) -> Connector {
    let config = ConnectionConfig {
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
        ..ConnectionConfig::default()
    };
    Connector::new(Arc::new(store.clone()), config)
}

/// Three chunks: 10 and 11 share parent 100, 12 belongs to 200.
async fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    let s = store
        .connect("setup", &Endpoint::new("memory", 0))
        .await
        .unwrap();
    s.create_collection(&CollectionSchema::new(COLLECTION, 2))
        .await
        .unwrap();
    s.insert(
        COLLECTION,
        &[10, 11, 12],
        &[vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0]],
    )
    .await
    .unwrap();
    s.create_index(COLLECTION, VECTOR_FIELD, &IndexSpec::default())
        .await
        .unwrap();
    s.disconnect().unwrap();
    store
}

fn mapping() -> ParentMapping {
    ParentMapping::from_pairs([(10, 100), (11, 100), (12, 200)])
}

fn searcher(top_k: usize, batch_size: usize) -> BatchedSearcher {
    BatchedSearcher::new(SearchConfig {
        top_k,
        batch_size,
        params: SearchParams::default(),
    })
}

#[tokio::test]
async fn run_loads_collection_and_batches_queries() {
    let store = seeded().await;
    let queries: Vec<Vec<f32>> = (0..5).map(|i| vec![1.0, i as f32 * 0.1]).collect();

    let run = searcher(3, 2)
        .run(&connector(&store), "default", COLLECTION, &queries, &mapping())
        .await
        .unwrap();

    assert!(store.is_collection_loaded(COLLECTION));
    assert_eq!(store.search_calls(), 3);
    assert_eq!(run.report.total_queries, 5);
    assert_eq!(run.report.batches, 3);

    let qids: Vec<usize> = run.results.iter().map(|r| r.qid).collect();
    assert_eq!(qids, vec![0, 1, 2, 3, 4]);
    for result in &run.results {
        assert_eq!(result.cid, vec![100, 200]);
        assert_eq!(result.cosine.len(), 3);
        assert!(result.cosine.windows(2).all(|w| w[0] >= w[1]));
    }
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn nearest_chunk_decides_first_score() {
    let store = seeded().await;
    let run = searcher(1, 100)
        .run(&connector(&store), "default", COLLECTION, &[vec![0.0, 1.0]], &mapping())
        .await
        .unwrap();
    assert_eq!(run.results[0].cid, vec![200]);
    assert!((run.results[0].cosine[0] - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn zero_queries_make_no_store_call() {
    let store = seeded().await;
    let run = searcher(50, 100)
        .run(&connector(&store), "default", COLLECTION, &[], &mapping())
        .await
        .unwrap();
    assert!(run.results.is_empty());
    assert_eq!(run.report.batches, 0);
    assert_eq!(store.search_calls(), 0);
}

#[tokio::test]
async fn missing_collection_is_reported() {
    let store = MemoryStore::new();
    let err = searcher(5, 10)
        .run(&connector(&store), "default", "ghost", &[vec![1.0, 0.0]], &mapping())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::MissingCollection(name) if name == "ghost"));
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn unreachable_store_surfaces_connection_error() {
    let store = seeded().await;
    store.fail_next_connects(2);
    let err = searcher(5, 10)
        .run(&connector(&store), "default", COLLECTION, &[vec![1.0, 0.0]], &mapping())
        .await
        .unwrap_err();
    match err {
        SearchError::Connection(e) => assert_eq!(e.attempts, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn zero_top_k_is_rejected_before_connecting() {
    let store = seeded().await;
    let before = store.connect_attempts();
    let err = searcher(0, 10)
        .run(&connector(&store), "default", COLLECTION, &[vec![1.0, 0.0]], &mapping())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Precondition(_)));
    assert_eq!(store.connect_attempts(), before);
}

/// Drops the last hit list of every search response.
struct TruncatingSession(Box<dyn StoreSession>);

#[async_trait]
impl StoreSession for TruncatingSession {
    fn alias(&self) -> &str {
        self.0.alias()
    }
    async fn has_collection(&self, name: &str) -> embedload_vector_store::Result<bool> {
        self.0.has_collection(name).await
    }
    async fn create_collection(&self, schema: &CollectionSchema) -> embedload_vector_store::Result<()> {
        self.0.create_collection(schema).await
    }
    async fn drop_collection(&self, name: &str) -> embedload_vector_store::Result<()> {
        self.0.drop_collection(name).await
    }
    async fn describe_collection(&self, name: &str) -> embedload_vector_store::Result<CollectionSchema> {
        self.0.describe_collection(name).await
    }
    async fn insert(
        &self,
        collection: &str,
        ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> embedload_vector_store::Result<usize> {
        self.0.insert(collection, ids, vectors).await
    }
    async fn is_loaded(&self, collection: &str) -> embedload_vector_store::Result<bool> {
        self.0.is_loaded(collection).await
    }
    async fn load(&self, collection: &str) -> embedload_vector_store::Result<()> {
        self.0.load(collection).await
    }
    async fn release(&self, collection: &str) -> embedload_vector_store::Result<()> {
        self.0.release(collection).await
    }
    async fn has_index(&self, collection: &str) -> embedload_vector_store::Result<bool> {
        self.0.has_index(collection).await
    }
    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        spec: &IndexSpec,
    ) -> embedload_vector_store::Result<()> {
        self.0.create_index(collection, field, spec).await
    }
    async fn drop_index(&self, collection: &str) -> embedload_vector_store::Result<()> {
        self.0.drop_index(collection).await
    }
    async fn search(
        &self,
        collection: &str,
        field: &str,
        queries: &[Vec<f32>],
        top_k: usize,
        params: &SearchParams,
    ) -> embedload_vector_store::Result<Vec<Vec<Hit>>> {
        let mut hits = self.0.search(collection, field, queries, top_k, params).await?;
        hits.pop();
        Ok(hits)
    }
    fn disconnect(&self) -> embedload_vector_store::Result<()> {
        self.0.disconnect()
    }
}

#[tokio::test]
async fn short_search_response_is_a_store_error() {
    let store = seeded().await;
    let inner = store
        .connect("default", &Endpoint::new("memory", 0))
        .await
        .unwrap();
    inner.load(COLLECTION).await.unwrap();
    let session = TruncatingSession(inner);

    let err = searcher(2, 10)
        .search(&session, COLLECTION, &[vec![1.0, 0.0], vec![0.0, 1.0]], &mapping())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Store(StoreError::Protocol(_))));
    session.disconnect().unwrap();
}
