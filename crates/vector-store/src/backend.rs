use crate::error::Result;
use crate::types::{CollectionSchema, Hit, IndexSpec, SearchParams};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Network location of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Something that can open sessions against a store.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Open a session registered under `alias`.
    async fn connect(&self, alias: &str, endpoint: &Endpoint) -> Result<Box<dyn StoreSession>>;
}

/// RPC surface of a connected store session.
///
/// Collections are addressed by name; the vector field name is passed
/// explicitly so the session stays schema-agnostic.
#[async_trait]
pub trait StoreSession: Send + Sync {
    fn alias(&self) -> &str;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema>;

    /// Insert one batch as a single remote call. Returns the number of rows written.
    async fn insert(&self, collection: &str, ids: &[i64], vectors: &[Vec<f32>]) -> Result<usize>;

    async fn is_loaded(&self, collection: &str) -> Result<bool>;

    async fn load(&self, collection: &str) -> Result<()>;

    async fn release(&self, collection: &str) -> Result<()>;

    async fn has_index(&self, collection: &str) -> Result<bool>;

    async fn create_index(&self, collection: &str, field: &str, spec: &IndexSpec) -> Result<()>;

    async fn drop_index(&self, collection: &str) -> Result<()>;

    /// Nearest-neighbor search. Returns one hit list per query, in query order,
    /// each ordered by decreasing similarity.
    async fn search(
        &self,
        collection: &str,
        field: &str,
        queries: &[Vec<f32>],
        top_k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Vec<Hit>>>;

    /// Release the session. Best-effort and synchronous so it can run from `Drop`.
    fn disconnect(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_adds_scheme_when_missing() {
        assert_eq!(
            Endpoint::new("localhost", 19530).base_url(),
            "http://localhost:19530"
        );
        assert_eq!(
            Endpoint::new("https://milvus.internal/", 443).base_url(),
            "https://milvus.internal:443"
        );
    }
}
