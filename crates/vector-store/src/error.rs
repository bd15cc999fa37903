use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Collection {0} has no index")]
    IndexNotFound(String),

    #[error("Collection {0} is not loaded")]
    NotLoaded(String),

    #[error("Collection {collection} still {state} after {waited:?}")]
    LoadTimeout {
        collection: String,
        state: String,
        waited: std::time::Duration,
    },

    #[error("Duplicate primary key {id} in collection {collection}")]
    DuplicateId { collection: String, id: i64 },

    #[error("Connection refused: {0}")]
    Unavailable(String),

    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Raised once the connector has used up every connection attempt.
#[derive(Error, Debug)]
#[error("Failed to connect as {alias} after {attempts} attempts: {source}")]
pub struct ConnectionError {
    pub alias: String,
    pub attempts: u32,
    #[source]
    pub source: StoreError,
}
