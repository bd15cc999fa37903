use embedload_vector_store::{ConnectionError, StoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Collection '{0}' does not exist")]
    MissingCollection(String),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid search request: {0}")]
    Precondition(String),
}
