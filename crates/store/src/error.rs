use thiserror::Error;

/// Errors raised by the corpus stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The lexical index could not be constructed from a corpus snapshot.
    #[error("failed to build lexical index: {0}")]
    IndexBuild(String),

    /// The lexical index failed while answering a query.
    #[error("lexical index unavailable: {0}")]
    LexicalUnavailable(String),

    /// The vector similarity store could not be reached or failed mid-query.
    #[error("vector store unavailable: {0}")]
    VectorStoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
