use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("top_k must be positive (got {0})")]
    InvalidTopK(i64),

    #[error("index not built")]
    IndexNotBuilt,

    #[error("Vector store error: {0}")]
    VectorStore(#[from] matcher_vector_store::VectorStoreError),
}
