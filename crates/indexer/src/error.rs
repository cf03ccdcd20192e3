use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("corpus contains no records")]
    CorpusEmpty,

    #[error("an index build is already in progress")]
    BuildInProgress,

    #[error("invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] matcher_vector_store::VectorStoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
