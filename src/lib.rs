use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultfindError>;

#[derive(Error, Debug)]
pub enum VaultfindError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vault path unreachable: {0}")]
    VaultUnreachable(String),

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingMismatch { expected: usize, actual: usize },

    #[error("Vector store error: {0}")]
    StoreUnavailable(String),

    #[error("Document not indexed: {0}")]
    DocumentNotIndexed(String),

    #[error("Indexing is already in progress")]
    IndexingBusy,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod api;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod embedding;
pub mod indexer;
pub mod logging;
pub mod markdown;
pub mod store;
pub mod watcher;

#[doc(hidden)]
pub mod test_support;
