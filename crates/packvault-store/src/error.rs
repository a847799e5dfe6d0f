use std::path::PathBuf;

use packvault_types::ContentHash;

/// Errors from content, blob and catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No content record exists for the hash.
    #[error("content not found: {0}")]
    NotFound(ContentHash),

    /// A content record exists but its blob file is missing.
    #[error("blob missing for {hash} at {}", path.display())]
    BlobMissing { hash: ContentHash, path: PathBuf },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
