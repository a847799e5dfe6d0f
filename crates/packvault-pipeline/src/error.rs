use packvault_store::StoreError;
use packvault_tree::ResolveError;
use packvault_types::{ContentHash, Identity};
use thiserror::Error;

/// Errors from container readers and writers.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("part not found: {0}")]
    PartNotFound(String),

    /// The part path is empty or escapes the container root.
    #[error("invalid part path: {0:?}")]
    InvalidPartPath(String),

    #[error("container has no {0} part")]
    MissingDocument(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ContainerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors from the attachment pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document cannot be processed at all.
    #[error("fatal precondition: {0}")]
    FatalPrecondition(#[from] ResolveError),

    /// An identity already has a row bound to different content.
    #[error("identity {identity} already bound to {existing}, refusing {incoming}")]
    IdentityConflict {
        identity: Identity,
        existing: ContentHash,
        incoming: ContentHash,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid download reference: {0}")]
    InvalidReference(String),

    /// A stored original path cannot be materialized under the working
    /// directory.
    #[error("unsafe attachment path: {0:?}")]
    UnsafePath(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
