use thiserror::Error;

/// Errors from composite-key resolution.
///
/// Only structural absence is an error; every other lookup miss degrades to
/// a fallback identity instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The document has no top-level owner record, so no identity (not even
    /// a fallback) can be formed.
    #[error("document has no owner record")]
    NoOwnerRecord,
}

/// Convenience alias for resolution results.
pub type ResolveResult<T> = Result<T, ResolveError>;
