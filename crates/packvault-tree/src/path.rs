//! Path normalization and leaf value classification.

use serde::{Deserialize, Serialize};

/// Canonicalize an attachment path for comparison.
///
/// Backslashes become forward slashes, surrounding whitespace is trimmed and
/// the result is lower-cased. Total and pure: the empty string maps to the
/// empty string. Normalization is lossy and only ever used for matching,
/// never for display or storage.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim().to_lowercase()
}

/// Returns `true` for absolute external URLs (`http://` or `https://`),
/// which are never embedded in a container.
pub fn is_external(value: &str) -> bool {
    let trimmed = value.trim_start();
    let lower = trimmed
        .get(..8)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| trimmed.to_ascii_lowercase());
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// What a leaf value currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// No value, or only whitespace.
    Empty,
    /// An absolute `http(s)://` URL.
    External,
    /// A path relative to the container root.
    Relative,
}

impl ValueKind {
    /// Classify an optional leaf value.
    pub fn of(value: Option<&str>) -> Self {
        match value {
            None => Self::Empty,
            Some(v) if v.trim().is_empty() => Self::Empty,
            Some(v) if is_external(v) => Self::External,
            Some(_) => Self::Relative,
        }
    }
}
