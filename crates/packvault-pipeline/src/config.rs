use std::fs;
use std::path::{Path, PathBuf};

use packvault_types::{file_name, ContentHash};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Runtime configuration of a [`Vault`](crate::Vault).
///
/// Every field has a default, so a TOML file only needs to name what it
/// overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding `{hash}{extension}` blob files.
    pub blob_root: PathBuf,
    /// Parent of the per-export working directories.
    pub work_root: PathBuf,
    /// JSON snapshot of the content store and metadata catalog.
    pub catalog_path: PathBuf,
    /// Scheme, host and port prefix of download references.
    pub download_base_url: String,
    /// Route between the base URL and `/{hash}{extension}`.
    pub download_route: String,
    /// Content type recorded when a document declares none.
    pub default_content_type: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::rooted(Path::new("packvault-data"))
    }
}

impl VaultConfig {
    /// Defaults with every storage path placed under `root`.
    pub fn rooted(root: &Path) -> Self {
        Self {
            blob_root: root.join("blobs"),
            work_root: root.join("work"),
            catalog_path: root.join("catalog.json"),
            download_base_url: "http://localhost:8080".into(),
            download_route: "/api/transformer/download".into(),
            default_content_type: "application/octet-stream".into(),
        }
    }

    /// Move every storage path under `root`, keeping the other settings.
    pub fn with_root(self, root: &Path) -> Self {
        let rooted = Self::rooted(root);
        Self {
            blob_root: rooted.blob_root,
            work_root: rooted.work_root,
            catalog_path: rooted.catalog_path,
            ..self
        }
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> PipelineResult<Self> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Download reference for a blob file name.
    pub fn download_url(&self, file_name: &str) -> String {
        let base = self.download_base_url.trim_end_matches('/');
        match self.download_route.trim_matches('/') {
            "" => format!("{base}/{file_name}"),
            route => format!("{base}/{route}/{file_name}"),
        }
    }
}

/// Extract `(hash, extension)` from a download reference.
///
/// Only the last path segment is inspected, so any base URL and route are
/// accepted. Query strings and fragments are ignored.
pub fn parse_download_reference(reference: &str) -> Option<(ContentHash, String)> {
    let name = file_name(reference.trim()).split(['?', '#']).next()?;
    let stem = name.get(..ContentHash::HEX_LEN)?;
    let hash = ContentHash::from_hex(stem).ok()?;
    let extension = &name[ContentHash::HEX_LEN..];
    if !extension.is_empty() && !extension.starts_with('.') {
        return None;
    }
    Some((hash, extension.to_string()))
}
