use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::catalog::{AttachmentMeta, InMemoryCatalog, MetadataCatalog};
use crate::content::{ContentRecord, ContentStore, InMemoryContentStore};
use crate::error::{StoreError, StoreResult};

const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time JSON image of a content store and a catalog.
///
/// Saved atomically (temporary file + rename) so a crash mid-save leaves the
/// previous snapshot intact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub contents: Vec<ContentRecord>,
    pub metadata: Vec<AttachmentMeta>,
}

impl Snapshot {
    /// Capture both stores.
    pub fn capture(
        content: &dyn ContentStore,
        catalog: &dyn MetadataCatalog,
    ) -> StoreResult<Self> {
        Ok(Self {
            version: SNAPSHOT_VERSION,
            contents: content.list()?,
            metadata: catalog.list()?,
        })
    }

    /// Load a snapshot. A missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> StoreResult<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Self = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    /// Write the snapshot to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        info!(
            path = %path.display(),
            contents = self.contents.len(),
            metadata = self.metadata.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Rebuild in-memory stores from this snapshot.
    pub fn restore(self) -> (InMemoryContentStore, InMemoryCatalog) {
        (
            InMemoryContentStore::from_records(self.contents),
            InMemoryCatalog::from_rows(self.metadata),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use packvault_types::{ContentHash, Identity};

    use super::*;

    fn populated() -> (InMemoryContentStore, InMemoryCatalog) {
        let content = InMemoryContentStore::new();
        let catalog = InMemoryCatalog::new();
        let hash = ContentHash::from_digest([1; 32]);
        content.put(&hash, 3, ".png").unwrap();
        catalog
            .upsert_if_absent(AttachmentMeta {
                identity: Identity::new("aas", "sm", "Logo"),
                hash,
                name: "logo".into(),
                extension: ".png".into(),
                content_type: "image/png".into(),
                original_path: "img/logo.png".into(),
                created_at: Utc::now(),
            })
            .unwrap();
        (content, catalog)
    }

    #[test]
    fn save_load_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/catalog.json");
        let (content, catalog) = populated();

        let snapshot = Snapshot::capture(&content, &catalog).unwrap();
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        let (content2, catalog2) = loaded.restore();
        assert_eq!(content2.list().unwrap(), content.list().unwrap());
        assert_eq!(catalog2.list().unwrap(), catalog.list().unwrap());
    }

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Snapshot::load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            Snapshot::load(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
