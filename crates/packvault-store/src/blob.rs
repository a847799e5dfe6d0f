use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use packvault_types::ContentHash;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Flat directory of content-addressed blob files.
///
/// Each blob lives at `{root}/{hash}{extension}`, so lookups never scan the
/// directory. Writes go through a temporary file in the same directory and
/// an atomic rename, so concurrent writers of the same content converge on
/// one complete file.
///
/// Clones share one reclaim lock. Counting a reference and writing its blob
/// happen under [`reference_guard`](Self::reference_guard); removing an
/// unreferenced record and deleting its blob happen under
/// [`reclaim_guard`](Self::reclaim_guard). A blob is therefore never
/// deleted out from under a record that was just re-created.
#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
    reclaim: Arc<RwLock<()>>,
}

impl BlobStore {
    /// Open (creating if needed) a blob directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            reclaim: Arc::new(RwLock::new(())),
        })
    }

    /// Shared guard for counting a reference and writing its blob.
    pub fn reference_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.reclaim.read().expect("lock poisoned")
    }

    /// Exclusive guard for removing a record and deleting its blob.
    pub fn reclaim_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.reclaim.write().expect("lock poisoned")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of a blob.
    pub fn blob_path(&self, hash: &ContentHash, extension: &str) -> PathBuf {
        self.root.join(format!("{}{}", hash.to_hex(), extension))
    }

    pub fn exists(&self, hash: &ContentHash, extension: &str) -> bool {
        self.blob_path(hash, extension).is_file()
    }

    /// Write `data` unless the blob is already on disk. Returns `true` if
    /// bytes were written.
    pub fn write_if_absent(
        &self,
        hash: &ContentHash,
        extension: &str,
        data: &[u8],
    ) -> StoreResult<bool> {
        let path = self.blob_path(hash, extension);
        if path.is_file() {
            debug!(hash = %hash.short_hex(), "blob already present");
            return Ok(false);
        }

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| {
            warn!(path = %path.display(), error = %e.error, "blob rename failed");
            StoreError::Io(e.error)
        })?;
        debug!(hash = %hash.short_hex(), bytes = data.len(), "blob written");
        Ok(true)
    }

    /// Read a blob's bytes.
    pub fn read(&self, hash: &ContentHash, extension: &str) -> StoreResult<Vec<u8>> {
        let path = self.blob_path(hash, extension);
        fs::read(&path).map_err(|e| missing_or_io(e, hash, path))
    }

    /// Copy a blob to `dest`, creating parent directories. Returns the number
    /// of bytes copied.
    pub fn copy_to(&self, hash: &ContentHash, extension: &str, dest: &Path) -> StoreResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let path = self.blob_path(hash, extension);
        fs::copy(&path, dest).map_err(|e| missing_or_io(e, hash, path))
    }

    /// Delete a blob. Returns `true` if a file was removed.
    pub fn delete(&self, hash: &ContentHash, extension: &str) -> StoreResult<bool> {
        match fs::remove_file(self.blob_path(hash, extension)) {
            Ok(()) => {
                debug!(hash = %hash.short_hex(), "blob deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn missing_or_io(e: io::Error, hash: &ContentHash, path: PathBuf) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::BlobMissing { hash: *hash, path }
    } else {
        StoreError::Io(e)
    }
}
