use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use packvault_types::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// One distinct piece of stored content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub hash: ContentHash,
    pub size: u64,
    /// Extension (with leading dot, possibly empty) fixed by the first writer.
    pub extension: String,
    /// Number of metadata rows pointing at this hash.
    pub ref_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ContentRecord {
    /// File name of the blob and of the download reference: `{hash}{ext}`.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.hash.to_hex(), self.extension)
    }
}

/// Hash-indexed reference counts.
///
/// Invariants every implementation upholds:
/// - `put` and `bump` only ever increase a count; `release` is the only
///   decreasing operation and never goes below zero.
/// - The extension of a record never changes after the first `put`.
/// - Every method is atomic with respect to every other method.
pub trait ContentStore: Send + Sync {
    /// Look up a record.
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<ContentRecord>>;

    /// Insert a record with `ref_count = 1`, or increment an existing one.
    ///
    /// For an existing record `size` and `extension` are ignored.
    fn put(&self, hash: &ContentHash, size: u64, extension: &str) -> StoreResult<ContentRecord>;

    /// Increment the count of a known hash and return the new count.
    ///
    /// Returns [`StoreError::NotFound`] for an unknown hash.
    fn bump(&self, hash: &ContentHash) -> StoreResult<i64>;

    /// Decrement the count, floored at zero, and return the new count.
    ///
    /// An unknown hash returns `Ok(0)`. When the result is `<= 0` the caller
    /// must [`remove`](Self::remove) the record and then delete the blob.
    fn release(&self, hash: &ContentHash) -> StoreResult<i64>;

    /// Remove a record whose count is `<= 0`. Referenced records are left
    /// alone and `None` is returned.
    fn remove(&self, hash: &ContentHash) -> StoreResult<Option<ContentRecord>>;

    /// All records, oldest first.
    fn list(&self) -> StoreResult<Vec<ContentRecord>>;

    /// Check whether a record exists.
    fn contains(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.get(hash)?.is_some())
    }
}

/// In-memory, HashMap-based content store.
///
/// All records are held behind a single `RwLock`, so each
/// read-check-write sequence is one critical section.
pub struct InMemoryContentStore {
    records: RwLock<HashMap<ContentHash, ContentRecord>>,
}

impl InMemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild a store from previously listed records.
    pub fn from_records(records: impl IntoIterator<Item = ContentRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.hash, r)).collect()),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all records.
    pub fn total_bytes(&self) -> u64 {
        self.records
            .read()
            .expect("lock poisoned")
            .values()
            .map(|r| r.size)
            .sum()
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<ContentRecord>> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.get(hash).cloned())
    }

    fn put(&self, hash: &ContentHash, size: u64, extension: &str) -> StoreResult<ContentRecord> {
        let mut map = self.records.write().expect("lock poisoned");
        let record = map
            .entry(*hash)
            .and_modify(|r| r.ref_count += 1)
            .or_insert_with(|| ContentRecord {
                hash: *hash,
                size,
                extension: extension.to_string(),
                ref_count: 1,
                created_at: Utc::now(),
            });
        debug!(hash = %hash.short_hex(), ref_count = record.ref_count, "content put");
        Ok(record.clone())
    }

    fn bump(&self, hash: &ContentHash) -> StoreResult<i64> {
        let mut map = self.records.write().expect("lock poisoned");
        let record = map.get_mut(hash).ok_or(StoreError::NotFound(*hash))?;
        record.ref_count += 1;
        debug!(hash = %hash.short_hex(), ref_count = record.ref_count, "content bump");
        Ok(record.ref_count)
    }

    fn release(&self, hash: &ContentHash) -> StoreResult<i64> {
        let mut map = self.records.write().expect("lock poisoned");
        let Some(record) = map.get_mut(hash) else {
            return Ok(0);
        };
        record.ref_count = (record.ref_count - 1).max(0);
        debug!(hash = %hash.short_hex(), ref_count = record.ref_count, "content release");
        Ok(record.ref_count)
    }

    fn remove(&self, hash: &ContentHash) -> StoreResult<Option<ContentRecord>> {
        let mut map = self.records.write().expect("lock poisoned");
        match map.get(hash) {
            Some(record) if record.ref_count <= 0 => Ok(map.remove(hash)),
            _ => Ok(None),
        }
    }

    fn list(&self) -> StoreResult<Vec<ContentRecord>> {
        let map = self.records.read().expect("lock poisoned");
        let mut records: Vec<ContentRecord> = map.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.hash.cmp(&b.hash)));
        Ok(records)
    }
}
