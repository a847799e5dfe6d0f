use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use packvault_types::{ContentHash, Identity};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreResult;

/// Per-identity attachment metadata row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub identity: Identity,
    pub hash: ContentHash,
    /// File name without extension.
    pub name: String,
    /// Extension with leading dot, or empty.
    pub extension: String,
    pub content_type: String,
    /// Container-relative path the attachment was ingested from.
    pub original_path: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`MetadataCatalog::upsert_if_absent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// The row was new and has been stored.
    Inserted,
    /// A row for the identity already existed; nothing was written.
    Existing(AttachmentMeta),
}

/// Identity-indexed attachment metadata.
pub trait MetadataCatalog: Send + Sync {
    fn get_by_identity(&self, identity: &Identity) -> StoreResult<Option<AttachmentMeta>>;

    /// Insert `meta` unless its identity already has a row. Check and insert
    /// happen atomically.
    fn upsert_if_absent(&self, meta: AttachmentMeta) -> StoreResult<Upsert>;

    /// Remove and return the row for `identity`.
    fn delete_by_identity(&self, identity: &Identity) -> StoreResult<Option<AttachmentMeta>>;

    /// First row (in identity order) carrying `hash`.
    fn get_by_hash(&self, hash: &ContentHash) -> StoreResult<Option<AttachmentMeta>>;

    /// Number of rows carrying `hash`.
    fn count_by_hash(&self, hash: &ContentHash) -> StoreResult<usize>;

    /// Overwrite content type and extension of an existing row. Returns
    /// `false` if the row does not exist or already holds those values.
    fn backfill(
        &self,
        identity: &Identity,
        content_type: &str,
        extension: &str,
    ) -> StoreResult<bool>;

    /// All rows in identity order.
    fn list(&self) -> StoreResult<Vec<AttachmentMeta>>;
}

/// In-memory catalog backed by an identity-ordered `BTreeMap`.
pub struct InMemoryCatalog {
    rows: RwLock<BTreeMap<Identity, AttachmentMeta>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuild a catalog from previously listed rows.
    pub fn from_rows(rows: impl IntoIterator<Item = AttachmentMeta>) -> Self {
        Self {
            rows: RwLock::new(rows.into_iter().map(|m| (m.identity.clone(), m)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCatalog for InMemoryCatalog {
    fn get_by_identity(&self, identity: &Identity) -> StoreResult<Option<AttachmentMeta>> {
        let rows = self.rows.read().expect("lock poisoned");
        Ok(rows.get(identity).cloned())
    }

    fn upsert_if_absent(&self, meta: AttachmentMeta) -> StoreResult<Upsert> {
        let mut rows = self.rows.write().expect("lock poisoned");
        if let Some(existing) = rows.get(&meta.identity) {
            return Ok(Upsert::Existing(existing.clone()));
        }
        debug!(identity = %meta.identity, hash = %meta.hash.short_hex(), "metadata inserted");
        rows.insert(meta.identity.clone(), meta);
        Ok(Upsert::Inserted)
    }

    fn delete_by_identity(&self, identity: &Identity) -> StoreResult<Option<AttachmentMeta>> {
        let mut rows = self.rows.write().expect("lock poisoned");
        Ok(rows.remove(identity))
    }

    fn get_by_hash(&self, hash: &ContentHash) -> StoreResult<Option<AttachmentMeta>> {
        let rows = self.rows.read().expect("lock poisoned");
        Ok(rows.values().find(|m| m.hash == *hash).cloned())
    }

    fn count_by_hash(&self, hash: &ContentHash) -> StoreResult<usize> {
        let rows = self.rows.read().expect("lock poisoned");
        Ok(rows.values().filter(|m| m.hash == *hash).count())
    }

    fn backfill(
        &self,
        identity: &Identity,
        content_type: &str,
        extension: &str,
    ) -> StoreResult<bool> {
        let mut rows = self.rows.write().expect("lock poisoned");
        let Some(row) = rows.get_mut(identity) else {
            return Ok(false);
        };
        if row.content_type == content_type && row.extension == extension {
            return Ok(false);
        }
        row.content_type = content_type.to_string();
        row.extension = extension.to_string();
        debug!(identity = %identity, content_type, extension, "metadata backfilled");
        Ok(true)
    }

    fn list(&self) -> StoreResult<Vec<AttachmentMeta>> {
        let rows = self.rows.read().expect("lock poisoned");
        Ok(rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn meta(leaf: &str, hash: u8) -> AttachmentMeta {
        AttachmentMeta {
            identity: Identity::new("aas", "sm", leaf),
            hash: ContentHash::from_digest([hash; 32]),
            name: leaf.to_lowercase(),
            extension: ".pdf".into(),
            content_type: "application/pdf".into(),
            original_path: format!("docs/{}.pdf", leaf.to_lowercase()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_inserts_once() {
        let catalog = InMemoryCatalog::new();
        assert_eq!(catalog.upsert_if_absent(meta("A", 1)).unwrap(), Upsert::Inserted);
        match catalog.upsert_if_absent(meta("A", 2)).unwrap() {
            Upsert::Existing(row) => assert_eq!(row.hash, ContentHash::from_digest([1; 32])),
            Upsert::Inserted => panic!("second upsert must not insert"),
        }
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn delete_returns_row() {
        let catalog = InMemoryCatalog::new();
        catalog.upsert_if_absent(meta("A", 1)).unwrap();
        let id = Identity::new("aas", "sm", "A");
        let deleted = catalog.delete_by_identity(&id).unwrap().unwrap();
        assert_eq!(deleted.name, "a");
        assert!(catalog.delete_by_identity(&id).unwrap().is_none());
        assert!(catalog.get_by_identity(&id).unwrap().is_none());
    }

    #[test]
    fn hash_lookups() {
        let catalog = InMemoryCatalog::new();
        catalog.upsert_if_absent(meta("B", 1)).unwrap();
        catalog.upsert_if_absent(meta("A", 1)).unwrap();
        catalog.upsert_if_absent(meta("C", 2)).unwrap();
        let h1 = ContentHash::from_digest([1; 32]);
        assert_eq!(catalog.count_by_hash(&h1).unwrap(), 2);
        assert_eq!(catalog.get_by_hash(&h1).unwrap().unwrap().identity.leaf_id, "A");
        assert!(catalog
            .get_by_hash(&ContentHash::from_digest([9; 32]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn backfill_changes_existing_rows_only() {
        let catalog = InMemoryCatalog::new();
        let id = Identity::new("aas", "sm", "A");
        assert!(!catalog.backfill(&id, "image/png", ".png").unwrap());
        catalog.upsert_if_absent(meta("A", 1)).unwrap();
        assert!(catalog.backfill(&id, "image/png", ".png").unwrap());
        assert!(!catalog.backfill(&id, "image/png", ".png").unwrap());
        let row = catalog.get_by_identity(&id).unwrap().unwrap();
        assert_eq!(row.content_type, "image/png");
        assert_eq!(row.extension, ".png");
    }

    #[test]
    fn list_is_identity_ordered() {
        let catalog = InMemoryCatalog::from_rows([meta("C", 1), meta("A", 2), meta("B", 3)]);
        let leaves: Vec<_> = catalog
            .list()
            .unwrap()
            .into_iter()
            .map(|m| m.identity.leaf_id)
            .collect();
        assert_eq!(leaves, vec!["A", "B", "C"]);
    }

    #[test]
    fn concurrent_upserts_insert_exactly_once() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                thread::spawn(move || {
                    matches!(catalog.upsert_if_absent(meta("A", 1)).unwrap(), Upsert::Inserted)
                })
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(catalog.len(), 1);
    }
}
