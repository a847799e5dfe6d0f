use std::collections::HashSet;
use std::sync::Arc;

use packvault_store::{
    AttachmentMeta, BlobStore, ContentRecord, ContentStore, InMemoryCatalog, InMemoryContentStore,
    MetadataCatalog, Snapshot,
};
use packvault_tree::{walk, Document};
use packvault_types::{ContentHash, FileName, Identity};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{parse_download_reference, VaultConfig};
use crate::container::Container;
use crate::error::{PipelineError, PipelineResult};
use crate::export::{ExportBundle, ExportSession, Exporter};
use crate::ingest::{IngestReport, Ingestor};

/// Offset/limit window over a listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    /// `None` returns everything after `offset`.
    pub limit: Option<usize>,
}

/// One window of a listing plus the size of the whole listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    fn window(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset)
            .take(request.limit.unwrap_or(usize::MAX))
            .collect();
        Self { items, total }
    }
}

/// Result of [`Vault::delete_attachment`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// No row existed for the identity.
    Missing,
    /// The row is gone; other rows still reference the content.
    Released { meta: AttachmentMeta, ref_count: i64 },
    /// The row was the last reference; content record and blob are gone.
    Reclaimed { meta: AttachmentMeta },
}

/// A downloaded blob with the metadata naming it.
#[derive(Clone, Debug)]
pub struct Download {
    pub meta: AttachmentMeta,
    pub record: ContentRecord,
    pub bytes: Vec<u8>,
}

impl Download {
    /// File name to present to the user: the original name of the first row
    /// with this content.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.meta.name, self.meta.extension)
    }
}

/// Attachment vault: stores, blob directory and configuration behind one
/// handle.
///
/// Pipelines are created per call and share the stores, so a `Vault` can be
/// used from several threads at once.
pub struct Vault {
    config: VaultConfig,
    content: Arc<dyn ContentStore>,
    catalog: Arc<dyn MetadataCatalog>,
    blobs: BlobStore,
}

impl Vault {
    /// Open a vault backed by in-memory stores, restored from the snapshot
    /// at `config.catalog_path` when one exists.
    pub fn open(config: VaultConfig) -> PipelineResult<Self> {
        let (content, catalog) = match Snapshot::load(&config.catalog_path)? {
            Some(snapshot) => {
                info!(
                    path = %config.catalog_path.display(),
                    contents = snapshot.contents.len(),
                    metadata = snapshot.metadata.len(),
                    "snapshot restored"
                );
                snapshot.restore()
            }
            None => (InMemoryContentStore::new(), InMemoryCatalog::new()),
        };
        Self::with_stores(config, Arc::new(content), Arc::new(catalog))
    }

    /// Open a vault over caller-supplied stores.
    pub fn with_stores(
        config: VaultConfig,
        content: Arc<dyn ContentStore>,
        catalog: Arc<dyn MetadataCatalog>,
    ) -> PipelineResult<Self> {
        let blobs = BlobStore::open(&config.blob_root)?;
        Ok(Self {
            config,
            content,
            catalog,
            blobs,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Persist both stores to `config.catalog_path`.
    pub fn save(&self) -> PipelineResult<()> {
        Snapshot::capture(self.content.as_ref(), self.catalog.as_ref())?
            .save(&self.config.catalog_path)?;
        Ok(())
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            Arc::clone(&self.content),
            Arc::clone(&self.catalog),
            self.blobs.clone(),
            self.config.clone(),
        )
    }

    pub fn exporter(&self) -> Exporter {
        Exporter::new(
            Arc::clone(&self.content),
            Arc::clone(&self.catalog),
            self.blobs.clone(),
            self.config.clone(),
        )
    }

    // ---- Pipelines ----

    pub fn ingest(
        &self,
        doc: &mut Document,
        container: &dyn Container,
    ) -> PipelineResult<IngestReport> {
        self.ingestor().ingest(doc, container)
    }

    pub fn export(&self, doc: &mut Document) -> PipelineResult<(ExportBundle, ExportSession)> {
        self.exporter().export(doc)
    }

    /// Drop the row for `identity` and release its content, reclaiming the
    /// blob once nothing references it.
    pub fn delete_attachment(&self, identity: &Identity) -> PipelineResult<DeleteOutcome> {
        let Some(meta) = self.catalog.delete_by_identity(identity)? else {
            return Ok(DeleteOutcome::Missing);
        };

        let ref_count = self.content.release(&meta.hash)?;
        if ref_count > 0 {
            info!(identity = %identity, hash = %meta.hash.short_hex(), ref_count, "attachment released");
            return Ok(DeleteOutcome::Released { meta, ref_count });
        }

        match reclaim(self.content.as_ref(), &self.blobs, &meta.hash)? {
            Some(_) => {
                info!(identity = %identity, hash = %meta.hash.short_hex(), "attachment reclaimed");
                Ok(DeleteOutcome::Reclaimed { meta })
            }
            None => {
                // Re-referenced between release and remove.
                let ref_count = self
                    .content
                    .get(&meta.hash)?
                    .map_or(0, |record| record.ref_count);
                Ok(DeleteOutcome::Released { meta, ref_count })
            }
        }
    }

    // ---- Lookups ----

    /// Bytes and metadata of stored content.
    pub fn download(&self, hash: &ContentHash) -> PipelineResult<Download> {
        let record = self
            .content
            .get(hash)?
            .ok_or_else(|| PipelineError::NotFound(format!("content {hash}")))?;
        let meta = self
            .catalog
            .get_by_hash(hash)?
            .ok_or_else(|| PipelineError::NotFound(format!("metadata for {hash}")))?;
        let bytes = self.blobs.read(hash, &record.extension)?;
        Ok(Download {
            meta,
            record,
            bytes,
        })
    }

    /// [`download`](Self::download) by download reference or `{hash}{ext}`
    /// file name.
    pub fn download_reference(&self, reference: &str) -> PipelineResult<Download> {
        let (hash, _) = parse_download_reference(reference)
            .ok_or_else(|| PipelineError::InvalidReference(reference.to_string()))?;
        self.download(&hash)
    }

    pub fn list_contents(&self, request: PageRequest) -> PipelineResult<Page<ContentRecord>> {
        Ok(Page::window(self.content.list()?, request))
    }

    pub fn list_metadata(&self, request: PageRequest) -> PipelineResult<Page<AttachmentMeta>> {
        Ok(Page::window(self.catalog.list()?, request))
    }

    /// Rows for every attachment `doc` references, one per distinct hash.
    ///
    /// Leaves come first in walk order, then default images. A default
    /// image's row reports the content type and extension its descriptor
    /// declares.
    pub fn attachments_of(&self, doc: &Document) -> PipelineResult<Vec<AttachmentMeta>> {
        let mut identities = Vec::new();
        walk(doc, |ctx, leaf| {
            if leaf.value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                identities.push(ctx.identity(leaf));
            }
        });

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for identity in identities {
            match self.catalog.get_by_identity(&identity)? {
                Some(row) => {
                    if seen.insert(row.hash) {
                        rows.push(row);
                    }
                }
                None => warn!(identity = %identity, "no metadata for leaf"),
            }
        }

        for (_, record, image) in doc.default_images() {
            let Some(mut row) = self.catalog.get_by_identity(&record.default_image_identity())? else {
                continue;
            };
            if !seen.insert(row.hash) {
                continue;
            }
            if let Some(content_type) = image.content_type.as_deref().filter(|c| !c.trim().is_empty()) {
                row.content_type = content_type.to_string();
            }
            let declared = FileName::from_path(image.reference.path());
            if !declared.extension.is_empty() && parse_download_reference(image.reference.path()).is_none() {
                row.extension = declared.extension;
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Remove an unreferenced content record and delete its blob.
///
/// Both steps run under the blob store's reclaim guard, so an ingest that
/// re-creates the record waits and then writes a fresh blob. Returns `None`
/// when the content is referenced again.
pub(crate) fn reclaim(
    content: &dyn ContentStore,
    blobs: &BlobStore,
    hash: &ContentHash,
) -> PipelineResult<Option<ContentRecord>> {
    let _guard = blobs.reclaim_guard();
    let Some(record) = content.remove(hash)? else {
        return Ok(None);
    };
    blobs.delete(hash, &record.extension)?;
    Ok(Some(record))
}
