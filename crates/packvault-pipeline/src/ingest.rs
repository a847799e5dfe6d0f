//! Ingest: move a document's embedded attachments into the store and point
//! its leaves at download references.
//!
//! Per candidate the pipeline runs
//! `extract → resolve → hash → upsert metadata → persist blob → rewrite`.
//! A failure on one candidate is logged and counted; the rest continue.
//! Only a document without owner records aborts the whole call.

use std::sync::Arc;

use chrono::Utc;
use packvault_crypto::{ContentHasher, Digest};
use packvault_store::{
    AttachmentMeta, BlobStore, ContentRecord, ContentStore, MetadataCatalog, StoreError, Upsert,
};
use packvault_tree::{
    content_type_of, is_external, rewrite_matching, set_target_value, Document, FallbackCollision,
    FallbackTracker, IdentityQueues, LeafTarget, Resolution,
};
use packvault_types::{ContentHash, FileName, Identity};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::container::Container;
use crate::error::{PipelineError, PipelineResult};
use crate::vault::reclaim;

/// Summary of one ingest call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IngestReport {
    /// Candidate paths the container offered.
    pub candidates: usize,
    /// Leaf or default-image values rewritten to download references.
    pub rewritten: usize,
    /// Candidates dropped because of a read, store or conflict failure.
    pub skipped: usize,
    /// Candidates that resolved to a fallback identity.
    pub degraded: usize,
    /// Candidates whose bytes were already on disk.
    pub deduplicated: usize,
    pub items: Vec<IngestItem>,
    pub collisions: Vec<FallbackCollision>,
}

/// Per-candidate outcome.
#[derive(Clone, Debug, Serialize)]
pub struct IngestItem {
    pub path: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Stored {
        identity: Identity,
        hash: ContentHash,
        url: String,
        /// A metadata row was created by this call.
        new_row: bool,
        degraded: bool,
        deduplicated: bool,
    },
    Skipped {
        reason: String,
    },
}

/// Ingest pipeline over shared stores.
pub struct Ingestor {
    content: Arc<dyn ContentStore>,
    catalog: Arc<dyn MetadataCatalog>,
    blobs: BlobStore,
    digest: Arc<dyn Digest>,
    config: VaultConfig,
}

/// What [`Ingestor::store_one`] did for one candidate.
struct Stored {
    record: ContentRecord,
    new_row: bool,
    deduplicated: bool,
}

impl Ingestor {
    pub fn new(
        content: Arc<dyn ContentStore>,
        catalog: Arc<dyn MetadataCatalog>,
        blobs: BlobStore,
        config: VaultConfig,
    ) -> Self {
        Self {
            content,
            catalog,
            blobs,
            digest: Arc::new(ContentHasher::ATTACHMENT),
            config,
        }
    }

    /// Replace the digest used to address content.
    pub fn with_digest(mut self, digest: Arc<dyn Digest>) -> Self {
        self.digest = digest;
        self
    }

    /// Ingest every attachment `doc` references from `container`, rewriting
    /// the referencing values in place.
    pub fn ingest(&self, doc: &mut Document, container: &dyn Container) -> PipelineResult<IngestReport> {
        let mut report = IngestReport::default();

        // Extract
        let mut loaded: Vec<(String, Vec<u8>)> = Vec::new();
        for path in container.candidate_paths(doc) {
            if is_external(&path) {
                continue;
            }
            report.candidates += 1;
            match container.read_part(&path) {
                Ok(bytes) => loaded.push((path, bytes)),
                Err(e) => {
                    warn!(path = %path, error = %e, "cannot read attachment, skipping");
                    report.skip(path, e.to_string());
                }
            }
        }
        if loaded.is_empty() {
            info!(candidates = report.candidates, "nothing to ingest");
            return Ok(report);
        }

        // Resolve against the document as received; rewrites land in `doc`.
        let source = doc.clone();
        let mut queues = IdentityQueues::build(&source, loaded.iter().map(|(p, _)| p.as_str()))?;
        let mut tracker = FallbackTracker::new();

        for (path, bytes) in loaded {
            let resolution = queues.claim(&source, &path)?;
            if resolution.degraded {
                report.degraded += 1;
                warn!(path = %path, identity = %resolution.identity, "degraded resolution");
                tracker.record(&resolution.identity, &path);
            }

            match self.store_one(&source, &path, &bytes, &resolution) {
                Ok(stored) => {
                    let url = self.config.download_url(&stored.record.file_name());
                    report.rewritten += rewrite(doc, &resolution.target, &path, &url);
                    if stored.deduplicated {
                        report.deduplicated += 1;
                    }
                    report.items.push(IngestItem {
                        path,
                        outcome: ItemOutcome::Stored {
                            identity: resolution.identity,
                            hash: stored.record.hash,
                            url,
                            new_row: stored.new_row,
                            degraded: resolution.degraded,
                            deduplicated: stored.deduplicated,
                        },
                    });
                }
                Err(e) => {
                    warn!(path = %path, identity = %resolution.identity, error = %e, "attachment skipped");
                    report.skip(path, e.to_string());
                }
            }
        }

        report.collisions = tracker.into_collisions();
        info!(
            candidates = report.candidates,
            rewritten = report.rewritten,
            skipped = report.skipped,
            degraded = report.degraded,
            deduplicated = report.deduplicated,
            "ingest complete"
        );
        Ok(report)
    }

    fn store_one(
        &self,
        doc: &Document,
        path: &str,
        bytes: &[u8],
        resolution: &Resolution,
    ) -> PipelineResult<Stored> {
        let hash = self.digest.digest(bytes);
        let file = FileName::from_path(path);
        let content_type = content_type_of(doc, path)
            .unwrap_or_else(|| self.config.default_content_type.clone());
        let identity = &resolution.identity;

        let meta = AttachmentMeta {
            identity: identity.clone(),
            hash,
            name: file.name.clone(),
            extension: file.extension.clone(),
            content_type: content_type.clone(),
            original_path: path.to_string(),
            created_at: Utc::now(),
        };

        match self.catalog.upsert_if_absent(meta)? {
            Upsert::Existing(row) if row.hash != hash => Err(PipelineError::IdentityConflict {
                identity: identity.clone(),
                existing: row.hash,
                incoming: hash,
            }),
            Upsert::Existing(row) => {
                if matches!(resolution.target, LeafTarget::DefaultImage { .. })
                    && self
                        .catalog
                        .backfill(identity, &content_type, &file.extension)?
                {
                    debug!(identity = %identity, "default image metadata backfilled");
                }
                let _guard = self.blobs.reference_guard();
                let record = match self.content.get(&hash)? {
                    Some(record) => record,
                    None => {
                        warn!(identity = %identity, hash = %hash.short_hex(), "row without content record, restoring count");
                        self.content.put(&hash, bytes.len() as u64, &row.extension)?
                    }
                };
                let written = self.blobs.write_if_absent(&hash, &record.extension, bytes)?;
                Ok(Stored {
                    record,
                    new_row: false,
                    deduplicated: !written,
                })
            }
            Upsert::Inserted => {
                let guard = self.blobs.reference_guard();
                let record = match self.count_new_row(&hash, bytes.len() as u64, &file.extension) {
                    Ok(record) => record,
                    Err(e) => {
                        drop(guard);
                        self.drop_row(identity);
                        return Err(e);
                    }
                };
                let written = self.blobs.write_if_absent(&hash, &record.extension, bytes);
                drop(guard);
                match written {
                    Ok(written) => Ok(Stored {
                        record,
                        new_row: true,
                        deduplicated: !written,
                    }),
                    Err(e) => {
                        self.drop_row(identity);
                        self.release_count(&hash);
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// Count a freshly inserted row against its content: `bump` for known
    /// content, `put` for new content.
    fn count_new_row(
        &self,
        hash: &ContentHash,
        size: u64,
        extension: &str,
    ) -> PipelineResult<ContentRecord> {
        match self.content.bump(hash) {
            Ok(count) => {
                debug!(hash = %hash.short_hex(), ref_count = count, "known content referenced");
                Ok(self
                    .content
                    .get(hash)?
                    .ok_or(StoreError::NotFound(*hash))?)
            }
            Err(StoreError::NotFound(_)) => Ok(self.content.put(hash, size, extension)?),
            Err(e) => Err(e.into()),
        }
    }

    fn drop_row(&self, identity: &Identity) {
        if let Err(e) = self.catalog.delete_by_identity(identity) {
            warn!(identity = %identity, error = %e, "cannot remove row of failed attachment");
        }
    }

    fn release_count(&self, hash: &ContentHash) {
        let result = (|| -> PipelineResult<()> {
            if self.content.release(hash)? <= 0 {
                reclaim(self.content.as_ref(), &self.blobs, hash)?;
            }
            Ok(())
        })();
        if let Err(e) = result {
            warn!(hash = %hash.short_hex(), error = %e, "cannot release count of failed attachment");
        }
    }
}

/// Point the value(s) behind `target` at `url`. Returns how many changed.
fn rewrite(doc: &mut Document, target: &LeafTarget, original: &str, url: &str) -> usize {
    match target {
        LeafTarget::Unlocated => rewrite_matching(doc, original, url),
        located => usize::from(set_target_value(doc, located, url)),
    }
}

impl IngestReport {
    fn skip(&mut self, path: String, reason: String) {
        self.skipped += 1;
        self.items.push(IngestItem {
            path,
            outcome: ItemOutcome::Skipped { reason },
        });
    }
}
