//! Export: revert download references to container paths and gather the
//! bytes a packager needs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use packvault_store::{AttachmentMeta, BlobStore, ContentStore, MetadataCatalog};
use packvault_tree::{
    is_external, set_target_value, walk, walk_mut, Document, LeafTarget, ValueKind,
};
use packvault_types::Identity;
use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{parse_download_reference, VaultConfig};
use crate::container::{part_key, Attachment};
use crate::error::{PipelineError, PipelineResult};

/// Download reference → metadata rows still to be reverted, in walk order.
#[derive(Debug, Default)]
pub struct ExportIndex {
    queues: HashMap<String, VecDeque<AttachmentMeta>>,
}

impl ExportIndex {
    /// Index every leaf holding an external reference that the catalog
    /// knows, by the leaf's structural identity or, failing that, by the
    /// hash embedded in the reference.
    pub fn build(doc: &Document, catalog: &dyn MetadataCatalog) -> PipelineResult<Self> {
        let mut leaves: Vec<(String, Identity)> = Vec::new();
        walk(doc, |ctx, leaf| {
            if let Some(value) = leaf.value.as_deref() {
                if is_external(value) {
                    leaves.push((value.trim().to_string(), ctx.identity(leaf)));
                }
            }
        });

        let mut queues: HashMap<String, VecDeque<AttachmentMeta>> = HashMap::new();
        for (url, identity) in leaves {
            let row = match catalog.get_by_identity(&identity)? {
                Some(row) => Some(row),
                None => match parse_download_reference(&url) {
                    Some((hash, _)) => catalog.get_by_hash(&hash)?,
                    None => None,
                },
            };
            match row {
                Some(row) => queues.entry(url).or_default().push_back(row),
                None => debug!(url = %url, identity = %identity, "external reference not in catalog"),
            }
        }
        Ok(Self { queues })
    }

    /// Next row for `url`.
    pub fn pop(&mut self, url: &str) -> Option<AttachmentMeta> {
        self.queues.get_mut(url.trim())?.pop_front()
    }

    /// Rows still queued across all references.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request-scoped state of one export: its id, its private working
/// directory and its reference index.
///
/// The working directory lives under the configured work root and is
/// removed when the session is dropped.
#[derive(Debug)]
pub struct ExportSession {
    id: Uuid,
    work_dir: TempDir,
    index: ExportIndex,
}

impl ExportSession {
    pub fn create(work_root: &Path, index: ExportIndex) -> PipelineResult<Self> {
        fs::create_dir_all(work_root)?;
        let id = Uuid::now_v7();
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("export-{id}-"))
            .tempdir_in(work_root)?;
        debug!(session = %id, dir = %work_dir.path().display(), "export session created");
        Ok(Self {
            id,
            work_dir,
            index,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn index(&self) -> &ExportIndex {
        &self.index
    }
}

/// Summary of one export call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExportReport {
    pub session: Uuid,
    /// Values reverted from a download reference to a container path.
    pub reverted: usize,
    /// External references with no catalog row left to revert to.
    pub unresolved: usize,
    /// References whose blob could not be materialized.
    pub failed: usize,
    pub attachments: usize,
}

/// Everything a [`ContainerWriter`](crate::ContainerWriter) needs besides
/// the document itself.
#[derive(Clone, Debug)]
pub struct ExportBundle {
    pub attachments: Vec<Attachment>,
    pub report: ExportReport,
}

/// Export pipeline over shared stores.
pub struct Exporter {
    content: Arc<dyn ContentStore>,
    catalog: Arc<dyn MetadataCatalog>,
    blobs: BlobStore,
    config: VaultConfig,
}

impl Exporter {
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
            config,
        }
    }

    /// Revert `doc` in place and collect its attachments.
    ///
    /// The returned session owns the working directory the attachments were
    /// staged in; keep it alive as long as those files are needed.
    pub fn export(&self, doc: &mut Document) -> PipelineResult<(ExportBundle, ExportSession)> {
        let index = ExportIndex::build(doc, self.catalog.as_ref())?;
        let mut session = ExportSession::create(&self.config.work_root, index)?;
        let mut report = ExportReport {
            session: session.id,
            ..ExportReport::default()
        };
        let mut attachments = Vec::new();
        let mut staged = HashSet::new();

        // Default images first.
        let images: Vec<(usize, Identity, Option<String>)> = doc
            .default_images()
            .filter(|(_, _, img)| is_external(img.reference.path()))
            .map(|(i, record, img)| (i, record.default_image_identity(), img.content_type.clone()))
            .collect();
        for (record, identity, declared_type) in images {
            let Some(row) = self.catalog.get_by_identity(&identity)? else {
                warn!(identity = %identity, "default image not in catalog");
                report.unresolved += 1;
                continue;
            };
            let staged_file = self
                .materialize(session.work_dir(), &row)
                .and_then(|file| Ok(fs::read(file)?));
            match staged_file {
                Ok(bytes) => {
                    set_target_value(doc, &LeafTarget::DefaultImage { record }, &row.original_path);
                    report.reverted += 1;
                    let fresh = part_key(&row.original_path).is_some_and(|key| staged.insert(key));
                    if fresh {
                        attachments.push(Attachment {
                            path: row.original_path.clone(),
                            bytes,
                            content_type: non_blank(declared_type).unwrap_or(row.content_type),
                        });
                    }
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "cannot stage default image");
                    report.failed += 1;
                }
            }
        }

        // Leaves in walk order.
        let work_dir = session.work_dir.path().to_path_buf();
        walk_mut(doc, |ctx, leaf| {
            let url = match leaf.value.as_deref() {
                Some(value) if is_external(value) => value.trim().to_string(),
                _ => return,
            };
            let Some(row) = session.index.pop(&url) else {
                warn!(url = %url, identity = %ctx.identity(leaf), "no catalog row left for reference");
                report.unresolved += 1;
                return;
            };
            match self.materialize(&work_dir, &row) {
                Ok(_) => {
                    leaf.value = Some(row.original_path);
                    report.reverted += 1;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "cannot stage attachment");
                    report.failed += 1;
                }
            }
        });

        // Collect staged bytes, first occurrence of each part wins.
        walk(doc, |_, leaf| {
            let Some(value) = leaf.value.as_deref() else {
                return;
            };
            if ValueKind::of(Some(value)) != ValueKind::Relative {
                return;
            }
            let Some(rel) = part_key(value) else {
                return;
            };
            let file = work_dir.join(&rel);
            if !file.is_file() || staged.contains(&rel) {
                return;
            }
            match fs::read(&file) {
                Ok(bytes) => {
                    staged.insert(rel);
                    attachments.push(Attachment {
                        path: value.trim().to_string(),
                        bytes,
                        content_type: non_blank(leaf.content_type.clone())
                            .unwrap_or_else(|| self.config.default_content_type.clone()),
                    });
                }
                Err(e) => warn!(path = %file.display(), error = %e, "cannot read staged attachment"),
            }
        });

        report.attachments = attachments.len();
        info!(
            session = %report.session,
            reverted = report.reverted,
            unresolved = report.unresolved,
            failed = report.failed,
            attachments = report.attachments,
            "export complete"
        );
        Ok((ExportBundle { attachments, report }, session))
    }

    /// Copy a row's blob to its original path under `work_dir`.
    fn materialize(&self, work_dir: &Path, row: &AttachmentMeta) -> PipelineResult<PathBuf> {
        let rel = part_key(&row.original_path)
            .ok_or_else(|| PipelineError::UnsafePath(row.original_path.clone()))?;
        let dest = work_dir.join(rel);
        let extension = match self.content.get(&row.hash)? {
            Some(record) => record.extension,
            None => row.extension.clone(),
        };
        self.blobs.copy_to(&row.hash, &extension, &dest)?;
        Ok(dest)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
