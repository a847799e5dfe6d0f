//! Attachment lifecycle pipelines for packvault.
//!
//! Ties the document tree, the content store and the metadata catalog
//! together:
//!
//! - [`Ingestor`] -- hashes a container's attachments into the store and
//!   rewrites the document's references to download URLs
//! - [`Exporter`] -- reverts download URLs to container paths and stages the
//!   bytes for packaging
//! - [`Vault::delete_attachment`] -- releases one attachment, reclaiming the
//!   blob when nothing else references it
//!
//! [`Vault`] owns the stores and hands out pipelines that share them.
//!
//! # Quick Start
//!
//! ```rust
//! use packvault_pipeline::{MemoryContainer, Vault, VaultConfig};
//! use packvault_tree::{AttachmentLeaf, Collection, Document, Node, OwnerRecord};
//!
//! let root = tempfile::tempdir().unwrap();
//! let vault = Vault::open(VaultConfig::rooted(root.path())).unwrap();
//!
//! let mut doc = Document {
//!     records: vec![OwnerRecord::new("asset")],
//!     collections: vec![Collection {
//!         id: "docs".into(),
//!         children: vec![Node::Attachment(AttachmentLeaf::new(
//!             "Logo",
//!             "img/logo.png",
//!             "image/png",
//!         ))],
//!     }],
//! };
//! let container = MemoryContainer::new()
//!     .with_part("img/logo.png", b"PNG".to_vec())
//!     .unwrap();
//!
//! let report = vault.ingest(&mut doc, &container).unwrap();
//! assert_eq!(report.rewritten, 1);
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod export;
pub mod ingest;
pub mod vault;

pub use config::{parse_download_reference, VaultConfig};
pub use container::{
    load_document, part_key, Attachment, Container, ContainerReader, ContainerWriter,
    DirectoryContainer, DirectoryWriter, MemoryContainer, PackageReader, PackageWriter,
    DOCUMENT_PART,
};
pub use error::{ContainerError, ContainerResult, PipelineError, PipelineResult};
pub use export::{ExportBundle, ExportIndex, ExportReport, ExportSession, Exporter};
pub use ingest::{IngestItem, IngestReport, Ingestor, ItemOutcome};
pub use vault::{DeleteOutcome, Download, Page, PageRequest, Vault};
