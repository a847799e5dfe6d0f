//! Storage backends for packvault.
//!
//! Two independent indexes back every attachment:
//!
//! - [`ContentStore`] -- one [`ContentRecord`] per distinct content hash, with
//!   a reference count equal to the number of metadata rows pointing at it.
//! - [`MetadataCatalog`] -- one [`AttachmentMeta`] row per attachment
//!   identity.
//!
//! Physical bytes live in a [`BlobStore`] directory, one file per hash, named
//! `{hash}{extension}`. Bytes exist on disk exactly while the hash's
//! reference count is above zero.
//!
//! The in-memory implementations hold every read-check-write sequence under a
//! single lock and can be persisted with [`Snapshot`].

pub mod blob;
pub mod catalog;
pub mod content;
pub mod error;
pub mod snapshot;

pub use blob::BlobStore;
pub use catalog::{AttachmentMeta, InMemoryCatalog, MetadataCatalog, Upsert};
pub use content::{ContentRecord, ContentStore, InMemoryContentStore};
pub use error::{StoreError, StoreResult};
pub use snapshot::Snapshot;
