//! Foundation types for packvault.
//!
//! Every other packvault crate depends on `packvault-types`.
//!
//! # Key Types
//!
//! - [`Identity`] -- the `(owner, collection, leaf)` tuple addressing one
//!   attachment-bearing leaf inside one document
//! - [`ContentHash`] -- content digest used for deduplicated blob storage
//! - [`FileName`] -- base name split into display name and extension

pub mod error;
pub mod filename;
pub mod hash;
pub mod identity;

pub use error::TypeError;
pub use filename::{file_name, FileName};
pub use hash::ContentHash;
pub use identity::{Identity, FALLBACK_COLLECTION};
