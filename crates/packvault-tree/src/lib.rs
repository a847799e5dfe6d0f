//! Asset-model document tree for packvault.
//!
//! A [`Document`] is a set of top-level owner records plus the collections
//! they own. Collections nest arbitrarily; attachment leaves carry a string
//! value that is empty, an external URL, or a path inside the surrounding
//! container.
//!
//! # Modules
//!
//! - [`path`] -- path normalization and value classification
//! - [`model`] -- the document tree itself
//! - [`walk`] -- depth-first traversal in declaration order
//! - [`resolve`] -- composite-key resolution from a path to its owning leaf
//! - [`rewrite`] -- in-place leaf value rewriting
//!
//! # Ordering
//!
//! Traversal order is part of the contract: leaves are always visited in
//! document declaration order. Identity assignment for duplicate paths is
//! first-come-first-served on that order, so two walks of the same tree must
//! agree.

pub mod error;
pub mod model;
pub mod path;
pub mod resolve;
pub mod rewrite;
pub mod walk;

pub use error::{ResolveError, ResolveResult};
pub use model::{
    AttachmentLeaf, Collection, DefaultImage, Document, Element, ImageRef, Node, OwnerRecord,
    DEFAULT_IMAGE_LEAF,
};
pub use path::{is_external, normalize, ValueKind};
pub use resolve::{
    collect_identities, content_type_of, resolve_one, FallbackCollision, FallbackTracker,
    IdentityQueues, LeafTarget, Resolution,
};
pub use rewrite::{rewrite_matching, set_target_value, target_value};
pub use walk::{referenced_paths, walk, walk_mut, LeafContext, NodeLocation};
