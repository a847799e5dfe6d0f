//! Content digests for packvault.
//!
//! The pipelines only ever see the [`Digest`] trait; [`ContentHasher`] is the
//! default BLAKE3 implementation. All crypto operations wrap established
//! libraries -- no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, Digest};
