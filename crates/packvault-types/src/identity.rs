use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::filename::file_name;

/// Reserved collection id carried by every fallback identity.
pub const FALLBACK_COLLECTION: &str = "fallback";

/// Separator of the textual composite key.
const KEY_SEPARATOR: &str = "::";

/// The `(owner, collection, leaf)` tuple that stably addresses one
/// attachment-bearing leaf inside one document.
///
/// - `owner_id` identifies the top-level record owning the leaf's collection.
/// - `collection_id` identifies the leaf's immediate collection.
/// - `leaf_id` identifies the leaf within that collection.
///
/// The textual form `owner::collection::leaf` is the composite key used in
/// logs and on the command line.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub owner_id: String,
    pub collection_id: String,
    pub leaf_id: String,
}

impl Identity {
    pub fn new(
        owner_id: impl Into<String>,
        collection_id: impl Into<String>,
        leaf_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            collection_id: collection_id.into(),
            leaf_id: leaf_id.into(),
        }
    }

    /// Synthesize the lossy fallback identity for a path that matched no
    /// leaf: the reserved collection id plus the path's file name.
    ///
    /// Two unrelated paths sharing a file name produce the same fallback.
    pub fn fallback(owner_id: impl Into<String>, path: &str) -> Self {
        Self::new(owner_id, FALLBACK_COLLECTION, file_name(path))
    }

    /// Returns `true` if this identity was synthesized by [`Identity::fallback`].
    pub fn is_fallback(&self) -> bool {
        self.collection_id == FALLBACK_COLLECTION
    }

    /// The `owner::collection::leaf` composite key.
    pub fn composite_key(&self) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.owner_id, self.collection_id, self.leaf_id
        )
    }

    /// Parse a composite key. Owner and collection ids may not contain `::`;
    /// the leaf id takes everything after the second separator.
    pub fn parse_composite_key(key: &str) -> Result<Self, TypeError> {
        let mut parts = key.splitn(3, KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(collection), Some(leaf))
                if !owner.is_empty() && !collection.is_empty() && !leaf.is_empty() =>
            {
                Ok(Self::new(owner, collection, leaf))
            }
            _ => Err(TypeError::InvalidCompositeKey {
                key: key.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.composite_key())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composite_key())
    }
}

impl FromStr for Identity {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_composite_key(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_roundtrip() {
        let id = Identity::new("urn:aas:1", "urn:sm:docs", "Manual");
        let key = id.composite_key();
        assert_eq!(key, "urn:aas:1::urn:sm:docs::Manual");
        assert_eq!(Identity::parse_composite_key(&key).unwrap(), id);
    }

    #[test]
    fn parse_rejects_short_keys() {
        assert!(Identity::parse_composite_key("a::b").is_err());
        assert!(Identity::parse_composite_key("a::::c").is_err());
        assert!(Identity::parse_composite_key("").is_err());
    }

    #[test]
    fn leaf_id_may_contain_separator() {
        let id = Identity::parse_composite_key("a::b::c::d").unwrap();
        assert_eq!(id.leaf_id, "c::d");
    }

    #[test]
    fn fallback_uses_file_name() {
        let id = Identity::fallback("urn:aas:1", "/aasx/files/Logo.PNG");
        assert_eq!(id.collection_id, FALLBACK_COLLECTION);
        assert_eq!(id.leaf_id, "Logo.PNG");
        assert!(id.is_fallback());
    }

    #[test]
    fn fallbacks_for_same_file_name_collide() {
        let a = Identity::fallback("owner", "a/logo.png");
        let b = Identity::fallback("owner", "b/logo.png");
        assert_eq!(a, b);
    }

    #[test]
    fn regular_identity_is_not_fallback() {
        assert!(!Identity::new("o", "c", "l").is_fallback());
    }

    #[test]
    fn from_str_matches_parse() {
        let id: Identity = "o::c::l".parse().unwrap();
        assert_eq!(id, Identity::new("o", "c", "l"));
    }
}
