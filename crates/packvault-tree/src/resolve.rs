//! Composite-key resolution.
//!
//! Maps an attachment path found in a container back to the leaf (or default
//! image) that references it. When several leaves reference the same path
//! they are handed out first-come-first-served in walk order through
//! [`IdentityQueues`]; when nothing matches, a lossy fallback identity is
//! synthesized and flagged as degraded.

use std::collections::{HashMap, VecDeque};

use packvault_types::Identity;
use serde::Serialize;
use tracing::warn;

use crate::error::{ResolveError, ResolveResult};
use crate::model::Document;
use crate::path::normalize;
use crate::walk::{walk, NodeLocation};

/// Where a resolved identity lives in the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafTarget {
    /// The default image of `records[record]`.
    DefaultImage { record: usize },
    /// An attachment leaf.
    Leaf(NodeLocation),
    /// A fallback identity with no structural position.
    Unlocated,
}

/// One resolved path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Identity,
    pub target: LeafTarget,
    /// `true` when the identity is a fallback rather than a structural match.
    pub degraded: bool,
}

/// All identities whose value normalizes to `normalized`.
///
/// Matching default images short-circuit: one identity per matching record
/// is returned, in record order. Otherwise every matching leaf is returned,
/// in walk order.
pub fn collect_identities(doc: &Document, normalized: &str) -> ResolveResult<Vec<Resolution>> {
    if doc.records.is_empty() {
        return Err(ResolveError::NoOwnerRecord);
    }

    let images: Vec<Resolution> = doc
        .default_images()
        .filter(|(_, _, img)| normalize(img.reference.path()) == normalized)
        .map(|(index, record, _)| Resolution {
            identity: record.default_image_identity(),
            target: LeafTarget::DefaultImage { record: index },
            degraded: false,
        })
        .collect();
    if !images.is_empty() {
        return Ok(images);
    }

    Ok(matching_leaves(doc, normalized))
}

fn matching_leaves(doc: &Document, normalized: &str) -> Vec<Resolution> {
    let mut found = Vec::new();
    walk(doc, |ctx, leaf| {
        let matches = leaf
            .value
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty() && normalize(v) == normalized);
        if matches {
            found.push(Resolution {
                identity: ctx.identity(leaf),
                target: LeafTarget::Leaf(ctx.location.clone()),
                degraded: false,
            });
        }
    });
    found
}

/// Resolve a single path with a full search of the leaf tree.
///
/// Returns the first matching leaf, or a degraded fallback identity owned by
/// the best-effort owner. The default-image slot is not consulted here; it
/// is only ever claimed through [`collect_identities`].
pub fn resolve_one(doc: &Document, original_path: &str) -> ResolveResult<Resolution> {
    let owner = doc
        .best_effort_owner()
        .ok_or(ResolveError::NoOwnerRecord)?;
    let normalized = normalize(original_path);
    if let Some(first) = matching_leaves(doc, &normalized).into_iter().next() {
        return Ok(first);
    }

    Ok(Resolution {
        identity: Identity::fallback(&owner.id, original_path),
        target: LeafTarget::Unlocated,
        degraded: true,
    })
}

/// Per-path FIFO queues of structural identities, built once per document.
///
/// Duplicate references to the same path each claim a distinct identity, in
/// walk order. Once a path's queue is exhausted, further claims fall back
/// to [`resolve_one`].
#[derive(Debug, Default)]
pub struct IdentityQueues {
    queues: HashMap<String, VecDeque<Resolution>>,
}

impl IdentityQueues {
    /// Build queues for every distinct normalized path in `paths`.
    pub fn build<'a, I>(doc: &Document, paths: I) -> ResolveResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut queues = HashMap::new();
        for path in paths {
            let normalized = normalize(path);
            if queues.contains_key(&normalized) {
                continue;
            }
            let found = collect_identities(doc, &normalized)?;
            queues.insert(normalized, VecDeque::from(found));
        }
        Ok(Self { queues })
    }

    /// Claim the next identity for `original_path`.
    pub fn claim(&mut self, doc: &Document, original_path: &str) -> ResolveResult<Resolution> {
        let next = self
            .queues
            .get_mut(&normalize(original_path))
            .and_then(VecDeque::pop_front);
        match next {
            Some(resolution) => Ok(resolution),
            None => resolve_one(doc, original_path),
        }
    }

    /// Identities still queued for `path`.
    pub fn remaining(&self, path: &str) -> usize {
        self.queues
            .get(&normalize(path))
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

/// Two distinct paths that collapsed onto the same fallback identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FallbackCollision {
    pub identity: Identity,
    pub first_path: String,
    pub path: String,
}

/// Detects fallback identities claimed by more than one distinct path.
///
/// Fallback identities keep only the file name, so `a/logo.png` and
/// `b/logo.png` both become `owner::fallback::logo.png`. The second path
/// then shares the first path's metadata row.
#[derive(Debug, Default)]
pub struct FallbackTracker {
    claimed: HashMap<Identity, String>,
    collisions: Vec<FallbackCollision>,
}

impl FallbackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fallback claim, returning the collision it causes, if any.
    pub fn record(&mut self, identity: &Identity, original_path: &str) -> Option<FallbackCollision> {
        let normalized = normalize(original_path);
        match self.claimed.get(identity) {
            None => {
                self.claimed.insert(identity.clone(), normalized);
                None
            }
            Some(first) if *first == normalized => None,
            Some(first) => {
                warn!(
                    identity = %identity,
                    first_path = %first,
                    path = %normalized,
                    "fallback identity collision"
                );
                let collision = FallbackCollision {
                    identity: identity.clone(),
                    first_path: first.clone(),
                    path: normalized,
                };
                self.collisions.push(collision.clone());
                Some(collision)
            }
        }
    }

    pub fn collisions(&self) -> &[FallbackCollision] {
        &self.collisions
    }

    pub fn into_collisions(self) -> Vec<FallbackCollision> {
        self.collisions
    }
}

/// Declared content type for `original_path`.
///
/// A matching default image wins; otherwise the last matching leaf with a
/// non-blank content type. `None` when nothing declares one.
pub fn content_type_of(doc: &Document, original_path: &str) -> Option<String> {
    let normalized = normalize(original_path);

    let from_image = doc
        .default_images()
        .filter(|(_, _, img)| normalize(img.reference.path()) == normalized)
        .find_map(|(_, _, img)| non_blank(img.content_type.as_deref()));
    if from_image.is_some() {
        return from_image;
    }

    let mut found = None;
    walk(doc, |_, leaf| {
        let matches = leaf
            .value
            .as_deref()
            .is_some_and(|v| normalize(v) == normalized);
        if matches {
            if let Some(ct) = non_blank(leaf.content_type.as_deref()) {
                found = Some(ct);
            }
        }
    });
    found
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttachmentLeaf, Collection, DefaultImage, ImageRef, Node, OwnerRecord};

    fn leaf(id: &str, value: &str, content_type: &str) -> Node {
        Node::Attachment(AttachmentLeaf::new(id, value, content_type))
    }

    fn doc_with(children: Vec<Node>) -> Document {
        Document {
            records: vec![OwnerRecord {
                collections: vec!["sm".into()],
                ..OwnerRecord::new("aas")
            }],
            collections: vec![Collection {
                id: "sm".into(),
                children,
            }],
        }
    }

    // ----------------------------------------------------------------
    // collect / resolve
    // ----------------------------------------------------------------

    #[test]
    fn collect_matches_case_and_separator_variants() {
        let doc = doc_with(vec![
            leaf("A", "Img\\Logo.PNG", "image/png"),
            leaf("B", "img/logo.png", "image/png"),
            leaf("C", "other.png", "image/png"),
        ]);
        let found = collect_identities(&doc, "img/logo.png").unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.identity.leaf_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(found.iter().all(|r| !r.degraded));
    }

    #[test]
    fn default_image_short_circuits() {
        let mut doc = doc_with(vec![leaf("A", "thumb.png", "image/png")]);
        doc.records[0].default_image = Some(DefaultImage {
            reference: ImageRef::ByValue("thumb.png".into()),
            content_type: None,
        });
        let found = collect_identities(&doc, "thumb.png").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].target, LeafTarget::DefaultImage { record: 0 });
        assert_eq!(found[0].identity.leaf_id, crate::model::DEFAULT_IMAGE_LEAF);

        // A second reference to the same path resolves to the leaf.
        let mut queues = IdentityQueues::build(&doc, ["thumb.png", "thumb.png"]).unwrap();
        let first = queues.claim(&doc, "thumb.png").unwrap();
        let second = queues.claim(&doc, "thumb.png").unwrap();
        assert_eq!(first.target, LeafTarget::DefaultImage { record: 0 });
        assert_eq!(second.identity.leaf_id, "A");
        assert!(!second.degraded);
    }

    #[test]
    fn shared_default_image_yields_one_identity_per_record() {
        let mut doc = doc_with(vec![leaf("A", "thumb.png", "image/png")]);
        let image = DefaultImage {
            reference: ImageRef::ByValue("thumb.png".into()),
            content_type: None,
        };
        doc.records[0].default_image = Some(image.clone());
        doc.records.push(OwnerRecord {
            default_image: Some(image),
            ..OwnerRecord::new("aas2")
        });

        let found = collect_identities(&doc, "thumb.png").unwrap();
        let targets: Vec<_> = found.iter().map(|r| r.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                LeafTarget::DefaultImage { record: 0 },
                LeafTarget::DefaultImage { record: 1 },
            ]
        );
        assert_eq!(found[1].identity, doc.records[1].default_image_identity());

        let mut queues = IdentityQueues::build(&doc, ["thumb.png", "thumb.png"]).unwrap();
        assert_eq!(queues.remaining("thumb.png"), 2);
        let first = queues.claim(&doc, "thumb.png").unwrap();
        let second = queues.claim(&doc, "THUMB.png").unwrap();
        assert_eq!(first.identity.owner_id, "aas");
        assert_eq!(second.identity.owner_id, "aas2");
        assert!(!second.degraded);
    }

    #[test]
    fn no_records_is_fatal() {
        let doc = Document::default();
        assert_eq!(
            collect_identities(&doc, "a.png").unwrap_err(),
            ResolveError::NoOwnerRecord
        );
        assert_eq!(
            resolve_one(&doc, "a.png").unwrap_err(),
            ResolveError::NoOwnerRecord
        );
    }

    #[test]
    fn unmatched_path_falls_back() {
        let doc = doc_with(vec![leaf("A", "a.pdf", "application/pdf")]);
        let r = resolve_one(&doc, "files/Missing.PDF").unwrap();
        assert!(r.degraded);
        assert_eq!(r.target, LeafTarget::Unlocated);
        assert_eq!(r.identity, Identity::new("aas", "fallback", "Missing.PDF"));
    }

    // ----------------------------------------------------------------
    // queues
    // ----------------------------------------------------------------

    #[test]
    fn duplicate_paths_claim_distinct_identities_in_order() {
        let doc = doc_with(vec![
            leaf("First", "x/a.pdf", "application/pdf"),
            leaf("Second", "X/A.pdf", "application/pdf"),
        ]);
        let mut queues = IdentityQueues::build(&doc, ["x/a.pdf", "X/A.pdf"]).unwrap();
        assert_eq!(queues.remaining("x/a.pdf"), 2);
        let first = queues.claim(&doc, "x/a.pdf").unwrap();
        let second = queues.claim(&doc, "X/A.pdf").unwrap();
        assert_eq!(first.identity.leaf_id, "First");
        assert_eq!(second.identity.leaf_id, "Second");
        assert_eq!(queues.remaining("x/a.pdf"), 0);
    }

    #[test]
    fn exhausted_queue_resolves_to_first_match() {
        let doc = doc_with(vec![leaf("Only", "a.pdf", "application/pdf")]);
        let mut queues = IdentityQueues::build(&doc, ["a.pdf"]).unwrap();
        assert_eq!(queues.claim(&doc, "a.pdf").unwrap().identity.leaf_id, "Only");
        let again = queues.claim(&doc, "a.pdf").unwrap();
        assert_eq!(again.identity.leaf_id, "Only");
        assert!(!again.degraded);
    }

    #[test]
    fn unknown_path_claims_fallback() {
        let doc = doc_with(vec![]);
        let mut queues = IdentityQueues::build(&doc, ["ghost.bin"]).unwrap();
        assert!(queues.claim(&doc, "ghost.bin").unwrap().degraded);
    }

    // ----------------------------------------------------------------
    // fallback collisions
    // ----------------------------------------------------------------

    #[test]
    fn tracker_flags_distinct_paths_sharing_a_fallback() {
        let mut tracker = FallbackTracker::new();
        let a = Identity::fallback("aas", "a/logo.png");
        let b = Identity::fallback("aas", "b/logo.png");
        assert!(tracker.record(&a, "a/logo.png").is_none());
        assert!(tracker.record(&a, "A\\LOGO.png").is_none());
        let collision = tracker.record(&b, "b/logo.png").unwrap();
        assert_eq!(collision.first_path, "a/logo.png");
        assert_eq!(collision.path, "b/logo.png");
        assert_eq!(tracker.collisions().len(), 1);
    }

    // ----------------------------------------------------------------
    // content type
    // ----------------------------------------------------------------

    #[test]
    fn content_type_prefers_default_image() {
        let mut doc = doc_with(vec![leaf("A", "thumb.png", "image/x-leaf")]);
        doc.records[0].default_image = Some(DefaultImage {
            reference: ImageRef::ByPath("thumb.png".into()),
            content_type: Some("image/png".into()),
        });
        assert_eq!(content_type_of(&doc, "THUMB.png").as_deref(), Some("image/png"));
    }

    #[test]
    fn content_type_takes_last_non_blank_leaf() {
        let doc = doc_with(vec![
            leaf("A", "a.bin", "application/x-first"),
            leaf("B", "a.bin", "application/x-second"),
            leaf("C", "a.bin", "  "),
        ]);
        assert_eq!(
            content_type_of(&doc, "a.bin").as_deref(),
            Some("application/x-second")
        );
        assert_eq!(content_type_of(&doc, "missing.bin"), None);
    }
}
