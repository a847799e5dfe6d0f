//! In-place rewriting of leaf values.

use crate::model::Document;
use crate::resolve::LeafTarget;
use crate::walk::walk_mut;

/// Current value at `target`.
pub fn target_value<'a>(doc: &'a Document, target: &LeafTarget) -> Option<&'a str> {
    match target {
        LeafTarget::DefaultImage { record } => doc
            .records
            .get(*record)?
            .default_image
            .as_ref()
            .map(|img| img.reference.path()),
        LeafTarget::Leaf(location) => doc.leaf(location)?.value.as_deref(),
        LeafTarget::Unlocated => None,
    }
}

/// Overwrite the value at `target`. Returns `false` if the target does not
/// exist or is unlocated.
pub fn set_target_value(doc: &mut Document, target: &LeafTarget, value: &str) -> bool {
    match target {
        LeafTarget::DefaultImage { record } => {
            match doc
                .records
                .get_mut(*record)
                .and_then(|r| r.default_image.as_mut())
            {
                Some(img) => {
                    img.reference.set_path(value);
                    true
                }
                None => false,
            }
        }
        LeafTarget::Leaf(location) => match doc.leaf_mut(location) {
            Some(leaf) => {
                leaf.value = Some(value.to_string());
                true
            }
            None => false,
        },
        LeafTarget::Unlocated => false,
    }
}

/// Rewrite every default image and leaf whose trimmed value equals the
/// trimmed `original`. Returns the number of values changed.
///
/// Used for identities without a structural position, where the only link
/// back to the tree is the raw path text.
pub fn rewrite_matching(doc: &mut Document, original: &str, value: &str) -> usize {
    let original = original.trim();
    let mut changed = 0;

    for record in &mut doc.records {
        if let Some(img) = record.default_image.as_mut() {
            if img.reference.path().trim() == original {
                img.reference.set_path(value);
                changed += 1;
            }
        }
    }

    walk_mut(doc, |_, leaf| {
        if leaf.value.as_deref().map(str::trim) == Some(original) {
            leaf.value = Some(value.to_string());
            changed += 1;
        }
    });
    changed
}
