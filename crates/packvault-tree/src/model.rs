use packvault_types::Identity;
use serde::{Deserialize, Serialize};

/// Leaf id under which a record's default image is keyed.
///
/// The default image has no leaf of its own in the tree, and its file name
/// changes when the reference is rewritten to a download URL, so a fixed
/// sentinel keeps the identity stable across ingest and export.
pub const DEFAULT_IMAGE_LEAF: &str = "defaultImage";

/// A hierarchical asset-model document.
///
/// `records` are the top-level owner records; `collections` are the
/// top-level collections, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub records: Vec<OwnerRecord>,
    #[serde(default)]
    pub collections: Vec<Collection>,
}

/// A top-level record that owns collections and may carry a default image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRecord {
    pub id: String,
    /// Global asset id. Keys the default image when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<DefaultImage>,
    /// Ids of the top-level collections this record references.
    #[serde(default)]
    pub collections: Vec<String>,
}

/// The preview image attached directly to an owner record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultImage {
    pub reference: ImageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// How a default image names its file. Both forms hold a path or URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageRef {
    ByValue(String),
    ByPath(String),
}

impl ImageRef {
    pub fn path(&self) -> &str {
        match self {
            Self::ByValue(p) | Self::ByPath(p) => p,
        }
    }

    /// Replace the path, keeping the reference form.
    pub fn set_path(&mut self, path: impl Into<String>) {
        match self {
            Self::ByValue(p) | Self::ByPath(p) => *p = path.into(),
        }
    }
}

/// A named container of nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

/// One child of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Node {
    Attachment(AttachmentLeaf),
    Collection(Collection),
    Element(Element),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Self::Attachment(leaf) => &leaf.id,
            Self::Collection(c) => &c.id,
            Self::Element(e) => &e.id,
        }
    }

    /// Nested nodes, if this node can contain any.
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Self::Attachment(_) => None,
            Self::Collection(c) => Some(&c.children),
            Self::Element(e) => Some(&e.children),
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Self::Attachment(_) => None,
            Self::Collection(c) => Some(&mut c.children),
            Self::Element(e) => Some(&mut e.children),
        }
    }
}

/// A leaf whose value is a path or URL naming an attachment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentLeaf {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl AttachmentLeaf {
    pub fn new(
        id: impl Into<String>,
        value: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            value: Some(value.into()),
            content_type: Some(content_type.into()),
        }
    }
}

/// Any other structural element. Elements with children (entities,
/// lists, operations) are walked like collections; the opaque `value` is
/// carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Document {
    /// The record owning a top-level collection: the first record whose
    /// reference list names it, else the first record in the document.
    ///
    /// Returns `None` only when the document has no records at all.
    pub fn owner_of(&self, collection_id: &str) -> Option<&OwnerRecord> {
        self.records
            .iter()
            .find(|r| r.collections.iter().any(|c| c == collection_id))
            .or_else(|| self.best_effort_owner())
    }

    /// The owner used when no structural owner is known.
    pub fn best_effort_owner(&self) -> Option<&OwnerRecord> {
        self.records.first()
    }

    /// Records that carry a default image, in record order, with their index.
    pub fn default_images(&self) -> impl Iterator<Item = (usize, &OwnerRecord, &DefaultImage)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.default_image.as_ref().map(|img| (i, r, img)))
    }
}

impl OwnerRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            asset_id: None,
            default_image: None,
            collections: Vec::new(),
        }
    }

    /// Identity keying this record's default image.
    pub fn default_image_identity(&self) -> Identity {
        let collection = self.asset_id.as_deref().unwrap_or(&self.id);
        Identity::new(&self.id, collection, DEFAULT_IMAGE_LEAF)
    }
}
