//! Depth-first traversal of attachment leaves in declaration order.

use packvault_types::Identity;

use crate::model::{AttachmentLeaf, Collection, Document, Element, Node};
use crate::path::ValueKind;

/// Position of a node inside a [`Document`]: the index of its top-level
/// collection, then one child index per nesting level.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeLocation {
    pub collection: usize,
    pub path: Vec<usize>,
}

/// Structural context of one visited leaf.
///
/// `collection_id` is the id of the leaf's immediate container. Nested
/// containers are qualified by their ancestors (`outer/inner`) so that
/// identically named sub-collections under different parents stay distinct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafContext {
    pub owner_id: String,
    pub collection_id: String,
    pub location: NodeLocation,
}

impl LeafContext {
    /// The composite identity of `leaf` in this context.
    pub fn identity(&self, leaf: &AttachmentLeaf) -> Identity {
        Identity::new(&self.owner_id, &self.collection_id, &leaf.id)
    }
}

/// Visit every attachment leaf in document order.
pub fn walk<F>(doc: &Document, mut visit: F)
where
    F: FnMut(&LeafContext, &AttachmentLeaf),
{
    for (index, collection) in doc.collections.iter().enumerate() {
        let owner = owner_id(doc, &collection.id);
        let mut path = Vec::new();
        visit_nodes(
            &collection.children,
            &owner,
            &collection.id,
            index,
            &mut path,
            &mut visit,
        );
    }
}

fn visit_nodes<F>(
    nodes: &[Node],
    owner: &str,
    scope: &str,
    collection: usize,
    path: &mut Vec<usize>,
    visit: &mut F,
) where
    F: FnMut(&LeafContext, &AttachmentLeaf),
{
    for (i, node) in nodes.iter().enumerate() {
        path.push(i);
        match node {
            Node::Attachment(leaf) => {
                let ctx = LeafContext {
                    owner_id: owner.to_string(),
                    collection_id: scope.to_string(),
                    location: NodeLocation {
                        collection,
                        path: path.clone(),
                    },
                };
                visit(&ctx, leaf);
            }
            Node::Collection(Collection { id, children })
            | Node::Element(Element { id, children, .. }) => {
                let nested = format!("{scope}/{id}");
                visit_nodes(children, owner, &nested, collection, path, visit);
            }
        }
        path.pop();
    }
}

/// Visit every attachment leaf in document order with mutable access.
///
/// Visits exactly the leaves [`walk`] visits, in the same order and with
/// the same contexts.
pub fn walk_mut<F>(doc: &mut Document, mut visit: F)
where
    F: FnMut(&LeafContext, &mut AttachmentLeaf),
{
    let owners: Vec<String> = doc
        .collections
        .iter()
        .map(|c| owner_id(doc, &c.id))
        .collect();
    for (index, collection) in doc.collections.iter_mut().enumerate() {
        let mut path = Vec::new();
        let scope = collection.id.clone();
        visit_nodes_mut(
            &mut collection.children,
            &owners[index],
            &scope,
            index,
            &mut path,
            &mut visit,
        );
    }
}

fn visit_nodes_mut<F>(
    nodes: &mut [Node],
    owner: &str,
    scope: &str,
    collection: usize,
    path: &mut Vec<usize>,
    visit: &mut F,
) where
    F: FnMut(&LeafContext, &mut AttachmentLeaf),
{
    for (i, node) in nodes.iter_mut().enumerate() {
        path.push(i);
        match node {
            Node::Attachment(leaf) => {
                let ctx = LeafContext {
                    owner_id: owner.to_string(),
                    collection_id: scope.to_string(),
                    location: NodeLocation {
                        collection,
                        path: path.clone(),
                    },
                };
                visit(&ctx, leaf);
            }
            Node::Collection(Collection { id, children })
            | Node::Element(Element { id, children, .. }) => {
                let nested = format!("{scope}/{id}");
                visit_nodes_mut(children, owner, &nested, collection, path, visit);
            }
        }
        path.pop();
    }
}

fn owner_id(doc: &Document, collection_id: &str) -> String {
    doc.owner_of(collection_id)
        .map(|r| r.id.clone())
        .unwrap_or_default()
}

/// Every container-relative path the document references: default images
/// first, in record order, then leaf values in walk order.
///
/// Empty values and external URLs are skipped. Duplicates are kept; each
/// reference yields its own attachment candidate.
pub fn referenced_paths(doc: &Document) -> Vec<String> {
    let mut paths: Vec<String> = doc
        .default_images()
        .map(|(_, _, img)| img.reference.path())
        .filter(|p| ValueKind::of(Some(*p)) == ValueKind::Relative)
        .map(|p| p.trim().to_string())
        .collect();
    walk(doc, |_, leaf| {
        if ValueKind::of(leaf.value.as_deref()) == ValueKind::Relative {
            if let Some(value) = &leaf.value {
                paths.push(value.trim().to_string());
            }
        }
    });
    paths
}

impl Document {
    /// The attachment leaf at `location`, if that position holds one.
    pub fn leaf(&self, location: &NodeLocation) -> Option<&AttachmentLeaf> {
        let (last, parents) = location.path.split_last()?;
        let mut nodes: &[Node] = &self.collections.get(location.collection)?.children;
        for &i in parents {
            nodes = nodes.get(i)?.children()?;
        }
        match nodes.get(*last)? {
            Node::Attachment(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Mutable access to the attachment leaf at `location`.
    pub fn leaf_mut(&mut self, location: &NodeLocation) -> Option<&mut AttachmentLeaf> {
        let (last, parents) = location.path.split_last()?;
        let mut nodes = &mut self.collections.get_mut(location.collection)?.children;
        for &i in parents {
            nodes = nodes.get_mut(i)?.children_mut()?;
        }
        match nodes.get_mut(*last)? {
            Node::Attachment(leaf) => Some(leaf),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DefaultImage, ImageRef, OwnerRecord};

    fn leaf(id: &str, value: &str) -> Node {
        Node::Attachment(AttachmentLeaf::new(id, value, "application/pdf"))
    }

    fn sample() -> Document {
        Document {
            records: vec![
                OwnerRecord {
                    default_image: Some(DefaultImage {
                        reference: ImageRef::ByPath("thumb.png".into()),
                        content_type: Some("image/png".into()),
                    }),
                    collections: vec!["sm1".into()],
                    ..OwnerRecord::new("aas1")
                },
                OwnerRecord {
                    collections: vec!["sm2".into()],
                    ..OwnerRecord::new("aas2")
                },
            ],
            collections: vec![
                Collection {
                    id: "sm1".into(),
                    children: vec![
                        leaf("A", "docs/a.pdf"),
                        Node::Collection(Collection {
                            id: "Docs".into(),
                            children: vec![leaf("B", "docs/b.pdf"), leaf("Ext", "https://h/x")],
                        }),
                        leaf("C", "  "),
                    ],
                },
                Collection {
                    id: "sm2".into(),
                    children: vec![Node::Element(Element {
                        id: "Entity".into(),
                        element_type: "Entity".into(),
                        children: vec![leaf("D", "docs/a.pdf")],
                        value: None,
                    })],
                },
            ],
        }
    }

    #[test]
    fn walk_visits_leaves_in_declaration_order() {
        let doc = sample();
        let mut seen = Vec::new();
        walk(&doc, |ctx, leaf| seen.push(ctx.identity(leaf).composite_key()));
        assert_eq!(
            seen,
            vec![
                "aas1::sm1::A",
                "aas1::sm1/Docs::B",
                "aas1::sm1/Docs::Ext",
                "aas1::sm1::C",
                "aas2::sm2/Entity::D",
            ]
        );
    }

    #[test]
    fn walk_mut_matches_walk() {
        let mut doc = sample();
        let mut immutable = Vec::new();
        walk(&doc, |ctx, _| immutable.push(ctx.clone()));
        let mut mutable = Vec::new();
        walk_mut(&mut doc, |ctx, _| mutable.push(ctx.clone()));
        assert_eq!(immutable, mutable);
    }

    #[test]
    fn locations_address_visited_leaves() {
        let mut doc = sample();
        let mut locations = Vec::new();
        walk(&doc, |ctx, leaf| locations.push((ctx.location.clone(), leaf.id.clone())));
        for (location, id) in &locations {
            assert_eq!(&doc.leaf(location).unwrap().id, id);
        }
        let (loc, _) = &locations[1];
        doc.leaf_mut(loc).unwrap().value = Some("rewritten".into());
        assert_eq!(doc.leaf(loc).unwrap().value.as_deref(), Some("rewritten"));
    }

    #[test]
    fn location_of_non_leaf_is_none() {
        let doc = sample();
        let collection = NodeLocation {
            collection: 0,
            path: vec![1],
        };
        assert!(doc.leaf(&collection).is_none());
        let out_of_range = NodeLocation {
            collection: 5,
            path: vec![0],
        };
        assert!(doc.leaf(&out_of_range).is_none());
        let empty = NodeLocation {
            collection: 0,
            path: vec![],
        };
        assert!(doc.leaf(&empty).is_none());
    }

    #[test]
    fn referenced_paths_put_default_image_first() {
        let doc = sample();
        assert_eq!(
            referenced_paths(&doc),
            vec!["thumb.png", "docs/a.pdf", "docs/b.pdf", "docs/a.pdf"]
        );
    }

    #[test]
    fn walk_without_records_uses_empty_owner() {
        let doc = Document {
            records: Vec::new(),
            collections: vec![Collection {
                id: "sm".into(),
                children: vec![leaf("A", "a.pdf")],
            }],
        };
        let mut owners = Vec::new();
        walk(&doc, |ctx, _| owners.push(ctx.owner_id.clone()));
        assert_eq!(owners, vec![String::new()]);
    }
}
