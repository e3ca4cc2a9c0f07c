#![forbid(unsafe_code)]

//! Node sets for document-subset canonicalization.
//!
//! A `NodeSet` identifies a subset of a document's nodes by numeric index.
//! SAML signatures only need two shapes: a subtree without comments (the
//! dereferenced `#ID` reference) and that subtree minus the `<ds:Signature>`
//! being verified (the enveloped-signature transform), which is expressed as
//! a subtraction.

use std::collections::HashSet;

/// A set of XML document nodes identified by index.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node set containing every node in the document except
    /// comments. Per the DSig spec, `URI=""` selects the document without
    /// comments.
    pub fn all_without_comments(doc: &roxmltree::Document<'_>) -> Self {
        let nodes = doc
            .descendants()
            .filter(|n| !n.is_comment())
            .map(node_index)
            .collect();
        Self { nodes }
    }

    /// Create a node set for the subtree rooted at the given node, excluding
    /// comment nodes.
    pub fn tree_without_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let nodes = root
            .descendants()
            .filter(|n| !n.is_comment())
            .map(node_index)
            .collect();
        Self { nodes }
    }

    /// Create a node set for the full subtree rooted at the given node.
    pub fn tree(root: roxmltree::Node<'_, '_>) -> Self {
        let nodes = root.descendants().map(node_index).collect();
        Self { nodes }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node_index(*node))
    }

    /// Compute `self - other`.
    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Get a stable numeric index for a roxmltree node.
///
/// `roxmltree::NodeId` is `Copy + Eq` but does not expose its inner index,
/// so we recover it from the Debug form (`NodeId(N)`).
pub fn node_index(node: roxmltree::Node<'_, '_>) -> usize {
    let debug = format!("{:?}", node.id());
    debug
        .strip_prefix("NodeId(")
        .and_then(|s| s.strip_suffix(')'))
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_subtraction() {
        let doc = roxmltree::Document::parse("<a><b><c/></b><d/></a>").unwrap();
        let root = doc.root_element();
        let b = root.children().find(|n| n.has_tag_name("b")).unwrap();

        let all = NodeSet::tree_without_comments(root);
        let without_b = all.subtract(&NodeSet::tree(b));

        let d = root.children().find(|n| n.has_tag_name("d")).unwrap();
        let c = b.first_element_child().unwrap();
        assert!(without_b.contains(&root));
        assert!(without_b.contains(&d));
        assert!(!without_b.contains(&b));
        assert!(!without_b.contains(&c));
    }

    #[test]
    fn comments_are_excluded() {
        let doc = roxmltree::Document::parse("<a><!-- note --><b/></a>").unwrap();
        let set = NodeSet::tree_without_comments(doc.root_element());
        let comment = doc
            .root_element()
            .children()
            .find(|n| n.is_comment())
            .unwrap();
        assert!(!set.contains(&comment));
    }
}
