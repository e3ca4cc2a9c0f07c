#![forbid(unsafe_code)]

//! XML helpers shared across the Sigtuna workspace: hardened parsing options
//! and namespace-aware element lookup over `roxmltree` documents.

pub mod nodeset;

pub use nodeset::NodeSet;

use sigtuna_core::Error;
use std::collections::HashMap;

/// Parsing options for all SAML documents.
///
/// DTDs stay disabled: a SAML response never legitimately carries one, and
/// rejecting them up front closes the XXE/entity-expansion class entirely.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: false,
        ..Default::default()
    }
}

/// Parse an XML document with the hardened options.
pub fn parse(xml: &str) -> Result<roxmltree::Document<'_>, Error> {
    roxmltree::Document::parse_with_options(xml, parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))
}

/// Find the first element in document order with the given namespace and
/// local name.
pub fn find_element<'a>(
    doc: &'a roxmltree::Document<'a>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    doc.descendants().find(|n| is_named(n, ns_uri, local_name))
}

/// Find all elements in document order with the given namespace and local
/// name.
pub fn find_elements<'a>(
    doc: &'a roxmltree::Document<'a>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'a>> {
    doc.descendants()
        .filter(|n| is_named(n, ns_uri, local_name))
        .collect()
}

/// Find the first direct child element with the given namespace and local
/// name.
pub fn find_child<'a, 'b>(
    parent: roxmltree::Node<'a, 'b>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'b>> {
    parent.children().find(|n| is_named(n, ns_uri, local_name))
}

/// Find all direct child elements with the given namespace and local name.
pub fn find_children<'a, 'b>(
    parent: roxmltree::Node<'a, 'b>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'b>> {
    parent
        .children()
        .filter(|n| is_named(n, ns_uri, local_name))
        .collect()
}

/// Check whether a node is an element with the given namespace and local
/// name.
pub fn is_named(node: &roxmltree::Node<'_, '_>, ns_uri: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns_uri
}

/// The trimmed text content of an element, or `None` when there is none.
pub fn element_text<'a>(node: roxmltree::Node<'a, '_>) -> Option<&'a str> {
    let text = node.text()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Build a map from ID attribute values to node IDs.
///
/// SAML uses the `ID` attribute; the extra spellings cover documents produced
/// by less careful IdP stacks.
pub fn build_id_map(
    doc: &roxmltree::Document<'_>,
    attr_names: &[&str],
) -> HashMap<String, roxmltree::NodeId> {
    let mut map = HashMap::new();
    for node in doc.descendants() {
        if node.is_element() {
            for attr_name in attr_names {
                if let Some(val) = node.attribute(*attr_name) {
                    map.insert(val.to_owned(), node.id());
                }
            }
        }
    }
    map
}

/// Resolve an ID value in a parsed document using a pre-built ID map.
pub fn resolve_id<'a>(
    doc: &'a roxmltree::Document<'a>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'a>, Error> {
    id_map
        .get(id)
        .and_then(|nid| doc.get_node(*nid))
        .ok_or_else(|| Error::InvalidUri(format!("ID not found: {id}")))
}
