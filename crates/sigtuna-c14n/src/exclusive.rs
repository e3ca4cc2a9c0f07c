#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! The key difference from inclusive C14N: only "visibly utilized" namespace
//! declarations are output. A namespace is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.

use crate::escape;
use crate::inclusive::{attr_prefix, collect_inscope_namespaces, qualified_element_name};
use crate::render::{Attr, NsDecl};
use sigtuna_core::Error;
use sigtuna_xml::NodeSet;
use std::collections::{BTreeMap, HashSet};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut inclusive: HashSet<String> = HashSet::new();
    for p in inclusive_prefixes {
        // "#default" names the default namespace.
        if p == "#default" {
            inclusive.insert(String::new());
        } else {
            inclusive.insert(p.clone());
        }
    }

    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        with_comments,
        node_set,
        inclusive_prefixes: inclusive,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: HashSet<String>,
}

impl ExcC14nContext<'_> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        match self.node_set {
            None => true,
            Some(ns) => ns.contains(node),
        }
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, rendered_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    let parent_is_root = node
                        .parent()
                        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);

                    if parent_is_root && node.prev_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }

                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");

                    if parent_is_root && node.next_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    output.extend_from_slice(b"<?");
                    output.extend_from_slice(node.tag_name().name().as_bytes());
                    if let Some(value) = node.text() {
                        if !value.is_empty() {
                            output.push(b' ');
                            output.extend_from_slice(escape::escape_pi(value).as_bytes());
                        }
                    }
                    output.extend_from_slice(b"?>");
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(&node) {
            // In exclusive C14N, namespace declarations are only rendered on
            // visible element start tags; children inherit the same rendered
            // context.
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        // Determine which namespace prefixes are visibly utilized.
        let mut utilized_prefixes: HashSet<String> = HashSet::new();
        utilized_prefixes.insert(
            node.tag_name()
                .namespace()
                .and_then(|ns_uri| node.lookup_prefix(ns_uri))
                .unwrap_or("")
                .to_owned(),
        );
        for attr in node.attributes() {
            if let Some(prefix) = attr_prefix(&node, &attr) {
                if !prefix.is_empty() {
                    utilized_prefixes.insert(prefix);
                }
            }
        }
        for p in &self.inclusive_prefixes {
            utilized_prefixes.insert(p.clone());
        }

        let inscope_ns = collect_inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized_prefixes {
            if prefix == "xml" {
                continue;
            }

            if let Some(uri) = inscope_ns.get(prefix) {
                if rendered_ns.get(prefix) != Some(uri) {
                    ns_decls.push(NsDecl {
                        prefix: prefix.clone(),
                        uri: uri.clone(),
                    });
                }
            } else if prefix.is_empty() {
                // The default namespace was rendered non-empty by an
                // ancestor but is not bound here: undeclare it.
                if rendered_ns.get("").is_some_and(|u| !u.is_empty()) {
                    ns_decls.push(NsDecl {
                        prefix: String::new(),
                        uri: String::new(),
                    });
                }
            }
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            let ns_uri = attr.namespace().unwrap_or("");
            let qname = if let Some(prefix) = attr_prefix(&node, &attr) {
                if prefix.is_empty() {
                    attr.name().to_owned()
                } else {
                    format!("{}:{}", prefix, attr.name())
                }
            } else {
                attr.name().to_owned()
            };
            attrs.push(Attr {
                ns_uri: ns_uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name: qname,
                value: attr.value().to_owned(),
            });
        }
        attrs.sort();

        let elem_name = qualified_element_name(&node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        let mut child_rendered_ns = rendered_ns.clone();
        for ns_decl in &ns_decls {
            child_rendered_ns.insert(ns_decl.prefix.clone(), ns_decl.uri.clone());
        }

        for child in node.children() {
            self.process_node(child, output, &child_rendered_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc_c14n(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None, &[]).unwrap()).unwrap()
    }

    #[test]
    fn unused_namespace_is_dropped() {
        // xmlns:unused is in scope but not visibly utilized by <child>.
        let doc = roxmltree::Document::parse(
            r#"<a:root xmlns:a="http://a" xmlns:unused="http://u"><a:child/></a:root>"#,
        )
        .unwrap();
        let root = doc.root_element();
        let child = root.first_element_child().unwrap();
        let set = NodeSet::tree_without_comments(child);
        let out =
            String::from_utf8(canonicalize(&doc, false, Some(&set), &[]).unwrap()).unwrap();
        assert_eq!(out, r#"<a:child xmlns:a="http://a"></a:child>"#);
    }

    #[test]
    fn inclusive_prefix_list_is_honored() {
        let doc = roxmltree::Document::parse(
            r#"<a:root xmlns:a="http://a" xmlns:keep="http://k"><a:child/></a:root>"#,
        )
        .unwrap();
        let child = doc.root_element().first_element_child().unwrap();
        let set = NodeSet::tree_without_comments(child);
        let out = String::from_utf8(
            canonicalize(&doc, false, Some(&set), &["keep".to_owned()]).unwrap(),
        )
        .unwrap();
        assert!(out.contains(r#"xmlns:keep="http://k""#));
    }

    #[test]
    fn namespace_not_redeclared_in_children() {
        let out = exc_c14n(r#"<a:r xmlns:a="http://a"><a:c><a:d/></a:c></a:r>"#);
        assert_eq!(
            out,
            r#"<a:r xmlns:a="http://a"><a:c><a:d></a:d></a:c></a:r>"#
        );
    }

    #[test]
    fn default_namespace_renders_once() {
        let out = exc_c14n(r#"<r xmlns="urn:x"><c/></r>"#);
        assert_eq!(out, r#"<r xmlns="urn:x"><c></c></r>"#);
    }
}
