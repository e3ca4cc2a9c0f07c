#![forbid(unsafe_code)]

//! Signed-scope resolution.
//!
//! All identity-bearing data must come from the subtree covered by a
//! verified signature. The signed element is either the Response or its
//! sole Assertion, so extraction combines two path shapes and takes the
//! first hit:
//!
//! ```text
//! /Response/Assertion[@ID=$id]/...   (Assertion is signed)
//! /Response[@ID=$id]/Assertion/...   (Response is signed; its Assertion is
//!                                     trusted transitively)
//! ```

use sigtuna_core::ns;

/// Which document the signed scope lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeDoc {
    Original,
    Decrypted,
}

/// The resolved signed scope: a document choice plus the ID of the element
/// whose signature covers it.
#[derive(Debug, Clone)]
pub(crate) struct SignedScope {
    pub doc: ScopeDoc,
    pub id: String,
}

/// Shape information about one `<ds:Signature>` in a document.
#[derive(Debug, Clone)]
pub(crate) struct SignatureInfo {
    /// Local name of the signature's parent element.
    pub parent_name: String,
    /// The parent's `ID` attribute.
    pub parent_id: Option<String>,
    /// The first `<ds:Reference>` URI, verbatim (leading `#` included).
    pub reference_uri: Option<String>,
}

impl SignatureInfo {
    pub fn parent_is_response(&self) -> bool {
        self.parent_name == ns::node::RESPONSE
    }

    pub fn parent_is_assertion(&self) -> bool {
        self.parent_name == ns::node::ASSERTION
    }
}

/// Scan every `<ds:Signature>` in the document.
pub(crate) fn scan_signatures(doc: &roxmltree::Document<'_>) -> Vec<SignatureInfo> {
    sigtuna_xml::find_elements(doc, ns::DSIG, ns::node::SIGNATURE)
        .into_iter()
        .map(|sig| {
            let parent = sig.parent_element();
            let reference_uri = sig
                .descendants()
                .find(|n| sigtuna_xml::is_named(n, ns::DSIG, ns::node::REFERENCE))
                .and_then(|r| r.attribute(ns::attr::URI))
                .map(str::to_owned);
            SignatureInfo {
                parent_name: parent
                    .map(|p| p.tag_name().name().to_owned())
                    .unwrap_or_default(),
                parent_id: parent
                    .and_then(|p| p.attribute(ns::attr::ID))
                    .map(str::to_owned),
                reference_uri,
            }
        })
        .collect()
}

/// The ID of the Response element when a Response-level signature exists in
/// this document.
pub(crate) fn response_signature_id(doc: &roxmltree::Document<'_>) -> Option<String> {
    scan_signatures(doc)
        .into_iter()
        .find(|s| s.parent_is_response())
        .and_then(|s| s.parent_id)
}

/// The ID of the signed Assertion when an Assertion-level signature exists
/// in this document.
pub(crate) fn assertion_signature_id(doc: &roxmltree::Document<'_>) -> Option<String> {
    scan_signatures(doc)
        .into_iter()
        .find(|s| s.parent_is_assertion())
        .and_then(|s| s.parent_id)
}

/// The root `<samlp:Response>` element.
pub(crate) fn response_element<'a>(
    doc: &'a roxmltree::Document<'a>,
) -> Option<roxmltree::Node<'a, 'a>> {
    let root = doc.root_element();
    sigtuna_xml::is_named(&root, ns::PROTOCOL, ns::node::RESPONSE).then_some(root)
}

/// Resolve the assertion inside the signed scope, combining the two path
/// shapes and taking the first hit.
pub(crate) fn signed_assertion<'a>(
    doc: &'a roxmltree::Document<'a>,
    signed_id: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    let response = response_element(doc)?;
    let assertions = sigtuna_xml::find_children(response, ns::ASSERTION, ns::node::ASSERTION);

    // /Response/Assertion[@ID=$id]
    if let Some(assertion) = assertions
        .iter()
        .find(|a| a.attribute(ns::attr::ID) == Some(signed_id))
    {
        return Some(*assertion);
    }

    // /Response[@ID=$id]/Assertion
    if response.attribute(ns::attr::ID) == Some(signed_id) {
        return assertions.first().copied();
    }

    None
}
