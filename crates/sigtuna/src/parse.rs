#![forbid(unsafe_code)]

//! Typed field extraction over the signed scope.
//!
//! Extraction runs once, eagerly, at Response construction. Extractors that
//! can fail in interesting ways (issuer cardinality, NameID decryption,
//! attribute decryption) record the failure message instead of aborting, so
//! the validation engine can fold it into the error list.

use crate::attributes::Attributes;
use crate::scope;
use chrono::{DateTime, Utc};
use sigtuna_core::{ns, saml};
use sigtuna_enc::{decrypt_node, wrap_fragment, ElementKind};
use sigtuna_keys::Key;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub(crate) struct NameIdData {
    pub value: Option<String>,
    pub format: Option<String>,
    pub sp_name_qualifier: Option<String>,
    pub name_qualifier: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SubjectConfirmationInfo {
    pub method: Option<String>,
    pub data: Option<SubjectConfirmationData>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SubjectConfirmationData {
    pub in_response_to: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StatusInfo {
    /// The top StatusCode value, or the full `" | "`-joined chain when the
    /// response is not a success.
    pub code: Option<String>,
    pub message: Option<String>,
    pub success: bool,
}

/// Everything the validation engine and the accessor surface need, computed
/// once.
#[derive(Debug)]
pub(crate) struct Extracted {
    pub response_id: Option<String>,
    pub version: Option<String>,
    pub in_response_to: Option<String>,
    pub destination: Option<String>,
    pub status: StatusInfo,
    pub issuers: Result<Vec<String>, String>,
    pub name_id: Result<Option<NameIdData>, String>,
    pub assertion_id: Option<String>,
    pub session_index: Option<String>,
    pub session_expires_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub conditions_count: usize,
    pub authn_statement_count: usize,
    pub audiences: Vec<String>,
    pub subject_confirmations: Vec<SubjectConfirmationInfo>,
    pub attributes: Attributes,
    pub duplicate_attribute: Option<String>,
    pub attribute_error: Option<String>,
}

impl Default for Extracted {
    fn default() -> Self {
        Self {
            response_id: None,
            version: None,
            in_response_to: None,
            destination: None,
            status: StatusInfo::default(),
            issuers: Ok(Vec::new()),
            name_id: Ok(None),
            assertion_id: None,
            session_index: None,
            session_expires_at: None,
            not_before: None,
            not_on_or_after: None,
            conditions_count: 0,
            authn_statement_count: 0,
            audiences: Vec::new(),
            subject_confirmations: Vec::new(),
            attributes: Attributes::default(),
            duplicate_attribute: None,
            attribute_error: None,
        }
    }
}

/// Extract all fields. Response-level data comes from the original document;
/// assertion-level data from the signed scope in the working document.
pub(crate) fn extract(
    original: &roxmltree::Document<'_>,
    working: &roxmltree::Document<'_>,
    signed_id: Option<&str>,
    sp_keys: &[Key],
) -> Extracted {
    let mut out = Extracted::default();

    if let Some(response) = scope::response_element(original) {
        out.response_id = response.attribute(ns::attr::ID).map(str::to_owned);
        out.version = response.attribute(ns::attr::VERSION).map(str::to_owned);
        out.in_response_to = response
            .attribute(ns::attr::IN_RESPONSE_TO)
            .map(str::to_owned);
        out.destination = response.attribute(ns::attr::DESTINATION).map(str::to_owned);
        out.status = extract_status(response);
    }

    out.issuers = extract_issuers(original, working, signed_id);

    let Some(signed_id) = signed_id else {
        return out;
    };
    let Some(assertion) = scope::signed_assertion(working, signed_id) else {
        return out;
    };

    out.assertion_id = assertion.attribute(ns::attr::ID).map(str::to_owned);

    // Subject / NameID
    out.name_id = extract_name_id(assertion, sp_keys);
    out.subject_confirmations = extract_subject_confirmations(assertion);

    // Conditions
    let conditions = sigtuna_xml::find_children(assertion, ns::ASSERTION, ns::node::CONDITIONS);
    out.conditions_count = conditions.len();
    if let Some(conditions) = conditions.first() {
        out.not_before = conditions
            .attribute(ns::attr::NOT_BEFORE)
            .and_then(parse_time);
        out.not_on_or_after = conditions
            .attribute(ns::attr::NOT_ON_OR_AFTER)
            .and_then(parse_time);
        for restriction in
            sigtuna_xml::find_children(*conditions, ns::ASSERTION, ns::node::AUDIENCE_RESTRICTION)
        {
            for audience in
                sigtuna_xml::find_children(restriction, ns::ASSERTION, ns::node::AUDIENCE)
            {
                if let Some(text) = sigtuna_xml::element_text(audience) {
                    out.audiences.push(text.to_owned());
                }
            }
        }
    }

    // AuthnStatement
    let authn_statements =
        sigtuna_xml::find_children(assertion, ns::ASSERTION, ns::node::AUTHN_STATEMENT);
    out.authn_statement_count = authn_statements.len();
    if let Some(statement) = authn_statements.first() {
        out.session_index = statement
            .attribute(ns::attr::SESSION_INDEX)
            .map(str::to_owned);
        out.session_expires_at = statement
            .attribute(ns::attr::SESSION_NOT_ON_OR_AFTER)
            .and_then(parse_time);
    }

    // AttributeStatement
    extract_attributes(assertion, sp_keys, &mut out);

    out
}

fn extract_status(response: roxmltree::Node<'_, '_>) -> StatusInfo {
    let Some(status) = sigtuna_xml::find_child(response, ns::PROTOCOL, ns::node::STATUS) else {
        return StatusInfo::default();
    };

    let message = sigtuna_xml::find_child(status, ns::PROTOCOL, ns::node::STATUS_MESSAGE)
        .and_then(sigtuna_xml::element_text)
        .map(str::to_owned);

    let Some(top) = sigtuna_xml::find_child(status, ns::PROTOCOL, ns::node::STATUS_CODE) else {
        return StatusInfo {
            code: None,
            message,
            success: false,
        };
    };
    let top_value = top.attribute(ns::attr::VALUE).unwrap_or("").to_owned();
    if top_value == saml::STATUS_SUCCESS {
        return StatusInfo {
            code: Some(top_value),
            message,
            success: true,
        };
    }

    // Failure: join the top code with every nested StatusCode.
    // descendants() yields the node itself first, hence the skip.
    let mut chain = vec![top_value];
    for nested in top
        .descendants()
        .skip(1)
        .filter(|n| sigtuna_xml::is_named(n, ns::PROTOCOL, ns::node::STATUS_CODE))
    {
        if let Some(value) = nested.attribute(ns::attr::VALUE) {
            chain.push(value.to_owned());
        }
    }
    StatusInfo {
        code: Some(chain.join(" | ")),
        message,
        success: false,
    }
}

/// Union of Response-level and Assertion-level issuers, deduplicated. Each
/// level must carry exactly one Issuer.
fn extract_issuers(
    original: &roxmltree::Document<'_>,
    working: &roxmltree::Document<'_>,
    signed_id: Option<&str>,
) -> Result<Vec<String>, String> {
    let mut issuers: Vec<String> = Vec::new();

    let response = scope::response_element(original)
        .ok_or_else(|| "Issuer of the Response not found or multiple.".to_owned())?;
    let response_issuers = sigtuna_xml::find_children(response, ns::ASSERTION, ns::node::ISSUER);
    if response_issuers.len() != 1 {
        return Err("Issuer of the Response not found or multiple.".to_owned());
    }
    if let Some(text) = sigtuna_xml::element_text(response_issuers[0]) {
        issuers.push(text.to_owned());
    }

    if let Some(assertion) = signed_id.and_then(|id| scope::signed_assertion(working, id)) {
        let assertion_issuers =
            sigtuna_xml::find_children(assertion, ns::ASSERTION, ns::node::ISSUER);
        if assertion_issuers.len() != 1 {
            return Err("Issuer of the Assertion not found or multiple.".to_owned());
        }
        if let Some(text) = sigtuna_xml::element_text(assertion_issuers[0]) {
            let text = text.to_owned();
            if !issuers.contains(&text) {
                issuers.push(text);
            }
        }
    }

    Ok(issuers)
}

/// NameID extraction: an `<EncryptedID>` is preferred over a plaintext
/// `<NameID>`.
fn extract_name_id(
    assertion: roxmltree::Node<'_, '_>,
    sp_keys: &[Key],
) -> Result<Option<NameIdData>, String> {
    let Some(subject) = sigtuna_xml::find_child(assertion, ns::ASSERTION, ns::node::SUBJECT)
    else {
        return Ok(None);
    };

    if let Some(encrypted) = sigtuna_xml::find_child(subject, ns::ASSERTION, ns::node::ENCRYPTED_ID)
    {
        let fragment =
            decrypt_node(encrypted, sp_keys, ElementKind::NameId).map_err(|e| e.to_string())?;
        let wrapped = wrap_fragment(&fragment, ElementKind::NameId);
        let doc = sigtuna_xml::parse(&wrapped).map_err(|e| e.to_string())?;
        let name_id = doc
            .root_element()
            .first_element_child()
            .ok_or_else(|| "decrypted EncryptedID is empty".to_owned())?;
        debug!("NameID recovered from EncryptedID");
        return Ok(Some(read_name_id(name_id)));
    }

    match sigtuna_xml::find_child(subject, ns::ASSERTION, ns::node::NAME_ID) {
        Some(name_id) => Ok(Some(read_name_id(name_id))),
        None => Ok(None),
    }
}

fn read_name_id(node: roxmltree::Node<'_, '_>) -> NameIdData {
    NameIdData {
        value: sigtuna_xml::element_text(node).map(str::to_owned),
        format: node.attribute(ns::attr::FORMAT).map(str::to_owned),
        sp_name_qualifier: node
            .attribute(ns::attr::SP_NAME_QUALIFIER)
            .map(str::to_owned),
        name_qualifier: node.attribute(ns::attr::NAME_QUALIFIER).map(str::to_owned),
    }
}

fn extract_subject_confirmations(
    assertion: roxmltree::Node<'_, '_>,
) -> Vec<SubjectConfirmationInfo> {
    let Some(subject) = sigtuna_xml::find_child(assertion, ns::ASSERTION, ns::node::SUBJECT)
    else {
        return Vec::new();
    };

    sigtuna_xml::find_children(subject, ns::ASSERTION, ns::node::SUBJECT_CONFIRMATION)
        .into_iter()
        .map(|confirmation| {
            let data = sigtuna_xml::find_child(
                confirmation,
                ns::ASSERTION,
                ns::node::SUBJECT_CONFIRMATION_DATA,
            )
            .map(|data| SubjectConfirmationData {
                in_response_to: data
                    .attribute(ns::attr::IN_RESPONSE_TO)
                    .map(str::to_owned),
                not_before: data.attribute(ns::attr::NOT_BEFORE).and_then(parse_time),
                not_on_or_after: data
                    .attribute(ns::attr::NOT_ON_OR_AFTER)
                    .and_then(parse_time),
                recipient: data.attribute(ns::attr::RECIPIENT).map(str::to_owned),
            });
            SubjectConfirmationInfo {
                method: confirmation.attribute(ns::attr::METHOD).map(str::to_owned),
                data,
            }
        })
        .collect()
}

fn extract_attributes(
    assertion: roxmltree::Node<'_, '_>,
    sp_keys: &[Key],
    out: &mut Extracted,
) {
    for statement in
        sigtuna_xml::find_children(assertion, ns::ASSERTION, ns::node::ATTRIBUTE_STATEMENT)
    {
        for child in statement.children().filter(|n| n.is_element()) {
            if sigtuna_xml::is_named(&child, ns::ASSERTION, ns::node::ATTRIBUTE) {
                read_attribute(child, out);
            } else if sigtuna_xml::is_named(&child, ns::ASSERTION, ns::node::ENCRYPTED_ATTRIBUTE) {
                match decrypt_node(child, sp_keys, ElementKind::Attribute) {
                    Ok(fragment) => {
                        let wrapped = wrap_fragment(&fragment, ElementKind::Attribute);
                        match sigtuna_xml::parse(&wrapped) {
                            Ok(doc) => {
                                if let Some(attribute) = doc.root_element().first_element_child()
                                {
                                    read_attribute(attribute, out);
                                }
                            }
                            Err(e) => {
                                out.attribute_error.get_or_insert(e.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        out.attribute_error.get_or_insert(e.to_string());
                    }
                }
            }
        }
    }
}

fn read_attribute(attribute: roxmltree::Node<'_, '_>, out: &mut Extracted) {
    let Some(name) = attribute.attribute(ns::attr::NAME) else {
        return;
    };

    if out.attributes.contains(name) {
        out.duplicate_attribute.get_or_insert(name.to_owned());
    }

    let mut values: Vec<Option<String>> = Vec::new();
    for value in
        sigtuna_xml::find_children(attribute, ns::ASSERTION, ns::node::ATTRIBUTE_VALUE)
    {
        let element_children: Vec<_> = value.children().filter(|n| n.is_element()).collect();
        if element_children.is_empty() {
            // xsi:nil in {"true","1"} is an explicit null, anything else
            // (including "0") is the text value.
            let nil = value
                .attribute((ns::XSI, ns::attr::NIL))
                .is_some_and(|v| v == "true" || v == "1");
            if nil {
                values.push(None);
            } else {
                values.push(Some(value.text().unwrap_or("").trim().to_owned()));
            }
        } else {
            // NameID (or similar) children: qualify the text with the
            // NameQualifier when present.
            for child in element_children {
                let text = sigtuna_xml::element_text(child).unwrap_or("");
                let qualified = match child.attribute(ns::attr::NAME_QUALIFIER) {
                    Some(q) => format!("{q}/{text}"),
                    None => text.to_owned(),
                };
                values.push(Some(qualified));
            }
        }
    }

    out.attributes.add(name, values);
}

/// Lenient ISO-8601 instant parsing. IdPs vary between `Z`, numeric
/// offsets, and fractional seconds; a handful omit the offset entirely.
pub(crate) fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
