#![forbid(unsafe_code)]

//! Structural validation against the SAML 2.0 protocol schema.
//!
//! Encodes the saml-schema-protocol-2.0.xsd constraints this processor
//! depends on: the root element, required attributes, allowed children and
//! their order, and cardinality for the Response/Assertion subset. Content
//! models that the schema leaves open (`AttributeValue`,
//! `SubjectConfirmationData`, `AuthnContext` internals, `Advice`,
//! `Extensions`) are not descended into.

use sigtuna_core::{ns, Error};

/// Validate one parsed document.
pub(crate) fn validate_document(doc: &roxmltree::Document<'_>) -> Result<(), Error> {
    let root = doc.root_element();
    if !sigtuna_xml::is_named(&root, ns::PROTOCOL, ns::node::RESPONSE) {
        return Err(structure("root element is not samlp:Response"));
    }
    validate_response(root)
}

fn structure(msg: &str) -> Error {
    Error::XmlStructure(msg.to_owned())
}

fn require_attr(node: roxmltree::Node<'_, '_>, name: &str) -> Result<(), Error> {
    if node.attribute(name).map_or(true, str::is_empty) {
        return Err(structure(&format!(
            "{} requires a {} attribute",
            node.tag_name().name(),
            name
        )));
    }
    Ok(())
}

/// Check element children against an ordered content model. Each entry is
/// `(namespace, local_name, rank)`; ranks must be non-decreasing in document
/// order. Unknown children are rejected.
fn check_children(
    node: roxmltree::Node<'_, '_>,
    model: &[(&str, &str, u8)],
) -> Result<(), Error> {
    let mut last_rank = 0u8;
    for child in node.children().filter(|n| n.is_element()) {
        let child_ns = child.tag_name().namespace().unwrap_or("");
        let child_name = child.tag_name().name();
        let Some((_, _, rank)) = model
            .iter()
            .find(|(m_ns, m_name, _)| *m_ns == child_ns && *m_name == child_name)
        else {
            return Err(structure(&format!(
                "unexpected <{}> inside <{}>",
                child_name,
                node.tag_name().name()
            )));
        };
        if *rank < last_rank {
            return Err(structure(&format!(
                "<{}> out of order inside <{}>",
                child_name,
                node.tag_name().name()
            )));
        }
        last_rank = *rank;
    }
    Ok(())
}

fn count_children(node: roxmltree::Node<'_, '_>, ns_uri: &str, name: &str) -> usize {
    sigtuna_xml::find_children(node, ns_uri, name).len()
}

fn validate_response(response: roxmltree::Node<'_, '_>) -> Result<(), Error> {
    require_attr(response, ns::attr::VERSION)?;
    require_attr(response, ns::attr::ID)?;
    require_attr(response, ns::attr::ISSUE_INSTANT)?;

    check_children(
        response,
        &[
            (ns::ASSERTION, ns::node::ISSUER, 1),
            (ns::DSIG, ns::node::SIGNATURE, 2),
            (ns::PROTOCOL, "Extensions", 3),
            (ns::PROTOCOL, ns::node::STATUS, 4),
            (ns::ASSERTION, ns::node::ASSERTION, 5),
            (ns::ASSERTION, ns::node::ENCRYPTED_ASSERTION, 5),
        ],
    )?;

    if count_children(response, ns::PROTOCOL, ns::node::STATUS) != 1 {
        return Err(structure("Response requires exactly one Status"));
    }
    if let Some(status) = sigtuna_xml::find_child(response, ns::PROTOCOL, ns::node::STATUS) {
        validate_status(status)?;
    }

    for assertion in sigtuna_xml::find_children(response, ns::ASSERTION, ns::node::ASSERTION) {
        validate_assertion(assertion)?;
    }
    Ok(())
}

fn validate_status(status: roxmltree::Node<'_, '_>) -> Result<(), Error> {
    check_children(
        status,
        &[
            (ns::PROTOCOL, ns::node::STATUS_CODE, 1),
            (ns::PROTOCOL, ns::node::STATUS_MESSAGE, 2),
            (ns::PROTOCOL, "StatusDetail", 3),
        ],
    )?;
    let codes = sigtuna_xml::find_children(status, ns::PROTOCOL, ns::node::STATUS_CODE);
    if codes.len() != 1 {
        return Err(structure("Status requires exactly one StatusCode"));
    }
    require_attr(codes[0], ns::attr::VALUE)
}

fn validate_assertion(assertion: roxmltree::Node<'_, '_>) -> Result<(), Error> {
    require_attr(assertion, ns::attr::VERSION)?;
    require_attr(assertion, ns::attr::ID)?;
    require_attr(assertion, ns::attr::ISSUE_INSTANT)?;

    check_children(
        assertion,
        &[
            (ns::ASSERTION, ns::node::ISSUER, 1),
            (ns::DSIG, ns::node::SIGNATURE, 2),
            (ns::ASSERTION, ns::node::SUBJECT, 3),
            (ns::ASSERTION, ns::node::CONDITIONS, 4),
            (ns::ASSERTION, "Advice", 5),
            (ns::ASSERTION, "Statement", 6),
            (ns::ASSERTION, ns::node::AUTHN_STATEMENT, 6),
            (ns::ASSERTION, "AuthzDecisionStatement", 6),
            (ns::ASSERTION, ns::node::ATTRIBUTE_STATEMENT, 6),
        ],
    )?;

    if count_children(assertion, ns::ASSERTION, ns::node::ISSUER) != 1 {
        return Err(structure("Assertion requires exactly one Issuer"));
    }

    if let Some(subject) = sigtuna_xml::find_child(assertion, ns::ASSERTION, ns::node::SUBJECT) {
        validate_subject(subject)?;
    }
    if let Some(conditions) =
        sigtuna_xml::find_child(assertion, ns::ASSERTION, ns::node::CONDITIONS)
    {
        validate_conditions(conditions)?;
    }
    for statement in
        sigtuna_xml::find_children(assertion, ns::ASSERTION, ns::node::AUTHN_STATEMENT)
    {
        validate_authn_statement(statement)?;
    }
    for statement in
        sigtuna_xml::find_children(assertion, ns::ASSERTION, ns::node::ATTRIBUTE_STATEMENT)
    {
        validate_attribute_statement(statement)?;
    }
    Ok(())
}

fn validate_subject(subject: roxmltree::Node<'_, '_>) -> Result<(), Error> {
    check_children(
        subject,
        &[
            (ns::ASSERTION, "BaseID", 1),
            (ns::ASSERTION, ns::node::NAME_ID, 1),
            (ns::ASSERTION, ns::node::ENCRYPTED_ID, 1),
            (ns::ASSERTION, ns::node::SUBJECT_CONFIRMATION, 2),
        ],
    )
}

fn validate_conditions(conditions: roxmltree::Node<'_, '_>) -> Result<(), Error> {
    for child in conditions.children().filter(|n| n.is_element()) {
        let name = child.tag_name().name();
        match name {
            "AudienceRestriction" => {
                if count_children(child, ns::ASSERTION, ns::node::AUDIENCE) == 0 {
                    return Err(structure("AudienceRestriction requires an Audience"));
                }
            }
            "OneTimeUse" | "ProxyRestriction" | "Condition" => {}
            other => {
                return Err(structure(&format!("unexpected <{other}> inside <Conditions>")));
            }
        }
    }
    Ok(())
}

fn validate_authn_statement(statement: roxmltree::Node<'_, '_>) -> Result<(), Error> {
    require_attr(statement, "AuthnInstant")?;
    if count_children(statement, ns::ASSERTION, "AuthnContext") != 1 {
        return Err(structure("AuthnStatement requires an AuthnContext"));
    }
    Ok(())
}

fn validate_attribute_statement(statement: roxmltree::Node<'_, '_>) -> Result<(), Error> {
    let mut seen = 0usize;
    for child in statement.children().filter(|n| n.is_element()) {
        if sigtuna_xml::is_named(&child, ns::ASSERTION, ns::node::ATTRIBUTE) {
            require_attr(child, ns::attr::NAME)?;
            seen += 1;
        } else if sigtuna_xml::is_named(&child, ns::ASSERTION, ns::node::ENCRYPTED_ATTRIBUTE) {
            seen += 1;
        } else {
            return Err(structure(&format!(
                "unexpected <{}> inside <AttributeStatement>",
                child.tag_name().name()
            )));
        }
    }
    if seen == 0 {
        return Err(structure("AttributeStatement requires at least one Attribute"));
    }
    Ok(())
}
