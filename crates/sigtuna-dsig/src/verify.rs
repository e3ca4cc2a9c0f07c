#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Locate the `<ds:Signature>` whose parent carries the signed element ID
//! 2. Read `<SignedInfo>`: CanonicalizationMethod, SignatureMethod
//! 3. For each `<Reference>`: dereference `#ID`, run transforms, compute the
//!    digest, compare
//! 4. Canonicalize `<SignedInfo>`
//! 5. Verify `<SignatureValue>` against the trust anchor

use crate::trust::TrustAnchor;
use base64::Engine;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_keys::IdpCertificate;
use sigtuna_xml::NodeSet;
use tracing::debug;

/// Per-verification options.
#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    /// Reject signatures made with an expired certificate.
    pub check_cert_expiration: bool,
    /// The clock used for the expiry check, as UNIX seconds.
    pub now_unix: i64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            check_cert_expiration: false,
            now_unix: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
        }
    }
}

/// Verify the signature whose parent element carries `signed_element_id`.
///
/// Returns `Ok(())` when every reference digest matches and the signature
/// value verifies against the trust anchor.
pub fn verify_signed_element(
    xml: &str,
    signed_element_id: &str,
    trust: &TrustAnchor,
    opts: &VerifyOptions,
) -> Result<(), Error> {
    let doc = sigtuna_xml::parse(xml)?;
    let id_map = sigtuna_xml::build_id_map(&doc, &["ID", "Id", "id"]);

    let signed_element = sigtuna_xml::resolve_id(&doc, &id_map, signed_element_id)?;
    let sig_node = sigtuna_xml::find_child(signed_element, ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MissingElement("Signature".into()))?;

    let signed_info = sigtuna_xml::find_child(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    // CanonicalizationMethod
    let c14n_method_node =
        sigtuna_xml::find_child(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
    let c14n_uri = c14n_method_node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on CanonicalizationMethod".into()))?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {c14n_uri}")))?;
    let signed_info_prefixes = read_inclusive_prefixes(c14n_method_node);

    // SignatureMethod
    let sig_method_node =
        sigtuna_xml::find_child(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
            .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
    let sig_method_uri = sig_method_node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on SignatureMethod".into()))?;

    // References
    let references = sigtuna_xml::find_children(signed_info, ns::DSIG, ns::node::REFERENCE);
    if references.is_empty() {
        return Err(Error::XmlStructure("Signature has no Reference".into()));
    }
    for reference in &references {
        verify_reference(&doc, *reference, sig_node, signed_element_id)?;
    }

    // Canonicalize SignedInfo
    let signed_info_set = NodeSet::tree_without_comments(signed_info);
    let c14n_signed_info =
        sigtuna_c14n::canonicalize_doc(&doc, c14n_mode, Some(&signed_info_set), &signed_info_prefixes)?;

    // SignatureValue
    let sig_value_node = sigtuna_xml::find_child(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let sig_value = decode_base64_text(sig_value_node.text().unwrap_or(""))
        .map_err(|e| Error::Base64(format!("SignatureValue: {e}")))?;

    let sig_alg = sigtuna_crypto::sign::from_uri(sig_method_uri)?;

    match trust {
        TrustAnchor::Certificate(cert) => {
            verify_with_cert(cert, &*sig_alg, &c14n_signed_info, &sig_value, opts)
        }
        TrustAnchor::Fingerprint { value, algorithm } => {
            let embedded = embedded_certificate(sig_node).ok_or_else(|| {
                Error::SignatureInvalid("no X509Certificate in signature KeyInfo".into())
            })?;
            if !embedded.matches_fingerprint(value, *algorithm) {
                return Err(Error::SignatureInvalid(
                    "certificate does not match the configured fingerprint".into(),
                ));
            }
            verify_with_cert(&embedded, &*sig_alg, &c14n_signed_info, &sig_value, opts)
        }
        TrustAnchor::Certificates(certs) => {
            // Key rotation: try candidates in order, first success wins and
            // clears the failures accumulated along the way.
            let mut failures: Vec<String> = Vec::new();
            let mut expired: Option<Error> = None;
            for (i, cert) in certs.iter().enumerate() {
                match verify_with_cert(cert, &*sig_alg, &c14n_signed_info, &sig_value, opts) {
                    Ok(()) => {
                        debug!(candidate = i, "signature verified after rotation");
                        return Ok(());
                    }
                    Err(e @ Error::CertificateExpired(_)) => {
                        failures.push(e.to_string());
                        expired.get_or_insert(e);
                    }
                    Err(e) => failures.push(e.to_string()),
                }
            }
            // An expired candidate still verified the signature value, so
            // it is the winning certificate; keep the distinct kind.
            if let Some(e) = expired {
                return Err(e);
            }
            Err(Error::SignatureInvalid(format!(
                "no candidate certificate verified the signature: {}",
                failures.join("; ")
            )))
        }
    }
}

fn verify_with_cert(
    cert: &IdpCertificate,
    sig_alg: &dyn sigtuna_crypto::sign::SignatureAlgorithm,
    data: &[u8],
    sig_value: &[u8],
    opts: &VerifyOptions,
) -> Result<(), Error> {
    let key = cert.public_key()?.to_verification_key();
    let valid = sig_alg.verify(&key, data, sig_value)?;
    if !valid {
        return Err(Error::SignatureInvalid(
            "signature value verification failed".into(),
        ));
    }
    if opts.check_cert_expiration && cert.is_expired_at(opts.now_unix) {
        return Err(Error::CertificateExpired(
            "the certificate that signed the response has expired".into(),
        ));
    }
    Ok(())
}

/// Verify a single `<ds:Reference>`.
///
/// SAML references must point at the signature's own parent, so the URI is
/// required to be `#<signed-element-ID>`; empty and external URIs are
/// rejected.
fn verify_reference(
    doc: &roxmltree::Document<'_>,
    reference: roxmltree::Node<'_, '_>,
    sig_node: roxmltree::Node<'_, '_>,
    signed_element_id: &str,
) -> Result<(), Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    let fragment = uri
        .strip_prefix('#')
        .filter(|f| !f.is_empty())
        .ok_or_else(|| Error::InvalidUri(format!("reference URI must be #ID, got {uri:?}")))?;
    if fragment != signed_element_id {
        return Err(Error::InvalidUri(format!(
            "reference URI #{fragment} does not match the signed element ID {signed_element_id}"
        )));
    }

    // DigestMethod and expected DigestValue
    let digest_method_node = sigtuna_xml::find_child(reference, ns::DSIG, ns::node::DIGEST_METHOD)
        .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
    let digest_uri = digest_method_node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on DigestMethod".into()))?;
    let digest_value_node = sigtuna_xml::find_child(reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
    let expected_digest = decode_base64_text(digest_value_node.text().unwrap_or(""))
        .map_err(|e| Error::Base64(format!("DigestValue: {e}")))?;

    // Dereference and apply transforms.
    let id_map = sigtuna_xml::build_id_map(doc, &["ID", "Id", "id"]);
    let target = sigtuna_xml::resolve_id(doc, &id_map, fragment)?;
    let mut node_set = NodeSet::tree_without_comments(target);

    let mut c14n_mode = C14nMode::Inclusive;
    let mut inclusive_prefixes: Vec<String> = Vec::new();

    if let Some(transforms) =
        sigtuna_xml::find_child(reference, ns::DSIG, ns::node::TRANSFORMS)
    {
        for transform in sigtuna_xml::find_children(transforms, ns::DSIG, ns::node::TRANSFORM) {
            let transform_uri = transform.attribute(ns::attr::ALGORITHM).unwrap_or("");
            match transform_uri {
                algorithm::ENVELOPED_SIGNATURE => {
                    node_set = node_set.subtract(&NodeSet::tree(sig_node));
                }
                _ => {
                    if let Some(mode) = C14nMode::from_uri(transform_uri) {
                        c14n_mode = mode;
                        inclusive_prefixes = read_inclusive_prefixes(transform);
                    } else {
                        return Err(Error::UnsupportedAlgorithm(format!(
                            "transform: {transform_uri}"
                        )));
                    }
                }
            }
        }
    }

    let bytes = sigtuna_c14n::canonicalize_doc(doc, c14n_mode, Some(&node_set), &inclusive_prefixes)?;
    let computed = sigtuna_crypto::digest::digest(digest_uri, &bytes)?;

    if computed != expected_digest {
        return Err(Error::DigestMismatch(format!(
            "URI={uri}: computed digest does not match DigestValue"
        )));
    }
    Ok(())
}

/// Extract the certificate embedded in the signature's KeyInfo, if any.
fn embedded_certificate(sig_node: roxmltree::Node<'_, '_>) -> Option<IdpCertificate> {
    let key_info = sigtuna_xml::find_child(sig_node, ns::DSIG, ns::node::KEY_INFO)?;
    let x509_data = sigtuna_xml::find_child(key_info, ns::DSIG, ns::node::X509_DATA)?;
    let cert_node = sigtuna_xml::find_child(x509_data, ns::DSIG, ns::node::X509_CERTIFICATE)?;
    let text = cert_node.text()?;
    IdpCertificate::from_pem_or_base64(text).ok()
}

/// Read an `<InclusiveNamespaces PrefixList="...">` child, if present.
fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    for child in node.children() {
        if child.is_element() && child.tag_name().name() == ns::node::INCLUSIVE_NAMESPACES {
            if let Some(prefix_list) = child.attribute(ns::attr::PREFIX_LIST) {
                return prefix_list.split_whitespace().map(str::to_owned).collect();
            }
        }
    }
    Vec::new()
}

/// Base64-decode element text, tolerating embedded whitespace.
fn decode_base64_text(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::DecodePrivateKey;
    use sigtuna_crypto::sign::VerificationKey;
    use sigtuna_keys::FingerprintAlgorithm;

    const IDP_KEY_PEM: &str = include_str!("../../sigtuna/testdata/idp_key.pem");
    const IDP_CERT_PEM: &str = include_str!("../../sigtuna/testdata/idp_cert.pem");
    const IDP_CERT_EXPIRED_PEM: &str =
        include_str!("../../sigtuna/testdata/idp_cert_expired.pem");
    const IDP2_CERT_PEM: &str = include_str!("../../sigtuna/testdata/idp2_cert.pem");

    fn cert_b64(pem: &str) -> String {
        pem.lines().filter(|l| !l.starts_with("-----")).collect()
    }

    /// Sign `<Doc ID="..">` by inserting an enveloped signature as its last
    /// child, computing digest and signature value with the same C14N code
    /// the verifier uses.
    fn sign_doc(xml: &str, id: &str, key_pem: &str, embed_cert: Option<&str>) -> String {
        let private = rsa::RsaPrivateKey::from_pkcs8_pem(key_pem).unwrap();

        // Digest over the element as signed (the enveloped transform removes
        // the signature again at verification time).
        let doc = sigtuna_xml::parse(xml).unwrap();
        let id_map = sigtuna_xml::build_id_map(&doc, &["ID"]);
        let target = sigtuna_xml::resolve_id(&doc, &id_map, id).unwrap();
        let set = NodeSet::tree_without_comments(target);
        let bytes =
            sigtuna_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&set), &[]).unwrap();
        let digest = sigtuna_crypto::digest::digest(algorithm::SHA256, &bytes).unwrap();
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

        let key_info = embed_cert
            .map(|cert| {
                format!(
                    "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                    cert_b64(cert)
                )
            })
            .unwrap_or_default();

        let signature = format!(
            concat!(
                "<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">",
                "<ds:SignedInfo>",
                "<ds:CanonicalizationMethod Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"></ds:CanonicalizationMethod>",
                "<ds:SignatureMethod Algorithm=\"http://www.w3.org/2001/04/xmldsig-more#rsa-sha256\"></ds:SignatureMethod>",
                "<ds:Reference URI=\"#{id}\">",
                "<ds:Transforms>",
                "<ds:Transform Algorithm=\"http://www.w3.org/2000/09/xmldsig#enveloped-signature\"></ds:Transform>",
                "<ds:Transform Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"></ds:Transform>",
                "</ds:Transforms>",
                "<ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"></ds:DigestMethod>",
                "<ds:DigestValue>{digest}</ds:DigestValue>",
                "</ds:Reference>",
                "</ds:SignedInfo>",
                "<ds:SignatureValue></ds:SignatureValue>",
                "{key_info}",
                "</ds:Signature>"
            ),
            id = id,
            digest = digest_b64,
            key_info = key_info,
        );

        // Insert before the closing tag of the signed element.
        let close = format!("</{}>", target.tag_name().name());
        let insert_at = xml.rfind(&close).unwrap();
        let mut signed = String::new();
        signed.push_str(&xml[..insert_at]);
        signed.push_str(&signature);
        signed.push_str(&xml[insert_at..]);

        // Canonicalize SignedInfo out of the assembled document and sign it.
        let doc = sigtuna_xml::parse(&signed).unwrap();
        let signed_info = sigtuna_xml::find_element(&doc, ns::DSIG, ns::node::SIGNED_INFO).unwrap();
        let set = NodeSet::tree_without_comments(signed_info);
        let si_bytes =
            sigtuna_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&set), &[]).unwrap();
        let alg = sigtuna_crypto::sign::from_uri(algorithm::RSA_SHA256).unwrap();
        let sig = alg
            .sign(&VerificationKey::Rsa(private), &si_bytes)
            .unwrap();
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);

        signed.replace(
            "<ds:SignatureValue></ds:SignatureValue>",
            &format!("<ds:SignatureValue>{sig_b64}</ds:SignatureValue>"),
        )
    }

    fn trust_cert(pem: &str) -> TrustAnchor {
        TrustAnchor::from_cert_text(pem).unwrap()
    }

    const TEMPLATE: &str = r#"<Doc ID="doc-1" xmlns="urn:example"><Data attr="v">payload</Data></Doc>"#;

    #[test]
    fn valid_signature_verifies() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        verify_signed_element(
            &signed,
            "doc-1",
            &trust_cert(IDP_CERT_PEM),
            &VerifyOptions::default(),
        )
        .unwrap();
    }

    #[test]
    fn tampered_content_fails_digest() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        let tampered = signed.replace("payload", "evil");
        let err = verify_signed_element(
            &tampered,
            "doc-1",
            &trust_cert(IDP_CERT_PEM),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DigestMismatch(_)));
    }

    #[test]
    fn tampered_signature_value_fails() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        // Flip the first character of the base64 signature value.
        let marker = "<ds:SignatureValue>";
        let pos = signed.find(marker).unwrap() + marker.len();
        let mut tampered = signed.clone();
        let original = tampered.as_bytes()[pos];
        let replacement = if original == b'A' { 'B' } else { 'A' };
        tampered.replace_range(pos..pos + 1, &replacement.to_string());

        let err = verify_signed_element(
            &tampered,
            "doc-1",
            &trust_cert(IDP_CERT_PEM),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::SignatureInvalid(_) | Error::Crypto(_) | Error::Base64(_)
        ));
    }

    #[test]
    fn wrong_certificate_fails() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        let err = verify_signed_element(
            &signed,
            "doc-1",
            &trust_cert(IDP2_CERT_PEM),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid(_)));
    }

    #[test]
    fn rotation_second_candidate_wins() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        let trust = TrustAnchor::from_cert_texts(&[
            IDP2_CERT_PEM.to_owned(),
            IDP_CERT_PEM.to_owned(),
        ])
        .unwrap();
        verify_signed_element(&signed, "doc-1", &trust, &VerifyOptions::default()).unwrap();
    }

    #[test]
    fn rotation_keeps_the_expired_kind_for_the_winning_cert() {
        // The second candidate verifies the signature but its validity
        // window ended in 2020.
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        let trust = TrustAnchor::from_cert_texts(&[
            IDP2_CERT_PEM.to_owned(),
            IDP_CERT_EXPIRED_PEM.to_owned(),
        ])
        .unwrap();
        let opts = VerifyOptions {
            check_cert_expiration: true,
            now_unix: 1_750_000_000,
        };
        let err = verify_signed_element(&signed, "doc-1", &trust, &opts).unwrap_err();
        assert!(matches!(err, Error::CertificateExpired(_)));

        // Without the check the expired candidate is accepted.
        let lenient = VerifyOptions {
            check_cert_expiration: false,
            now_unix: 1_750_000_000,
        };
        verify_signed_element(&signed, "doc-1", &trust, &lenient).unwrap();
    }

    #[test]
    fn fingerprint_trust_path() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, Some(IDP_CERT_PEM));
        let cert = IdpCertificate::from_pem_or_base64(IDP_CERT_PEM).unwrap();
        let fp = cert.fingerprint(FingerprintAlgorithm::Sha256);

        verify_signed_element(
            &signed,
            "doc-1",
            &TrustAnchor::Fingerprint {
                value: fp,
                algorithm: FingerprintAlgorithm::Sha256,
            },
            &VerifyOptions::default(),
        )
        .unwrap();

        let err = verify_signed_element(
            &signed,
            "doc-1",
            &TrustAnchor::Fingerprint {
                value: "deadbeef".into(),
                algorithm: FingerprintAlgorithm::Sha256,
            },
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid(_)));
    }

    #[test]
    fn reference_uri_mismatch_is_rejected() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        // Point the reference at a different fragment than the parent ID.
        let broken = signed.replace("URI=\"#doc-1\"", "URI=\"#other\"");
        let err = verify_signed_element(
            &broken,
            "doc-1",
            &trust_cert(IDP_CERT_PEM),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUri(_)));
    }

    #[test]
    fn empty_reference_uri_is_rejected() {
        let signed = sign_doc(TEMPLATE, "doc-1", IDP_KEY_PEM, None);
        let broken = signed.replace("URI=\"#doc-1\"", "URI=\"\"");
        let err = verify_signed_element(
            &broken,
            "doc-1",
            &trust_cert(IDP_CERT_PEM),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUri(_)));
    }
}
