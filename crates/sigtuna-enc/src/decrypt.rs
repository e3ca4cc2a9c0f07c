#![forbid(unsafe_code)]

//! XML-Enc decryption.
//!
//! Processing order:
//! 1. Find `<xenc:EncryptedData>` under the encrypted SAML element
//! 2. Read the data `<EncryptionMethod>` URI
//! 3. Find the `<xenc:EncryptedKey>` (inside `<ds:KeyInfo>` or as a sibling
//!    of `EncryptedData`), unwrap the session key with each SP key in order
//! 4. Decrypt `<CipherData>/<CipherValue>` with the session key
//! 5. Peel the expected element out of the plaintext and sanity-parse it
//!    inside a namespace-declaring wrapper

use crate::peel::peel;
use base64::Engine;
use sigtuna_core::{ns, Error};
use sigtuna_keys::Key;
use tracing::debug;

/// The three SAML element kinds XML-Enc applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Assertion,
    NameId,
    Attribute,
}

impl ElementKind {
    /// Local name of the element recovered from the ciphertext.
    pub fn expected_name(&self) -> &'static str {
        match self {
            Self::Assertion => ns::node::ASSERTION,
            Self::NameId => ns::node::NAME_ID,
            Self::Attribute => ns::node::ATTRIBUTE,
        }
    }
}

/// Wrap a decrypted fragment in a parent that declares the namespaces the
/// fragment may have inherited from its original document. Attributes
/// additionally need `xsi` for `xsi:nil`/`xsi:type` on values.
pub fn wrap_fragment(fragment: &str, kind: ElementKind) -> String {
    match kind {
        ElementKind::Attribute => format!(
            "<node xmlns=\"{}\" xmlns:saml=\"{}\" xmlns:xsi=\"{}\">{}</node>",
            ns::ASSERTION,
            ns::ASSERTION,
            ns::XSI,
            fragment
        ),
        _ => format!(
            "<node xmlns=\"{}\" xmlns:saml=\"{}\">{}</node>",
            ns::ASSERTION,
            ns::ASSERTION,
            fragment
        ),
    }
}

/// Decrypt one encrypted SAML element (`EncryptedAssertion`, `EncryptedID`,
/// or `EncryptedAttribute`) and return the recovered element's XML text.
///
/// SP keys are tried in order; the first key that unwraps the session key
/// and yields well-formed plaintext wins.
pub fn decrypt_node(
    node: roxmltree::Node<'_, '_>,
    sp_keys: &[Key],
    kind: ElementKind,
) -> Result<String, Error> {
    if sp_keys.is_empty() {
        return Err(Error::DecryptionKeyMissing);
    }

    let enc_data = sigtuna_xml::find_child(node, ns::ENC, ns::node::ENCRYPTED_DATA)
        .ok_or_else(|| Error::MissingElement("EncryptedData".into()))?;

    // Data cipher
    let enc_method = sigtuna_xml::find_child(enc_data, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .ok_or_else(|| Error::MissingElement("EncryptionMethod".into()))?;
    let cipher_uri = enc_method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on EncryptionMethod".into()))?;
    let cipher_alg = sigtuna_crypto::cipher::from_uri(cipher_uri)?;

    let cipher_bytes = read_cipher_value(enc_data)?;

    // Session key carrier: EncryptedKey inside EncryptedData's KeyInfo, or a
    // sibling under the encrypted SAML element (both appear in the wild).
    let enc_key = find_encrypted_key(node, enc_data)
        .ok_or_else(|| Error::DecryptionFailed("no EncryptedKey found".into()))?;

    let transport_method =
        sigtuna_xml::find_child(enc_key, ns::ENC, ns::node::ENCRYPTION_METHOD)
            .ok_or_else(|| Error::MissingElement("EncryptionMethod on EncryptedKey".into()))?;
    let transport_uri = transport_method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| {
            Error::MissingAttribute("Algorithm on EncryptedKey EncryptionMethod".into())
        })?;
    // RSA-OAEP may declare a digest; the spec default is SHA-1.
    let oaep_digest = sigtuna_xml::find_child(transport_method, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM));
    let transport = sigtuna_crypto::keytransport::from_uri(transport_uri, oaep_digest)?;

    let wrapped_key = read_cipher_value(enc_key)?;

    // Key rotation: try each configured SP key in order.
    let mut last_error: Option<Error> = None;
    for (i, key) in sp_keys.iter().enumerate() {
        let Some(private) = key.rsa_private_key() else {
            continue;
        };
        let session_key = match transport.decrypt(private, &wrapped_key) {
            Ok(k) => k,
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        };

        // Some stacks transport a longer session key than the data cipher
        // needs; truncate rather than reject.
        let expected = cipher_alg.key_size();
        let effective = if session_key.len() > expected {
            &session_key[..expected]
        } else {
            &session_key[..]
        };

        match cipher_alg.decrypt(effective, &cipher_bytes) {
            Ok(plaintext) => {
                debug!(key_index = i, kind = ?kind, "decrypted element");
                let fragment = peel(&plaintext, kind.expected_name())?;
                // Sanity-parse inside the namespace wrapper before handing
                // the fragment back.
                sigtuna_xml::parse(&wrap_fragment(fragment, kind))
                    .map_err(|e| Error::MalformedPlaintext(format!("{e}")))?;
                return Ok(fragment.to_owned());
            }
            Err(e) => {
                last_error = Some(e);
            }
        }
    }

    Err(Error::DecryptionFailed(
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no usable RSA decryption key".into()),
    ))
}

/// Decrypt the `<EncryptedAssertion>` in a Response document and return the
/// document text with the plaintext `<Assertion>` substituted in its place.
pub fn decrypt_assertion_document(xml: &str, sp_keys: &[Key]) -> Result<String, Error> {
    let doc = sigtuna_xml::parse(xml)?;
    let response = sigtuna_xml::find_element(&doc, ns::PROTOCOL, ns::node::RESPONSE)
        .ok_or_else(|| Error::MissingElement("Response".into()))?;
    let encrypted = sigtuna_xml::find_child(response, ns::ASSERTION, ns::node::ENCRYPTED_ASSERTION)
        .ok_or_else(|| Error::MissingElement("EncryptedAssertion".into()))?;

    let fragment = decrypt_node(encrypted, sp_keys, ElementKind::Assertion)?;

    // Substitute the encrypted element with the recovered assertion in the
    // document text; the fragment bytes are preserved exactly so that an
    // assertion signed before encryption still verifies.
    let range = encrypted.range();
    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..range.start]);
    out.push_str(&fragment);
    out.push_str(&xml[range.end..]);

    // The substituted document must still parse.
    sigtuna_xml::parse(&out).map_err(|e| Error::MalformedPlaintext(format!("{e}")))?;
    Ok(out)
}

/// Find the `<xenc:EncryptedKey>` for an encrypted element: first inside
/// `EncryptedData/KeyInfo`, then anywhere under the encrypted element.
fn find_encrypted_key<'a, 'b>(
    encrypted_element: roxmltree::Node<'a, 'b>,
    enc_data: roxmltree::Node<'a, 'b>,
) -> Option<roxmltree::Node<'a, 'b>> {
    if let Some(key_info) = sigtuna_xml::find_child(enc_data, ns::DSIG, ns::node::KEY_INFO) {
        if let Some(ek) = sigtuna_xml::find_child(key_info, ns::ENC, ns::node::ENCRYPTED_KEY) {
            return Some(ek);
        }
    }
    encrypted_element
        .descendants()
        .find(|n| sigtuna_xml::is_named(n, ns::ENC, ns::node::ENCRYPTED_KEY))
}

/// Read and decode `CipherData/CipherValue` under an EncryptedData or
/// EncryptedKey element.
fn read_cipher_value(parent: roxmltree::Node<'_, '_>) -> Result<Vec<u8>, Error> {
    let cipher_data = sigtuna_xml::find_child(parent, ns::ENC, ns::node::CIPHER_DATA)
        .ok_or_else(|| Error::MissingElement("CipherData".into()))?;
    let cipher_value = sigtuna_xml::find_child(cipher_data, ns::ENC, ns::node::CIPHER_VALUE)
        .ok_or_else(|| Error::MissingElement("CipherValue".into()))?;
    let text: String = cipher_value
        .text()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(&text)
        .map_err(|e| Error::Base64(format!("CipherValue: {e}")))
}
