#![forbid(unsafe_code)]

//! Test fixture construction: assembles SAML responses and signs/encrypts
//! them at test runtime with the same C14N and crypto code the verifier
//! uses, plus static key/cert fixtures under `testdata/`.

use crate::settings::{Settings, ValidationOptions};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use pkcs8::DecodePrivateKey;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns};
use sigtuna_crypto::sign::VerificationKey;
use sigtuna_xml::NodeSet;

pub(crate) const IDP_KEY_PEM: &str = include_str!("../testdata/idp_key.pem");
pub(crate) const IDP_CERT_PEM: &str = include_str!("../testdata/idp_cert.pem");
pub(crate) const IDP_CERT_EXPIRED_PEM: &str = include_str!("../testdata/idp_cert_expired.pem");
pub(crate) const IDP2_CERT_PEM: &str = include_str!("../testdata/idp2_cert.pem");
pub(crate) const SP_KEY_PEM: &str = include_str!("../testdata/sp_key.pem");
pub(crate) const SP2_KEY_PEM: &str = include_str!("../testdata/sp2_key.pem");

pub(crate) const SP_ENTITY_ID: &str = "https://sp.example.com/metadata";
pub(crate) const ACS_URL: &str = "https://sp.example.com/acs";
pub(crate) const IDP_ENTITY_ID: &str = "https://idp.example.com";

pub(crate) const RESPONSE_ID: &str = "id-response-1";
pub(crate) const ASSERTION_ID: &str = "id-assertion-1";

/// Which elements carry a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignWhat {
    Assertion,
    Response,
    Both,
    Nothing,
}

/// Assembles a response document the way a well-behaved IdP would.
pub(crate) struct ResponseBuilder {
    pub now: DateTime<Utc>,
    pub response_id: Option<String>,
    pub assertion_id: String,
    pub version: String,
    pub issuer: String,
    pub assertion_issuer: Option<String>,
    pub destination: Option<String>,
    pub in_response_to: Option<String>,
    pub status_code: String,
    pub status_message: Option<String>,

    pub name_id: Option<String>,
    pub name_id_format: Option<String>,
    pub name_id_spnamequalifier: Option<String>,
    pub encrypt_name_id: bool,

    pub conditions: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub audiences: Vec<String>,
    pub omit_audience_restriction: bool,

    pub subject_confirmation: bool,
    pub sc_method: Option<String>,
    pub sc_recipient: Option<String>,
    pub sc_in_response_to: Option<String>,
    pub sc_not_on_or_after: Option<DateTime<Utc>>,

    pub omit_authn_statement: bool,
    pub session_index: Option<String>,
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    pub attributes: Vec<(String, Vec<String>)>,
    pub raw_attribute_xml: Option<String>,
    pub encrypted_attribute: Option<(String, String)>,

    pub sign: SignWhat,
    pub sign_key_pem: &'static str,
    pub embed_cert_pem: Option<&'static str>,
    pub encrypt_assertion: bool,
}

impl ResponseBuilder {
    /// A response that passes every default validation.
    pub fn happy(now: DateTime<Utc>) -> Self {
        Self {
            now,
            response_id: Some(RESPONSE_ID.to_owned()),
            assertion_id: ASSERTION_ID.to_owned(),
            version: "2.0".to_owned(),
            issuer: IDP_ENTITY_ID.to_owned(),
            assertion_issuer: None,
            destination: Some(ACS_URL.to_owned()),
            in_response_to: None,
            status_code: sigtuna_core::saml::STATUS_SUCCESS.to_owned(),
            status_message: None,
            name_id: Some("user@example.com".to_owned()),
            name_id_format: Some(sigtuna_core::saml::NAMEID_EMAIL_ADDRESS.to_owned()),
            name_id_spnamequalifier: None,
            encrypt_name_id: false,
            conditions: Some((now - Duration::minutes(5), now + Duration::minutes(5))),
            audiences: vec![SP_ENTITY_ID.to_owned()],
            omit_audience_restriction: false,
            subject_confirmation: true,
            sc_method: Some(sigtuna_core::saml::CM_BEARER.to_owned()),
            sc_recipient: Some(ACS_URL.to_owned()),
            sc_in_response_to: None,
            sc_not_on_or_after: Some(now + Duration::minutes(5)),
            omit_authn_statement: false,
            session_index: Some("sess-1".to_owned()),
            session_not_on_or_after: Some(now + Duration::hours(8)),
            attributes: vec![("mail".to_owned(), vec!["user@example.com".to_owned()])],
            raw_attribute_xml: None,
            encrypted_attribute: None,
            sign: SignWhat::Assertion,
            sign_key_pem: IDP_KEY_PEM,
            embed_cert_pem: None,
            encrypt_assertion: false,
        }
    }

    /// The matching SP settings for the happy-path response.
    pub fn settings() -> Settings {
        Settings {
            sp_entity_id: SP_ENTITY_ID.to_owned(),
            assertion_consumer_service_url: ACS_URL.to_owned(),
            idp_entity_id: IDP_ENTITY_ID.to_owned(),
            idp_cert: Some(IDP_CERT_PEM.to_owned()),
            sp_decryption_keys: vec![SP_KEY_PEM.to_owned()],
            ..Settings::default()
        }
    }

    pub fn options() -> ValidationOptions {
        ValidationOptions::default()
    }

    /// Assemble, sign, and (optionally) encrypt the document.
    pub fn build(&self) -> String {
        let mut xml = self.document_xml();

        if matches!(self.sign, SignWhat::Assertion | SignWhat::Both) {
            xml = sign_element(&xml, &self.assertion_id, self.sign_key_pem, self.embed_cert_pem);
        }
        if self.encrypt_assertion {
            xml = encrypt_assertion_in_document(&xml, SP_KEY_PEM);
        }
        if matches!(self.sign, SignWhat::Response | SignWhat::Both) {
            if let Some(response_id) = &self.response_id {
                xml = sign_element(&xml, response_id, self.sign_key_pem, self.embed_cert_pem);
            }
        }
        xml
    }

    fn instant(t: DateTime<Utc>) -> String {
        t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    fn document_xml(&self) -> String {
        let now = Self::instant(self.now);
        let mut out = String::new();

        out.push_str(&format!(
            "<samlp:Response xmlns:samlp=\"{}\" xmlns:saml=\"{}\"",
            ns::PROTOCOL,
            ns::ASSERTION
        ));
        if let Some(id) = &self.response_id {
            out.push_str(&format!(" ID=\"{id}\""));
        }
        out.push_str(&format!(" Version=\"{}\" IssueInstant=\"{now}\"", self.version));
        if let Some(destination) = &self.destination {
            out.push_str(&format!(" Destination=\"{destination}\""));
        }
        if let Some(irt) = &self.in_response_to {
            out.push_str(&format!(" InResponseTo=\"{irt}\""));
        }
        out.push('>');

        out.push_str(&format!("<saml:Issuer>{}</saml:Issuer>", self.issuer));

        out.push_str("<samlp:Status>");
        out.push_str(&format!(
            "<samlp:StatusCode Value=\"{}\"></samlp:StatusCode>",
            self.status_code
        ));
        if let Some(message) = &self.status_message {
            out.push_str(&format!(
                "<samlp:StatusMessage>{message}</samlp:StatusMessage>"
            ));
        }
        out.push_str("</samlp:Status>");

        out.push_str(&self.assertion_xml(&now));
        out.push_str("</samlp:Response>");
        out
    }

    fn assertion_xml(&self, now: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "<saml:Assertion ID=\"{}\" Version=\"2.0\" IssueInstant=\"{now}\">",
            self.assertion_id
        ));
        out.push_str(&format!(
            "<saml:Issuer>{}</saml:Issuer>",
            self.assertion_issuer.as_deref().unwrap_or(&self.issuer)
        ));

        // Subject
        out.push_str("<saml:Subject>");
        if let Some(name_id) = &self.name_id {
            let mut attrs = String::new();
            if let Some(format) = &self.name_id_format {
                attrs.push_str(&format!(" Format=\"{format}\""));
            }
            if let Some(q) = &self.name_id_spnamequalifier {
                attrs.push_str(&format!(" SPNameQualifier=\"{q}\""));
            }
            let plain = format!("<saml:NameID{attrs}>{name_id}</saml:NameID>");
            if self.encrypt_name_id {
                out.push_str(&encrypt_fragment(&plain, "EncryptedID", SP_KEY_PEM));
            } else {
                out.push_str(&plain);
            }
        }
        if self.subject_confirmation {
            out.push_str("<saml:SubjectConfirmation");
            if let Some(method) = &self.sc_method {
                out.push_str(&format!(" Method=\"{method}\""));
            }
            out.push('>');
            out.push_str("<saml:SubjectConfirmationData");
            if let Some(irt) = self
                .sc_in_response_to
                .as_deref()
                .or(self.in_response_to.as_deref())
            {
                out.push_str(&format!(" InResponseTo=\"{irt}\""));
            }
            if let Some(noa) = self.sc_not_on_or_after {
                out.push_str(&format!(" NotOnOrAfter=\"{}\"", Self::instant(noa)));
            }
            if let Some(recipient) = &self.sc_recipient {
                out.push_str(&format!(" Recipient=\"{recipient}\""));
            }
            out.push_str("></saml:SubjectConfirmationData></saml:SubjectConfirmation>");
        }
        out.push_str("</saml:Subject>");

        // Conditions
        if let Some((not_before, not_on_or_after)) = self.conditions {
            out.push_str(&format!(
                "<saml:Conditions NotBefore=\"{}\" NotOnOrAfter=\"{}\">",
                Self::instant(not_before),
                Self::instant(not_on_or_after)
            ));
            if !self.omit_audience_restriction {
                out.push_str("<saml:AudienceRestriction>");
                for audience in &self.audiences {
                    out.push_str(&format!("<saml:Audience>{audience}</saml:Audience>"));
                }
                out.push_str("</saml:AudienceRestriction>");
            }
            out.push_str("</saml:Conditions>");
        }

        // AuthnStatement
        if !self.omit_authn_statement {
            out.push_str(&format!("<saml:AuthnStatement AuthnInstant=\"{now}\""));
            if let Some(index) = &self.session_index {
                out.push_str(&format!(" SessionIndex=\"{index}\""));
            }
            if let Some(noa) = self.session_not_on_or_after {
                out.push_str(&format!(" SessionNotOnOrAfter=\"{}\"", Self::instant(noa)));
            }
            out.push_str(">");
            out.push_str(
                "<saml:AuthnContext><saml:AuthnContextClassRef>\
                 urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport\
                 </saml:AuthnContextClassRef></saml:AuthnContext>",
            );
            out.push_str("</saml:AuthnStatement>");
        }

        // AttributeStatement
        let has_attribute_content = !self.attributes.is_empty()
            || self.raw_attribute_xml.is_some()
            || self.encrypted_attribute.is_some();
        if has_attribute_content {
            out.push_str("<saml:AttributeStatement>");
            for (name, values) in &self.attributes {
                out.push_str(&format!("<saml:Attribute Name=\"{name}\">"));
                for value in values {
                    out.push_str(&format!(
                        "<saml:AttributeValue>{value}</saml:AttributeValue>"
                    ));
                }
                out.push_str("</saml:Attribute>");
            }
            if let Some(raw) = &self.raw_attribute_xml {
                out.push_str(raw);
            }
            if let Some((name, value)) = &self.encrypted_attribute {
                let plain = format!(
                    "<saml:Attribute Name=\"{name}\">\
                     <saml:AttributeValue>{value}</saml:AttributeValue>\
                     </saml:Attribute>"
                );
                out.push_str(&encrypt_fragment(&plain, "EncryptedAttribute", SP_KEY_PEM));
            }
            out.push_str("</saml:AttributeStatement>");
        }

        out.push_str("</saml:Assertion>");
        out
    }
}

/// Sign the element carrying `id` with an enveloped signature placed right
/// after its Issuer child, computing digest and signature value through the
/// workspace's own C14N and crypto code.
pub(crate) fn sign_element(
    xml: &str,
    id: &str,
    key_pem: &str,
    embed_cert_pem: Option<&str>,
) -> String {
    let private = rsa::RsaPrivateKey::from_pkcs8_pem(key_pem).unwrap();

    // Digest over the element as it stands; verification removes the
    // signature again via the enveloped transform.
    let doc = sigtuna_xml::parse(xml).unwrap();
    let id_map = sigtuna_xml::build_id_map(&doc, &["ID"]);
    let target = sigtuna_xml::resolve_id(&doc, &id_map, id).unwrap();
    let set = NodeSet::tree_without_comments(target);
    let bytes = sigtuna_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&set), &[]).unwrap();
    let digest = sigtuna_crypto::digest::digest(algorithm::SHA256, &bytes).unwrap();
    let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

    let key_info = embed_cert_pem
        .map(|pem| {
            let body: String = pem.lines().filter(|l| !l.starts_with("-----")).collect();
            format!(
                "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{body}</ds:X509Certificate>\
                 </ds:X509Data></ds:KeyInfo>"
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

    // Insert after the Issuer child of the signed element.
    let id_pos = xml
        .find(&format!("ID=\"{id}\""))
        .expect("signed element present");
    let issuer_close = "</saml:Issuer>";
    let insert_at = xml[id_pos..]
        .find(issuer_close)
        .map(|i| id_pos + i + issuer_close.len())
        .expect("Issuer child present");
    let mut signed = String::new();
    signed.push_str(&xml[..insert_at]);
    signed.push_str(&signature);
    signed.push_str(&xml[insert_at..]);

    // Canonicalize the freshly inserted SignedInfo and fill the value in.
    let doc = sigtuna_xml::parse(&signed).unwrap();
    let signed_info = sigtuna_xml::find_elements(&doc, ns::DSIG, ns::node::SIGNED_INFO)
        .into_iter()
        .find(|si| {
            si.parent_element()
                .and_then(|sig| sig.parent_element())
                .and_then(|parent| parent.attribute(ns::attr::ID))
                == Some(id)
        })
        .expect("inserted SignedInfo");
    let set = NodeSet::tree_without_comments(signed_info);
    let si_bytes =
        sigtuna_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&set), &[]).unwrap();
    let alg = sigtuna_crypto::sign::from_uri(algorithm::RSA_SHA256).unwrap();
    let sig = alg.sign(&VerificationKey::Rsa(private), &si_bytes).unwrap();
    let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);

    signed.replacen(
        "<ds:SignatureValue></ds:SignatureValue>",
        &format!("<ds:SignatureValue>{sig_b64}</ds:SignatureValue>"),
        1,
    )
}

/// Encrypt an XML fragment into `<saml:{wrapper}>` carrying EncryptedData +
/// EncryptedKey, the way an IdP targets an SP's public key.
pub(crate) fn encrypt_fragment(plaintext: &str, wrapper: &str, sp_key_pem: &str) -> String {
    use rand::RngCore;

    let sp_private = rsa::RsaPrivateKey::from_pkcs8_pem(sp_key_pem).unwrap();
    let sp_public = sp_private.to_public_key();

    let mut session_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut session_key);

    let cipher = sigtuna_crypto::cipher::from_uri(algorithm::AES256_CBC).unwrap();
    let ct = cipher.encrypt(&session_key, plaintext.as_bytes()).unwrap();

    let transport = sigtuna_crypto::keytransport::from_uri(algorithm::RSA_OAEP, None).unwrap();
    let wrapped = transport.encrypt(&sp_public, &session_key).unwrap();

    let b64 = |b: &[u8]| base64::engine::general_purpose::STANDARD.encode(b);
    format!(
        concat!(
            "<saml:{wrapper}>",
            "<xenc:EncryptedData xmlns:xenc=\"http://www.w3.org/2001/04/xmlenc#\">",
            "<xenc:EncryptionMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#aes256-cbc\"></xenc:EncryptionMethod>",
            "<ds:KeyInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">",
            "<xenc:EncryptedKey>",
            "<xenc:EncryptionMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p\"></xenc:EncryptionMethod>",
            "<xenc:CipherData><xenc:CipherValue>{key}</xenc:CipherValue></xenc:CipherData>",
            "</xenc:EncryptedKey>",
            "</ds:KeyInfo>",
            "<xenc:CipherData><xenc:CipherValue>{data}</xenc:CipherValue></xenc:CipherData>",
            "</xenc:EncryptedData>",
            "</saml:{wrapper}>"
        ),
        wrapper = wrapper,
        key = b64(&wrapped),
        data = b64(&ct),
    )
}

/// Replace the plaintext `<saml:Assertion>` in a response document with an
/// `<saml:EncryptedAssertion>`.
pub(crate) fn encrypt_assertion_in_document(xml: &str, sp_key_pem: &str) -> String {
    let start = xml.find("<saml:Assertion").expect("assertion present");
    let close = "</saml:Assertion>";
    let end = xml.rfind(close).expect("assertion close present") + close.len();
    let assertion = &xml[start..end];

    let encrypted = encrypt_fragment(assertion, "EncryptedAssertion", sp_key_pem);
    let mut out = String::with_capacity(xml.len() + encrypted.len());
    out.push_str(&xml[..start]);
    out.push_str(&encrypted);
    out.push_str(&xml[end..]);
    out
}
