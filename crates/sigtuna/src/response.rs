#![forbid(unsafe_code)]

//! The SAML Response: construction, eager field extraction, and the
//! read-only accessor surface.

use crate::decode;
use crate::parse::{self, Extracted};
use crate::scope::{self, ScopeDoc, SignedScope, SignatureInfo};
use crate::settings::{Settings, ValidationOptions};
use crate::validate::ValidationError;
use crate::Attributes;
use chrono::{DateTime, Utc};
use sigtuna_core::{ns, Error};
use tracing::debug;

/// A SAML 2.0 Response received from the IdP.
///
/// Constructed once per callback; all fields are extracted eagerly so reads
/// after construction are cheap and the instance is effectively read-only.
/// `is_valid` recomputes the error list on every call and never accumulates
/// duplicates.
pub struct Response<'s> {
    pub(crate) settings: &'s Settings,
    pub(crate) options: ValidationOptions,

    /// The original document text.
    pub(crate) xml: String,
    /// The document with the decrypted assertion substituted, when an
    /// `<EncryptedAssertion>` was present and decryption succeeded.
    pub(crate) decrypted_xml: Option<String>,
    /// Decryption failure, surfaced during validation.
    pub(crate) decrypt_error: Option<String>,

    /// Plaintext assertion count in the original document.
    pub(crate) assertion_count: usize,
    /// Encrypted assertion count in the original document.
    pub(crate) encrypted_assertion_count: usize,
    /// Plaintext assertion count in the decrypted document.
    pub(crate) decrypted_assertion_count: Option<usize>,

    /// Signature shape info from the working document.
    pub(crate) signatures: Vec<SignatureInfo>,
    /// The resolved signed scope, when a usable signature exists.
    pub(crate) scope: Option<SignedScope>,

    pub(crate) extracted: Extracted,

    /// Errors from the most recent `is_valid` call.
    pub(crate) validation_errors: Vec<String>,

    /// Injected clock for tests; `None` means the real time.
    pub(crate) now_override: Option<DateTime<Utc>>,
}

impl<'s> Response<'s> {
    /// Decode and parse a SAMLResponse payload.
    ///
    /// Fails on undecodable or unparseable input (`malformed_input`); every
    /// other problem is reported through validation.
    pub fn new(
        payload: &str,
        settings: &'s Settings,
        options: ValidationOptions,
    ) -> Result<Self, Error> {
        if payload.trim().is_empty() {
            return Err(Error::XmlStructure("blank response payload".into()));
        }

        let xml = decode::decode_payload(payload)?;
        let doc = sigtuna_xml::parse(&xml)?;

        let response_node = scope::response_element(&doc);
        let assertion_count = response_node
            .map(|r| sigtuna_xml::find_children(r, ns::ASSERTION, ns::node::ASSERTION).len())
            .unwrap_or(0);
        let encrypted_assertion_count = response_node
            .map(|r| {
                sigtuna_xml::find_children(r, ns::ASSERTION, ns::node::ENCRYPTED_ASSERTION).len()
            })
            .unwrap_or(0);

        let sp_keys = settings.decryption_keys();

        // Decrypt the assertion into a second document; the original is
        // kept untouched.
        let mut decrypt_error = None;
        let decrypted_xml = if encrypted_assertion_count > 0 {
            if sp_keys.is_empty() {
                decrypt_error = Some(Error::DecryptionKeyMissing.to_string());
                None
            } else {
                match sigtuna_enc::decrypt_assertion_document(&xml, &sp_keys) {
                    Ok(decrypted) => Some(decrypted),
                    Err(e) => {
                        decrypt_error = Some(e.to_string());
                        None
                    }
                }
            }
        } else {
            None
        };

        // The working document holds the plaintext assertion.
        let decrypted_doc = match &decrypted_xml {
            Some(text) => Some(sigtuna_xml::parse(text)?),
            None => None,
        };
        let working_doc = decrypted_doc.as_ref().unwrap_or(&doc);

        let decrypted_assertion_count = decrypted_doc.as_ref().map(|d| {
            scope::response_element(d)
                .map(|r| sigtuna_xml::find_children(r, ns::ASSERTION, ns::node::ASSERTION).len())
                .unwrap_or(0)
        });

        let signatures = scope::scan_signatures(working_doc);

        // Scope resolution: a Response-level signature on the original
        // document wins; otherwise the assertion signature in the working
        // document.
        let scope = if let Some(id) = scope::response_signature_id(&doc) {
            Some(SignedScope {
                doc: ScopeDoc::Original,
                id,
            })
        } else {
            scope::assertion_signature_id(working_doc).map(|id| SignedScope {
                doc: if decrypted_xml.is_some() {
                    ScopeDoc::Decrypted
                } else {
                    ScopeDoc::Original
                },
                id,
            })
        };
        debug!(?scope, signatures = signatures.len(), "resolved signed scope");

        let extracted = parse::extract(
            &doc,
            working_doc,
            scope.as_ref().map(|s| s.id.as_str()),
            &sp_keys,
        );

        // The parsed documents borrow the text buffers that move into the
        // struct below.
        drop(decrypted_doc);
        drop(doc);

        Ok(Self {
            settings,
            options,
            xml,
            decrypted_xml,
            decrypt_error,
            assertion_count,
            encrypted_assertion_count,
            decrypted_assertion_count,
            signatures,
            scope,
            extracted,
            validation_errors: Vec::new(),
            now_override: None,
        })
    }

    /// Run the validation sequence.
    ///
    /// With `collect_errors` every predicate runs and all failures are
    /// recorded; without it the first failure aborts. Both modes produce
    /// the same verdict.
    pub fn is_valid(&mut self, collect_errors: bool) -> bool {
        self.validation_errors = self.run_validations(collect_errors);
        self.validation_errors.is_empty()
    }

    /// Strict entry point: the first failing predicate becomes the error.
    pub fn validate_strict(&self) -> Result<(), ValidationError> {
        match self.run_validations(false).into_iter().next() {
            Some(message) => Err(ValidationError(message)),
            None => Ok(()),
        }
    }

    /// Soft-aware entry point: in soft mode (the default) failures land in
    /// [`errors`](Self::errors); otherwise the first failure is returned.
    pub fn validate(&mut self) -> Result<bool, ValidationError> {
        if self.settings.soft {
            Ok(self.is_valid(true))
        } else {
            self.validate_strict()?;
            self.validation_errors.clear();
            Ok(true)
        }
    }

    /// Errors recorded by the most recent `is_valid` call.
    pub fn errors(&self) -> &[String] {
        &self.validation_errors
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The authenticated subject identifier.
    pub fn name_id(&self) -> Option<&str> {
        self.name_id_data()?.value.as_deref()
    }

    pub fn name_id_format(&self) -> Option<&str> {
        self.name_id_data()?.format.as_deref()
    }

    pub fn name_id_spnamequalifier(&self) -> Option<&str> {
        self.name_id_data()?.sp_name_qualifier.as_deref()
    }

    pub fn name_id_namequalifier(&self) -> Option<&str> {
        self.name_id_data()?.name_qualifier.as_deref()
    }

    fn name_id_data(&self) -> Option<&parse::NameIdData> {
        self.extracted.name_id.as_ref().ok()?.as_ref()
    }

    /// The session index from the AuthnStatement.
    pub fn sessionindex(&self) -> Option<&str> {
        self.extracted.session_index.as_deref()
    }

    /// `SessionNotOnOrAfter` from the AuthnStatement.
    pub fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        self.extracted.session_expires_at
    }

    /// Attributes from the signed assertion.
    pub fn attributes(&self) -> &Attributes {
        &self.extracted.attributes
    }

    /// The StatusCode value; on failure, the `" | "`-joined chain.
    pub fn status_code(&self) -> Option<&str> {
        self.extracted.status.code.as_deref()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.extracted.status.message.as_deref()
    }

    /// Whether the response status is Success.
    pub fn success(&self) -> bool {
        self.extracted.status.success
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.extracted.not_before
    }

    pub fn not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.extracted.not_on_or_after
    }

    /// Audience values under the conditions' audience restrictions.
    pub fn audiences(&self) -> &[String] {
        &self.extracted.audiences
    }

    /// Response- and assertion-level issuers, deduplicated.
    pub fn issuers(&self) -> &[String] {
        self.extracted
            .issuers
            .as_ref()
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn in_response_to(&self) -> Option<&str> {
        self.extracted.in_response_to.as_deref()
    }

    pub fn destination(&self) -> Option<&str> {
        self.extracted.destination.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.extracted.response_id.as_deref()
    }

    pub fn assertion_id(&self) -> Option<&str> {
        self.extracted.assertion_id.as_deref()
    }

    /// Whether the original response carried an `<EncryptedAssertion>`.
    pub fn assertion_encrypted(&self) -> bool {
        self.encrypted_assertion_count > 0
    }

    /// The original document text.
    pub fn document(&self) -> &str {
        &self.xml
    }

    /// The decrypted document text, when decryption took place.
    pub fn decrypted_document(&self) -> Option<&str> {
        self.decrypted_xml.as_deref()
    }

    /// The clock used by timing predicates.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.now_override.unwrap_or_else(Utc::now)
    }
}
