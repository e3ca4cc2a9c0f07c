#![forbid(unsafe_code)]

//! The validation engine.
//!
//! Predicates run in a fixed order. In collect mode every predicate runs
//! and failures accumulate; in short-circuit mode the first failure aborts.
//! Both modes always produce the same verdict.

use crate::response::Response;
use crate::scope::ScopeDoc;
use sigtuna_core::{saml, Error};
use sigtuna_dsig::VerifyOptions;
use tracing::debug;
use url::Url;

/// The first failing predicate's message, for strict-mode callers.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl Response<'_> {
    pub(crate) fn run_validations(&self, collect_errors: bool) -> Vec<String> {
        let mut errors = Vec::new();

        macro_rules! run {
            ($($check:ident),+ $(,)?) => {
                $(
                    self.$check(&mut errors);
                    if !collect_errors && !errors.is_empty() {
                        return errors;
                    }
                )+
            };
        }

        run!(
            validate_response_state,
            validate_version,
            validate_id,
            validate_success_status,
            validate_num_assertion,
            validate_no_duplicated_attributes,
            validate_signed_elements,
            validate_structure,
            validate_in_response_to,
            validate_one_conditions,
            validate_conditions,
            validate_one_authnstatement,
            validate_audience,
            validate_destination,
            validate_issuer,
            validate_session_expiration,
            validate_subject_confirmation,
            validate_name_id,
            validate_signature,
        );

        errors
    }

    // ── 1: response state ────────────────────────────────────────────

    fn validate_response_state(&self, errors: &mut Vec<String>) {
        if !self.settings.has_trust_anchor() {
            errors.push("No fingerprint or certificate on settings".into());
        }
        if let Some(decrypt_error) = &self.decrypt_error {
            errors.push(decrypt_error.clone());
        }
    }

    // ── 2: version ───────────────────────────────────────────────────

    fn validate_version(&self, errors: &mut Vec<String>) {
        if self.extracted.version.as_deref() != Some(saml::VERSION) {
            errors.push("Unsupported SAML version".into());
        }
    }

    // ── 3: id ────────────────────────────────────────────────────────

    fn validate_id(&self, errors: &mut Vec<String>) {
        if self.extracted.response_id.is_none() {
            errors.push("Missing ID attribute on SAML Response".into());
        }
    }

    // ── 4: success status ────────────────────────────────────────────

    fn validate_success_status(&self, errors: &mut Vec<String>) {
        if self.extracted.status.success {
            return;
        }
        let mut message = match &self.extracted.status.code {
            Some(code) => {
                format!("The status code of the Response was not Success, was {code}")
            }
            None => "The status code of the Response was not Success".to_owned(),
        };
        if let Some(status_message) = &self.extracted.status.message {
            message.push_str(" -> ");
            message.push_str(status_message);
        }
        errors.push(message);
    }

    // ── 5: assertion count ───────────────────────────────────────────

    fn validate_num_assertion(&self, errors: &mut Vec<String>) {
        let original_total = self.assertion_count + self.encrypted_assertion_count;
        let decrypted_ok = self.decrypted_assertion_count.map_or(true, |c| c == 1);
        if original_total != 1 || !decrypted_ok {
            errors.push("SAML Response must contain 1 assertion".into());
        }
    }

    // ── 6: duplicated attributes ─────────────────────────────────────

    fn validate_no_duplicated_attributes(&self, errors: &mut Vec<String>) {
        if !self.options.check_duplicated_attributes {
            return;
        }
        if let Some(attribute_error) = &self.extracted.attribute_error {
            errors.push(attribute_error.clone());
        }
        if self.extracted.duplicate_attribute.is_some() {
            errors.push("Found an Attribute element with duplicated Name".into());
        }
    }

    // ── 7: signed elements ───────────────────────────────────────────

    fn validate_signed_elements(&self, errors: &mut Vec<String>) {
        let signatures = &self.signatures;
        if signatures.is_empty() || signatures.len() > 2 {
            errors.push(
                "Found an unexpected number of Signature Element. SAML Response rejected".into(),
            );
            return;
        }

        let mut seen_ids: Vec<&str> = Vec::new();
        let mut seen_refs: Vec<&str> = Vec::new();
        let mut assertion_signed = false;

        for signature in signatures {
            if !signature.parent_is_response() && !signature.parent_is_assertion() {
                errors.push(format!(
                    "Invalid Signature Element '{}'. SAML Response rejected",
                    signature.parent_name
                ));
                return;
            }
            let Some(id) = signature.parent_id.as_deref() else {
                errors.push("Signed Element must contain an ID. SAML Response rejected".into());
                return;
            };
            if seen_ids.contains(&id) {
                errors.push("Duplicated ID. SAML Response rejected".into());
                return;
            }
            seen_ids.push(id);

            if let Some(uri) = signature.reference_uri.as_deref() {
                let fragment = uri.strip_prefix('#').unwrap_or(uri);
                if fragment.is_empty() || fragment != id {
                    errors.push("Found an invalid Signed Element. SAML Response rejected".into());
                    return;
                }
                if seen_refs.contains(&fragment) {
                    errors.push("Duplicated Reference URI. SAML Response rejected".into());
                    return;
                }
                seen_refs.push(fragment);
            }

            assertion_signed |= signature.parent_is_assertion();
        }

        if self.settings.want_assertions_signed && !assertion_signed {
            errors.push("The Assertion of the Response is not signed and the SP requires it".into());
        }
    }

    // ── 8: structure ─────────────────────────────────────────────────

    fn validate_structure(&self, errors: &mut Vec<String>) {
        let mut check = |text: &str| match sigtuna_xml::parse(text)
            .and_then(|doc| crate::schema::validate_document(&doc))
        {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "schema validation failed");
                false
            }
        };

        let mut ok = check(&self.xml);
        if let Some(decrypted) = &self.decrypted_xml {
            ok &= check(decrypted);
        }
        if !ok {
            errors.push("Invalid SAML Response. Not match the saml-schema-protocol-2.0.xsd".into());
        }
    }

    // ── 9: in response to ────────────────────────────────────────────

    fn validate_in_response_to(&self, errors: &mut Vec<String>) {
        let Some(expected) = self.options.matches_request_id.as_deref() else {
            return;
        };
        let in_response_to = self.extracted.in_response_to.as_deref();
        if in_response_to != Some(expected) {
            errors.push(format!(
                "The InResponseTo of the Response: {}, does not match the ID of the \
                 AuthNRequest sent by the SP: {expected}",
                in_response_to.unwrap_or_default()
            ));
        }
    }

    // ── 10: one conditions ───────────────────────────────────────────

    fn validate_one_conditions(&self, errors: &mut Vec<String>) {
        if self.options.skip_conditions {
            return;
        }
        if self.extracted.conditions_count != 1 {
            errors.push("The Assertion must include a Conditions element".into());
        }
    }

    // ── 11: conditions timing ────────────────────────────────────────

    fn validate_conditions(&self, errors: &mut Vec<String>) {
        if self.options.skip_conditions {
            return;
        }
        let now = self.now();
        let drift = self.options.drift();

        if let Some(not_before) = self.extracted.not_before {
            if now < not_before - drift {
                errors.push(format!(
                    "Current time is earlier than NotBefore condition ({now} < {not_before})"
                ));
            }
        }
        if let Some(not_on_or_after) = self.extracted.not_on_or_after {
            if now >= not_on_or_after + drift {
                errors.push(format!(
                    "Current time is on or after NotOnOrAfter condition ({now} >= {not_on_or_after})"
                ));
            }
        }
    }

    // ── 12: one authn statement ──────────────────────────────────────

    fn validate_one_authnstatement(&self, errors: &mut Vec<String>) {
        if self.options.skip_authnstatement {
            return;
        }
        if self.extracted.authn_statement_count != 1 {
            errors.push("The Assertion must include an AuthnStatement element".into());
        }
    }

    // ── 13: audience ─────────────────────────────────────────────────

    fn validate_audience(&self, errors: &mut Vec<String>) {
        if self.options.skip_audience || self.settings.sp_entity_id.is_empty() {
            return;
        }
        let audiences = &self.extracted.audiences;
        let sp_entity_id = &self.settings.sp_entity_id;

        if audiences.is_empty() {
            if self.settings.strict_audience_validation {
                errors.push(format!(
                    "Invalid Audiences. The <AudienceRestriction> element contained only empty \
                     <Audience> elements. Expected audience {sp_entity_id}."
                ));
            }
            return;
        }
        if !audiences.iter().any(|a| a == sp_entity_id) {
            let plural = if audiences.len() > 1 { "s" } else { "" };
            errors.push(format!(
                "Invalid Audience{plural}. The audience{plural} {}, did not match the expected \
                 audience {sp_entity_id}",
                audiences.join(",")
            ));
        }
    }

    // ── 14: destination ──────────────────────────────────────────────

    fn validate_destination(&self, errors: &mut Vec<String>) {
        if self.options.skip_destination {
            return;
        }
        // Absence of a Destination attribute is accepted.
        let Some(destination) = self.extracted.destination.as_deref() else {
            return;
        };
        if destination.is_empty() {
            errors.push("The response has an empty Destination value".into());
            return;
        }
        let acs_url = &self.settings.assertion_consumer_service_url;
        if !acs_url.is_empty() && !uri_match(destination, acs_url) {
            errors.push(format!(
                "The response was received at {destination} instead of {acs_url}"
            ));
        }
    }

    // ── 15: issuer ───────────────────────────────────────────────────

    fn validate_issuer(&self, errors: &mut Vec<String>) {
        let issuers = match &self.extracted.issuers {
            Ok(issuers) => issuers,
            Err(message) => {
                errors.push(message.clone());
                return;
            }
        };
        let idp_entity_id = &self.settings.idp_entity_id;
        if idp_entity_id.is_empty() {
            return;
        }
        for issuer in issuers {
            if !uri_match(issuer, idp_entity_id) {
                errors.push(format!(
                    "Doesn't match the issuer, expected: <{idp_entity_id}>, but was: <{issuer}>"
                ));
            }
        }
    }

    // ── 16: session expiration ───────────────────────────────────────

    fn validate_session_expiration(&self, errors: &mut Vec<String>) {
        let Some(expires_at) = self.extracted.session_expires_at else {
            return;
        };
        if self.now() >= expires_at + self.options.drift() {
            errors.push(
                "The attributes have expired, based on the SessionNotOnOrAfter of the \
                 AuthnStatement of the SAML Response"
                    .into(),
            );
        }
    }

    // ── 17: subject confirmation ─────────────────────────────────────

    fn validate_subject_confirmation(&self, errors: &mut Vec<String>) {
        if self.options.skip_subject_confirmation {
            return;
        }
        let now = self.now();
        let drift = self.options.drift();
        let acs_url = &self.settings.assertion_consumer_service_url;

        let any_valid = self.extracted.subject_confirmations.iter().any(|sc| {
            if sc.method.as_deref().is_some_and(|m| m != saml::CM_BEARER) {
                return false;
            }
            let Some(data) = &sc.data else {
                return false;
            };
            if data.in_response_to.is_some()
                && data.in_response_to != self.extracted.in_response_to
            {
                return false;
            }
            if data.not_before.is_some_and(|nb| now < nb - drift) {
                return false;
            }
            if data.not_on_or_after.is_some_and(|noa| now >= noa + drift) {
                return false;
            }
            if !self.options.skip_recipient_check
                && !acs_url.is_empty()
                && data.recipient.as_deref().is_some_and(|r| r != acs_url)
            {
                return false;
            }
            true
        });

        if !any_valid {
            errors.push("A valid SubjectConfirmation was not found on this Response".into());
        }
    }

    // ── 18: name id ──────────────────────────────────────────────────

    fn validate_name_id(&self, errors: &mut Vec<String>) {
        let name_id = match &self.extracted.name_id {
            Ok(name_id) => name_id,
            Err(message) => {
                errors.push(message.clone());
                return;
            }
        };
        match name_id {
            None => {
                if self.settings.want_name_id {
                    errors.push("No NameID element found in the Response".into());
                }
            }
            Some(data) => {
                if data.value.as_deref().map_or(true, str::is_empty) {
                    errors.push("An empty NameID value found".into());
                    return;
                }
                if !self.settings.sp_entity_id.is_empty()
                    && data
                        .sp_name_qualifier
                        .as_deref()
                        .is_some_and(|q| q != self.settings.sp_entity_id)
                {
                    errors
                        .push("The SPNameQualifier value mismatch the SP entityID value.".into());
                }
            }
        }
    }

    // ── 19: signature ────────────────────────────────────────────────

    fn validate_signature(&self, errors: &mut Vec<String>) {
        let anchor = match self.settings.trust_anchor() {
            Ok(Some(anchor)) => anchor,
            // No trust material: already reported by response_state.
            Ok(None) => return,
            Err(e) => {
                errors.push(e.to_string());
                return;
            }
        };

        let Some(scope) = &self.scope else {
            errors.push("Invalid Signature on SAML Response".into());
            return;
        };
        let xml = match scope.doc {
            ScopeDoc::Original => &self.xml,
            ScopeDoc::Decrypted => match &self.decrypted_xml {
                Some(decrypted) => decrypted,
                None => {
                    errors.push("Invalid Signature on SAML Response".into());
                    return;
                }
            },
        };

        let opts = VerifyOptions {
            check_cert_expiration: self.settings.check_idp_cert_expiration,
            now_unix: self.now().timestamp(),
        };
        match sigtuna_dsig::verify_signed_element(xml, &scope.id, &anchor, &opts) {
            Ok(()) => {}
            Err(Error::CertificateExpired(_)) => {
                errors.push("IdP x509 certificate expired".into());
            }
            Err(e) => {
                debug!(error = %e, "signature verification failed");
                errors.push("Invalid Signature on SAML Response".into());
            }
        }
    }
}

/// URI equivalence: exact match, or equality after normalizing scheme and
/// host case, default ports, and a trailing slash on the path.
fn uri_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (Url::parse(a), Url::parse(b)) {
        (Ok(ua), Ok(ub)) => {
            ua.scheme() == ub.scheme()
                && ua.host_str() == ub.host_str()
                && ua.port_or_known_default() == ub.port_or_known_default()
                && ua.path().trim_end_matches('/') == ub.path().trim_end_matches('/')
                && ua.query() == ub.query()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_match_normalizes() {
        assert!(uri_match(
            "https://SP.Example.com:443/acs/",
            "https://sp.example.com/acs"
        ));
        assert!(uri_match("urn:exact:match", "urn:exact:match"));
        assert!(!uri_match(
            "https://sp.example.com/acs",
            "https://sp.example.com/other"
        ));
        assert!(!uri_match(
            "http://sp.example.com/acs",
            "https://sp.example.com/acs"
        ));
        assert!(!uri_match("not a url", "also not"));
    }
}
