#![forbid(unsafe_code)]

//! SP configuration consumed by the validation engine.
//!
//! The library never reads configuration from disk; hosts deserialize
//! `Settings` from whatever format they use and hand it in.

use serde::{Deserialize, Serialize};
use sigtuna_core::Error;
use sigtuna_dsig::TrustAnchor;
use sigtuna_keys::{loader, FingerprintAlgorithm, Key};
use tracing::warn;

/// IdP certificates grouped by purpose, for key rotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpCertMulti {
    /// Ordered signing certificates (PEM or bare base64); each is tried in
    /// turn during signature verification.
    pub signing: Vec<String>,
    /// Encryption certificates. Not used by the Response processor (the SP
    /// decrypts with its own private keys) but kept so a full IdP
    /// configuration round-trips.
    pub encryption: Vec<String>,
}

/// Service Provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SP entity ID; must appear in the assertion's audience restriction.
    pub sp_entity_id: String,
    /// Assertion Consumer Service URL; matched against `Destination` and
    /// the bearer `Recipient`.
    pub assertion_consumer_service_url: String,
    /// Expected IdP entity ID; matched against every issuer in the response.
    pub idp_entity_id: String,

    /// IdP signing certificate (PEM or bare base64).
    pub idp_cert: Option<String>,
    /// Expected certificate fingerprint (hex, colon-separated accepted).
    pub idp_cert_fingerprint: Option<String>,
    /// Fingerprint digest algorithm name; `sha1` when unset.
    pub idp_cert_fingerprint_algorithm: Option<String>,
    /// Rotation certificates; takes precedence over `idp_cert` and the
    /// fingerprint when the signing list is non-empty.
    pub idp_cert_multi: Option<IdpCertMulti>,

    /// Ordered SP private keys (PEM) for decrypting encrypted assertions,
    /// identifiers, and attributes.
    pub sp_decryption_keys: Vec<String>,

    /// Require at least one signature whose parent is the Assertion.
    pub want_assertions_signed: bool,
    /// Fail when the assertion carries no NameID.
    pub want_name_id: bool,
    /// Reject signatures made with an expired IdP certificate.
    pub check_idp_cert_expiration: bool,
    /// Fail when the audience list is empty instead of accepting it.
    pub strict_audience_validation: bool,

    /// Soft mode: `validate()` reports failures through the error list
    /// instead of returning a `ValidationError`.
    pub soft: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sp_entity_id: String::new(),
            assertion_consumer_service_url: String::new(),
            idp_entity_id: String::new(),
            idp_cert: None,
            idp_cert_fingerprint: None,
            idp_cert_fingerprint_algorithm: None,
            idp_cert_multi: None,
            sp_decryption_keys: Vec::new(),
            want_assertions_signed: false,
            want_name_id: false,
            check_idp_cert_expiration: false,
            strict_audience_validation: false,
            soft: true,
        }
    }
}

impl Settings {
    /// Whether any trust material for signature verification is configured.
    pub fn has_trust_anchor(&self) -> bool {
        self.idp_cert_multi
            .as_ref()
            .is_some_and(|m| !m.signing.is_empty())
            || self.idp_cert.is_some()
            || self.idp_cert_fingerprint.is_some()
    }

    /// Build the trust anchor for signature verification.
    ///
    /// Precedence: rotation list, then the single certificate, then the
    /// fingerprint.
    pub(crate) fn trust_anchor(&self) -> Result<Option<TrustAnchor>, Error> {
        if let Some(multi) = &self.idp_cert_multi {
            if !multi.signing.is_empty() {
                return TrustAnchor::from_cert_texts(&multi.signing).map(Some);
            }
        }
        if let Some(cert) = &self.idp_cert {
            return TrustAnchor::from_cert_text(cert).map(Some);
        }
        if let Some(fp) = &self.idp_cert_fingerprint {
            let algorithm = match &self.idp_cert_fingerprint_algorithm {
                Some(name) => FingerprintAlgorithm::from_name(name)?,
                None => FingerprintAlgorithm::default(),
            };
            return Ok(Some(TrustAnchor::Fingerprint {
                value: fp.clone(),
                algorithm,
            }));
        }
        Ok(None)
    }

    /// Parse the configured SP decryption keys, preserving order. Keys that
    /// fail to parse are skipped so one bad entry cannot disable rotation.
    pub(crate) fn decryption_keys(&self) -> Vec<Key> {
        let mut keys = Vec::with_capacity(self.sp_decryption_keys.len());
        for (i, pem) in self.sp_decryption_keys.iter().enumerate() {
            match loader::load_private_pem(pem) {
                Ok(key) => keys.push(key),
                Err(e) => warn!(index = i, error = %e, "skipping unparseable SP decryption key"),
            }
        }
        keys
    }
}

/// Per-response validation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Bidirectional clock tolerance in seconds applied to every timing
    /// comparison.
    pub allowed_clock_drift: f64,
    /// The AuthnRequest ID this response must answer; `None` means the SP
    /// does not track request IDs.
    pub matches_request_id: Option<String>,
    /// Reject responses whose attribute statements repeat an attribute name.
    pub check_duplicated_attributes: bool,

    pub skip_audience: bool,
    pub skip_authnstatement: bool,
    pub skip_conditions: bool,
    pub skip_destination: bool,
    pub skip_recipient_check: bool,
    pub skip_subject_confirmation: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            allowed_clock_drift: 0.0,
            matches_request_id: None,
            check_duplicated_attributes: false,
            skip_audience: false,
            skip_authnstatement: false,
            skip_conditions: false,
            skip_destination: false,
            skip_recipient_check: false,
            skip_subject_confirmation: false,
        }
    }
}

impl ValidationOptions {
    /// Effective drift as an exact duration. Rounding at microsecond
    /// granularity absorbs float noise, so boundary instants compare
    /// deterministically: `not_before - drift` is still valid and
    /// `not_on_or_after + drift` is already expired.
    pub(crate) fn drift(&self) -> chrono::Duration {
        chrono::Duration::microseconds((self.allowed_clock_drift.abs() * 1_000_000.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_soft_with_no_anchor() {
        let settings = Settings::default();
        assert!(settings.soft);
        assert!(!settings.has_trust_anchor());
        assert!(settings.trust_anchor().unwrap().is_none());
    }

    #[test]
    fn multi_takes_precedence() {
        let cert = include_str!("../testdata/idp_cert.pem");
        let settings = Settings {
            idp_cert: Some(cert.to_owned()),
            idp_cert_fingerprint: Some("aa:bb".into()),
            idp_cert_multi: Some(IdpCertMulti {
                signing: vec![cert.to_owned()],
                encryption: vec![],
            }),
            ..Settings::default()
        };
        assert!(matches!(
            settings.trust_anchor().unwrap(),
            Some(TrustAnchor::Certificates(_))
        ));
    }

    #[test]
    fn fingerprint_anchor_parses_algorithm() {
        let settings = Settings {
            idp_cert_fingerprint: Some("aa:bb".into()),
            idp_cert_fingerprint_algorithm: Some("sha256".into()),
            ..Settings::default()
        };
        assert!(matches!(
            settings.trust_anchor().unwrap(),
            Some(TrustAnchor::Fingerprint { .. })
        ));
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"sp_entity_id":"https://sp.example.com"}"#).unwrap();
        assert_eq!(settings.sp_entity_id, "https://sp.example.com");
        assert!(settings.soft);
    }

    #[test]
    fn drift_is_absolute_and_exact() {
        let options = ValidationOptions {
            allowed_clock_drift: -2.5,
            ..ValidationOptions::default()
        };
        assert_eq!(options.drift(), chrono::Duration::microseconds(2_500_000));
        assert_eq!(
            ValidationOptions::default().drift(),
            chrono::Duration::zero()
        );
    }
}
