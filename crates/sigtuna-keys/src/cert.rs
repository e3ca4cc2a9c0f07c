#![forbid(unsafe_code)]

//! X.509 certificate handling for IdP trust anchors.
//!
//! Certificates arrive as PEM text in the settings, or as bare base64 inside
//! `<ds:X509Certificate>`. We need three things from them: the public key,
//! digest fingerprints, and the validity window.

use crate::key::{Key, KeyData};
use base64::Engine;
use der::Decode;
use digest::Digest;
use sigtuna_core::Error;
use x509_cert::Certificate;

/// Fingerprint digest algorithm. SHA-1 is the long-standing default for
/// SAML certificate fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl FingerprintAlgorithm {
    /// Parse an algorithm name as it appears in SP configuration.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha384" | "sha-384" => Ok(Self::Sha384),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            other => Err(Error::UnsupportedAlgorithm(format!(
                "fingerprint algorithm: {other}"
            ))),
        }
    }
}

/// A parsed IdP certificate, retaining the DER it was built from.
pub struct IdpCertificate {
    der: Vec<u8>,
    parsed: Certificate,
}

impl std::fmt::Debug for IdpCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdpCertificate({} bytes DER)", self.der.len())
    }
}

impl IdpCertificate {
    /// Parse a certificate from DER bytes.
    pub fn from_der(der: Vec<u8>) -> Result<Self, Error> {
        let parsed = Certificate::from_der(&der)
            .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))?;
        Ok(Self { der, parsed })
    }

    /// Parse a certificate from PEM text or bare base64.
    ///
    /// Accepts full `-----BEGIN CERTIFICATE-----` blocks as well as the
    /// header-less base64 that SP configurations and `<ds:X509Certificate>`
    /// elements carry.
    pub fn from_pem_or_base64(text: &str) -> Result<Self, Error> {
        let body: String = text
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .flat_map(|line| line.chars())
            .filter(|c| !c.is_whitespace())
            .collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(&body)
            .map_err(|e| Error::Base64(format!("certificate: {e}")))?;
        Self::from_der(der)
    }

    /// The DER encoding of this certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Extract the subject public key as a verification key.
    pub fn public_key(&self) -> Result<Key, Error> {
        let spki = &self.parsed.tbs_certificate.subject_public_key_info;
        let alg_oid = spki.algorithm.oid.to_string();
        let key_bytes = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| Error::Certificate("malformed subject public key".into()))?;

        // rsaEncryption
        if alg_oid == "1.2.840.113549.1.1.1" {
            use rsa::pkcs1::DecodeRsaPublicKey;
            let public = rsa::RsaPublicKey::from_pkcs1_der(key_bytes)
                .map_err(|e| Error::Certificate(format!("RSA public key: {e}")))?;
            return Ok(Key::new(KeyData::Rsa {
                private: None,
                public,
            }));
        }

        // id-ecPublicKey -- the curve is recovered from the point size.
        if alg_oid == "1.2.840.10045.2.1" {
            if let Ok(public) = p256::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes) {
                return Ok(Key::new(KeyData::EcP256 {
                    private: None,
                    public,
                }));
            }
            let public = p384::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                .map_err(|e| Error::Certificate(format!("EC public key: {e}")))?;
            return Ok(Key::new(KeyData::EcP384 {
                private: None,
                public,
            }));
        }

        Err(Error::Certificate(format!(
            "unsupported public key algorithm: {alg_oid}"
        )))
    }

    /// Compute the certificate fingerprint as lowercase hex without
    /// separators.
    pub fn fingerprint(&self, alg: FingerprintAlgorithm) -> String {
        let digest = match alg {
            FingerprintAlgorithm::Sha1 => sha1::Sha1::digest(&self.der).to_vec(),
            FingerprintAlgorithm::Sha256 => sha2::Sha256::digest(&self.der).to_vec(),
            FingerprintAlgorithm::Sha384 => sha2::Sha384::digest(&self.der).to_vec(),
            FingerprintAlgorithm::Sha512 => sha2::Sha512::digest(&self.der).to_vec(),
        };
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Compare against a configured fingerprint, tolerating `AB:CD` colon
    /// separation and mixed case.
    pub fn matches_fingerprint(&self, expected: &str, alg: FingerprintAlgorithm) -> bool {
        let normalized: String = expected
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        !normalized.is_empty() && self.fingerprint(alg) == normalized
    }

    /// Whether the certificate validity window has passed at the given UNIX
    /// timestamp (seconds).
    pub fn is_expired_at(&self, unix_secs: i64) -> bool {
        let not_after = self
            .parsed
            .tbs_certificate
            .validity
            .not_after
            .to_date_time()
            .unix_duration()
            .as_secs() as i64;
        unix_secs > not_after
    }

    /// Whether two certificates encode the same DER.
    pub fn same_as(&self, other: &IdpCertificate) -> bool {
        self.der == other.der
    }
}
