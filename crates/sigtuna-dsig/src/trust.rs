#![forbid(unsafe_code)]

//! Trust anchors for signature verification.

use sigtuna_core::Error;
use sigtuna_keys::{FingerprintAlgorithm, IdpCertificate};

/// What the SP trusts when verifying the IdP signature.
pub enum TrustAnchor {
    /// A single full certificate.
    Certificate(IdpCertificate),
    /// A digest of the expected certificate; the certificate itself is taken
    /// from the signature's `<ds:KeyInfo>` and must match the digest.
    Fingerprint {
        value: String,
        algorithm: FingerprintAlgorithm,
    },
    /// An ordered list of candidate certificates (IdP key rotation).
    Certificates(Vec<IdpCertificate>),
}

impl TrustAnchor {
    /// Build a single-certificate anchor from PEM or bare base64.
    pub fn from_cert_text(text: &str) -> Result<Self, Error> {
        Ok(Self::Certificate(IdpCertificate::from_pem_or_base64(text)?))
    }

    /// Build a rotation anchor from a list of PEM or bare base64 texts,
    /// preserving order.
    pub fn from_cert_texts(texts: &[String]) -> Result<Self, Error> {
        let mut certs = Vec::with_capacity(texts.len());
        for text in texts {
            certs.push(IdpCertificate::from_pem_or_base64(text)?);
        }
        if certs.is_empty() {
            return Err(Error::Settings(
                "empty certificate list for trust anchor".into(),
            ));
        }
        Ok(Self::Certificates(certs))
    }
}

impl std::fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Certificate(_) => write!(f, "TrustAnchor::Certificate"),
            Self::Fingerprint { algorithm, .. } => {
                write!(f, "TrustAnchor::Fingerprint({algorithm:?})")
            }
            Self::Certificates(certs) => {
                write!(f, "TrustAnchor::Certificates(len={})", certs.len())
            }
        }
    }
}
