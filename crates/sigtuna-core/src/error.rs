#![forbid(unsafe_code)]

/// Errors produced by the Sigtuna SAML library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("deflate decode error: {0}")]
    Inflate(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("certificate expired: {0}")]
    CertificateExpired(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("no decryption key configured")]
    DecryptionKeyMissing,

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("decrypted plaintext is malformed: {0}")]
    MalformedPlaintext(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the distinct certificate-expiry failure, which callers may
    /// want to report separately from a bad signature.
    pub fn is_cert_expired(&self) -> bool {
        matches!(self, Error::CertificateExpired(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
