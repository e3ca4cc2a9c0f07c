#![forbid(unsafe_code)]

//! Key types and data structures.

/// The underlying key data.
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { private, .. } => {
                if private.is_some() {
                    write!(f, "RSA private+public key")
                } else {
                    write!(f, "RSA public key")
                }
            }
            Self::EcP256 { private, .. } => {
                if private.is_some() {
                    write!(f, "EC P-256 private+public key")
                } else {
                    write!(f, "EC P-256 public key")
                }
            }
            Self::EcP384 { private, .. } => {
                if private.is_some() {
                    write!(f, "EC P-384 private+public key")
                } else {
                    write!(f, "EC P-384 public key")
                }
            }
        }
    }
}

/// A named key with associated data.
#[derive(Debug)]
pub struct Key {
    /// Optional name for diagnostics.
    pub name: Option<String>,
    /// The key data.
    pub data: KeyData,
}

impl Key {
    /// Create a new key.
    pub fn new(data: KeyData) -> Self {
        Self { name: None, data }
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Convert to a `VerificationKey` for use with signature algorithms.
    pub fn to_verification_key(&self) -> sigtuna_crypto::sign::VerificationKey {
        use sigtuna_crypto::sign::VerificationKey;
        match &self.data {
            KeyData::Rsa {
                private: Some(pk), ..
            } => VerificationKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => VerificationKey::RsaPublic(public.clone()),
            KeyData::EcP256 {
                private: Some(sk), ..
            } => VerificationKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => VerificationKey::EcP256Public(*public),
            KeyData::EcP384 {
                private: Some(sk), ..
            } => VerificationKey::EcP384(sk.clone()),
            KeyData::EcP384 { public, .. } => VerificationKey::EcP384Public(*public),
        }
    }

    /// Get the RSA private key if available.
    pub fn rsa_private_key(&self) -> Option<&rsa::RsaPrivateKey> {
        match &self.data {
            KeyData::Rsa {
                private: Some(pk), ..
            } => Some(pk),
            _ => None,
        }
    }
}
