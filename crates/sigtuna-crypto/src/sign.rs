#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, ECDSA).
//!
//! The sign side exists for test fixture construction; the SP surface only
//! verifies.

use sigtuna_core::{algorithm, Error};

/// Key material for signature operations.
pub enum VerificationKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &VerificationKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &VerificationKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    match uri {
        algorithm::RSA_SHA1 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA1,
            hash: HashType::Sha1,
        })),
        algorithm::RSA_SHA256 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA256,
            hash: HashType::Sha256,
        })),
        algorithm::RSA_SHA384 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA384,
            hash: HashType::Sha384,
        })),
        algorithm::RSA_SHA512 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA512,
            hash: HashType::Sha512,
        })),

        algorithm::ECDSA_SHA256 => Ok(Box::new(Ecdsa {
            uri: algorithm::ECDSA_SHA256,
        })),
        algorithm::ECDSA_SHA384 => Ok(Box::new(Ecdsa {
            uri: algorithm::ECDSA_SHA384,
        })),
        algorithm::ECDSA_SHA512 => Ok(Box::new(Ecdsa {
            uri: algorithm::ECDSA_SHA512,
        })),

        _ => Err(Error::UnsupportedAlgorithm(format!(
            "signature algorithm: {uri}"
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl RsaPkcs1v15 {
    fn sign_with_key(
        &self,
        private_key: &rsa::RsaPrivateKey,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        use signature::{SignatureEncoding, Signer};
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                Ok(sk.sign(data).to_vec())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify_with_key(
        &self,
        public_key: &rsa::RsaPublicKey,
        data: &[u8],
        sig_bytes: &[u8],
    ) -> Result<bool, Error> {
        use signature::Verifier;
        let sig = match rsa::pkcs1v15::Signature::try_from(sig_bytes) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &VerificationKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            VerificationKey::Rsa(pk) => self.sign_with_key(pk, data),
            _ => Err(Error::Key("RSA private key required".into())),
        }
    }

    fn verify(
        &self,
        key: &VerificationKey,
        data: &[u8],
        sig_bytes: &[u8],
    ) -> Result<bool, Error> {
        let pubk = match key {
            VerificationKey::Rsa(pk) => pk.to_public_key(),
            VerificationKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(Error::Key("RSA key required".into())),
        };
        self.verify_with_key(&pubk, data, sig_bytes)
    }
}

// ── ECDSA (P-256 / P-384) ────────────────────────────────────────────

struct Ecdsa {
    uri: &'static str,
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!(
            "P-256 signature must be 64 bytes, got {}",
            rs.len()
        )));
    }
    let r = p256::FieldBytes::from_slice(&rs[..32]);
    let s = p256::FieldBytes::from_slice(&rs[32..]);
    p256::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert a P-256 signature to XML-DSig r||s format.
fn p256_to_xmldsig(sig: &p256::ecdsa::Signature) -> Vec<u8> {
    let (r, s) = sig.split_bytes();
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!(
            "P-384 signature must be 96 bytes, got {}",
            rs.len()
        )));
    }
    let r = p384::FieldBytes::from_slice(&rs[..48]);
    let s = p384::FieldBytes::from_slice(&rs[48..]);
    p384::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

/// Convert a P-384 signature to XML-DSig r||s format.
fn p384_to_xmldsig(sig: &p384::ecdsa::Signature) -> Vec<u8> {
    let (r, s) = sig.split_bytes();
    let mut out = Vec::with_capacity(96);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out
}

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &VerificationKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        match key {
            VerificationKey::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk.sign(data);
                Ok(p256_to_xmldsig(&sig))
            }
            VerificationKey::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk.sign(data);
                Ok(p384_to_xmldsig(&sig))
            }
            _ => Err(Error::Key(
                "ECDSA signing key required (P-256 or P-384)".into(),
            )),
        }
    }

    fn verify(
        &self,
        key: &VerificationKey,
        data: &[u8],
        sig_bytes: &[u8],
    ) -> Result<bool, Error> {
        use signature::Verifier;
        match key {
            VerificationKey::EcP256(sk) => {
                let sig = xmldsig_to_p256(sig_bytes)?;
                Ok(sk.verifying_key().verify(data, &sig).is_ok())
            }
            VerificationKey::EcP256Public(vk) => {
                let sig = xmldsig_to_p256(sig_bytes)?;
                Ok(vk.verify(data, &sig).is_ok())
            }
            VerificationKey::EcP384(sk) => {
                let sig = xmldsig_to_p384(sig_bytes)?;
                Ok(sk.verifying_key().verify(data, &sig).is_ok())
            }
            VerificationKey::EcP384Public(vk) => {
                let sig = xmldsig_to_p384(sig_bytes)?;
                Ok(vk.verify(data, &sig).is_ok())
            }
            _ => Err(Error::Key("ECDSA key required (P-256 or P-384)".into())),
        }
    }
}
