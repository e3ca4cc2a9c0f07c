#![forbid(unsafe_code)]

//! Private key loading from PEM.
//!
//! SP decryption keys arrive as PEM text in the settings. PKCS#8 is tried
//! first, then the legacy PKCS#1 `RSA PRIVATE KEY` form.

use crate::key::{Key, KeyData};
use sigtuna_core::Error;

/// Load an RSA private key from PEM text.
pub fn load_rsa_private_pem(pem_str: &str) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str) {
        let public = pk.to_public_key();
        return Ok(Key::new(KeyData::Rsa {
            private: Some(pk),
            public,
        }));
    }

    use pkcs1::DecodeRsaPrivateKey;
    let pk = rsa::RsaPrivateKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))?;
    let public = pk.to_public_key();
    Ok(Key::new(KeyData::Rsa {
        private: Some(pk),
        public,
    }))
}

/// Load an EC private key (P-256 or P-384) from PKCS#8 PEM text.
pub fn load_ec_private_pem(pem_str: &str) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;

    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem_str) {
        let public = *sk.verifying_key();
        return Ok(Key::new(KeyData::EcP256 {
            private: Some(sk),
            public,
        }));
    }

    let sk = p384::ecdsa::SigningKey::from_pkcs8_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse EC private key PEM: {e}")))?;
    let public = *sk.verifying_key();
    Ok(Key::new(KeyData::EcP384 {
        private: Some(sk),
        public,
    }))
}

/// Load a private key from PEM, trying RSA first, then EC.
pub fn load_private_pem(pem_str: &str) -> Result<Key, Error> {
    load_rsa_private_pem(pem_str).or_else(|_| load_ec_private_pem(pem_str))
}
