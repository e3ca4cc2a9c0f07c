#![forbid(unsafe_code)]

//! Key transport algorithms (RSA PKCS#1 v1.5, RSA-OAEP).

use sigtuna_core::{algorithm, Error};

/// Trait for key transport algorithms.
pub trait KeyTransportAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8])
        -> Result<Vec<u8>, Error>;
}

/// Create a key transport algorithm from its URI.
///
/// `digest_uri` is the optional `<ds:DigestMethod>` declared inside the
/// OAEP `<EncryptionMethod>`; SHA-1 is the spec default.
pub fn from_uri(uri: &str, digest_uri: Option<&str>) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    match uri {
        algorithm::RSA_PKCS1 => Ok(Box::new(RsaPkcs1Transport)),
        algorithm::RSA_OAEP | algorithm::RSA_OAEP_ENC11 => {
            let digest = match digest_uri {
                None => OaepDigest::Sha1,
                Some(algorithm::SHA1) => OaepDigest::Sha1,
                Some(algorithm::SHA256) => OaepDigest::Sha256,
                Some(other) => {
                    return Err(Error::UnsupportedAlgorithm(format!(
                        "OAEP digest: {other}"
                    )))
                }
            };
            Ok(Box::new(RsaOaepTransport {
                uri: if uri == algorithm::RSA_OAEP {
                    algorithm::RSA_OAEP
                } else {
                    algorithm::RSA_OAEP_ENC11
                },
                digest,
            }))
        }
        _ => Err(Error::UnsupportedAlgorithm(format!("key transport: {uri}"))),
    }
}

struct RsaPkcs1Transport;

impl KeyTransportAlgorithm for RsaPkcs1Transport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_PKCS1
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, key_data)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 encrypt: {e}")))
    }

    fn decrypt(
        &self,
        private_key: &rsa::RsaPrivateKey,
        encrypted: &[u8],
    ) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        private_key
            .decrypt(Pkcs1v15Encrypt, encrypted)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 decrypt: {e}")))
    }
}

#[derive(Clone, Copy)]
enum OaepDigest {
    Sha1,
    Sha256,
}

struct RsaOaepTransport {
    uri: &'static str,
    digest: OaepDigest,
}

impl RsaOaepTransport {
    fn padding(&self) -> rsa::Oaep {
        match self.digest {
            OaepDigest::Sha1 => rsa::Oaep::new::<sha1::Sha1>(),
            OaepDigest::Sha256 => rsa::Oaep::new::<sha2::Sha256>(),
        }
    }
}

impl KeyTransportAlgorithm for RsaOaepTransport {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, self.padding(), key_data)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP encrypt: {e}")))
    }

    fn decrypt(
        &self,
        private_key: &rsa::RsaPrivateKey,
        encrypted: &[u8],
    ) -> Result<Vec<u8>, Error> {
        private_key
            .decrypt(self.padding(), encrypted)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP decrypt: {e}")))
    }
}
