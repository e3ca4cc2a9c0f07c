#![forbid(unsafe_code)]

//! Digest (hash) algorithm implementations.

use digest::Digest;
use sigtuna_core::{algorithm, Error};

/// Compute a digest over `data` with the algorithm named by `uri`.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    match uri {
        algorithm::SHA1 => Ok(sha1::Sha1::digest(data).to_vec()),
        algorithm::SHA224 => Ok(sha2::Sha224::digest(data).to_vec()),
        algorithm::SHA256 => Ok(sha2::Sha256::digest(data).to_vec()),
        algorithm::SHA384 => Ok(sha2::Sha384::digest(data).to_vec()),
        algorithm::SHA512 => Ok(sha2::Sha512::digest(data).to_vec()),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "digest algorithm: {uri}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let result = digest(algorithm::SHA256, b"hello").unwrap();
        assert_eq!(result.len(), 32);
        // Known SHA-256 of "hello"
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        let hex: String = result.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, expected);
    }

    #[test]
    fn test_sha1() {
        let result = digest(algorithm::SHA1, b"hello").unwrap();
        assert_eq!(result.len(), 20);
    }

    #[test]
    fn unknown_uri_is_rejected() {
        assert!(digest("urn:nope", b"hello").is_err());
    }
}
