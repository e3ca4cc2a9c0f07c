#![forbid(unsafe_code)]

//! Key material and X.509 certificate handling for the Sigtuna SAML 2.0
//! library: SP decryption keys loaded from PEM, and IdP signing certificates
//! with fingerprint and validity-window support.

pub mod cert;
pub mod key;
pub mod loader;

pub use cert::{FingerprintAlgorithm, IdpCertificate};
pub use key::{Key, KeyData};
