#![forbid(unsafe_code)]

//! Cryptographic algorithm implementations for the Sigtuna SAML 2.0 library.
//!
//! Thin dispatch layers from XML Security algorithm URIs onto the RustCrypto
//! crates. Only the algorithms that appear in SAML 2.0 responses are wired
//! up.

pub mod cipher;
pub mod digest;
pub mod keytransport;
pub mod sign;
