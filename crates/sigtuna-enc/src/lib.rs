#![forbid(unsafe_code)]

//! XML-Enc decryption for SAML 2.0 responses.
//!
//! SAML responses encrypt three element kinds: `<EncryptedAssertion>`,
//! `<EncryptedID>`, and `<EncryptedAttribute>`. Each wraps an
//! `<xenc:EncryptedData>` whose session key is carried in an
//! `<xenc:EncryptedKey>` transported with one of the SP's RSA keys.

pub mod decrypt;
pub mod peel;

pub use decrypt::{decrypt_assertion_document, decrypt_node, wrap_fragment, ElementKind};
