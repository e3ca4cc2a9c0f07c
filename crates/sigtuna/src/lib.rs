#![forbid(unsafe_code)]

//! SAML 2.0 Response processing for Service Providers.
//!
//! Given a base64-encoded (optionally deflate-compressed) Response received
//! from an Identity Provider, this crate parses the XML, decrypts encrypted
//! assertions and identifiers, verifies the XML-DSig signature against the
//! configured trust anchors, runs the SAML profile validations, and exposes
//! the authenticated subject's identity, attributes, session index, and
//! expiry.
//!
//! ```no_run
//! use sigtuna::{Response, Settings, ValidationOptions};
//!
//! let settings = Settings {
//!     sp_entity_id: "https://sp.example.com/metadata".into(),
//!     assertion_consumer_service_url: "https://sp.example.com/acs".into(),
//!     idp_entity_id: "https://idp.example.com".into(),
//!     idp_cert: Some(std::fs::read_to_string("idp.pem").unwrap()),
//!     ..Settings::default()
//! };
//!
//! let payload = "..."; // SAMLResponse form parameter
//! let mut response = Response::new(payload, &settings, ValidationOptions::default()).unwrap();
//! if response.is_valid(true) {
//!     println!("subject: {:?}", response.name_id());
//! } else {
//!     eprintln!("rejected: {:?}", response.errors());
//! }
//! ```

mod attributes;
mod decode;
mod parse;
mod response;
mod schema;
mod scope;
mod settings;
mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use attributes::Attributes;
pub use decode::decode_payload;
pub use response::Response;
pub use settings::{IdpCertMulti, Settings, ValidationOptions};
pub use validate::ValidationError;

pub use sigtuna_core::{saml, Error};
