#![forbid(unsafe_code)]

//! Core types shared across the Sigtuna SAML 2.0 workspace: the error type,
//! XML namespace and element name constants, algorithm URIs, and SAML
//! protocol constants.

pub mod algorithm;
pub mod error;
pub mod ns;
pub mod saml;

pub use error::{Error, Result};
