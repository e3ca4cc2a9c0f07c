#![forbid(unsafe_code)]

//! XML namespace, element, and attribute name constants used across the
//! library.

/// SAML 2.0 protocol namespace (`samlp`)
pub const PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML 2.0 assertion namespace (`saml`)
pub const ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// XML Encryption 1.1 namespace
pub const ENC11: &str = "http://www.w3.org/2009/xmlenc11#";

/// XML Schema instance namespace (`xsi`)
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // Protocol elements
    pub const RESPONSE: &str = "Response";
    pub const STATUS: &str = "Status";
    pub const STATUS_CODE: &str = "StatusCode";
    pub const STATUS_MESSAGE: &str = "StatusMessage";

    // Assertion elements
    pub const ASSERTION: &str = "Assertion";
    pub const ENCRYPTED_ASSERTION: &str = "EncryptedAssertion";
    pub const ISSUER: &str = "Issuer";
    pub const SUBJECT: &str = "Subject";
    pub const NAME_ID: &str = "NameID";
    pub const ENCRYPTED_ID: &str = "EncryptedID";
    pub const SUBJECT_CONFIRMATION: &str = "SubjectConfirmation";
    pub const SUBJECT_CONFIRMATION_DATA: &str = "SubjectConfirmationData";
    pub const CONDITIONS: &str = "Conditions";
    pub const AUDIENCE_RESTRICTION: &str = "AudienceRestriction";
    pub const AUDIENCE: &str = "Audience";
    pub const AUTHN_STATEMENT: &str = "AuthnStatement";
    pub const ATTRIBUTE_STATEMENT: &str = "AttributeStatement";
    pub const ATTRIBUTE: &str = "Attribute";
    pub const ATTRIBUTE_VALUE: &str = "AttributeValue";
    pub const ENCRYPTED_ATTRIBUTE: &str = "EncryptedAttribute";

    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";

    // Encryption elements
    pub const ENCRYPTED_DATA: &str = "EncryptedData";
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "ID";
    pub const VERSION: &str = "Version";
    pub const ISSUE_INSTANT: &str = "IssueInstant";
    pub const DESTINATION: &str = "Destination";
    pub const IN_RESPONSE_TO: &str = "InResponseTo";
    pub const VALUE: &str = "Value";
    pub const FORMAT: &str = "Format";
    pub const SP_NAME_QUALIFIER: &str = "SPNameQualifier";
    pub const NAME_QUALIFIER: &str = "NameQualifier";
    pub const METHOD: &str = "Method";
    pub const NOT_BEFORE: &str = "NotBefore";
    pub const NOT_ON_OR_AFTER: &str = "NotOnOrAfter";
    pub const RECIPIENT: &str = "Recipient";
    pub const SESSION_INDEX: &str = "SessionIndex";
    pub const SESSION_NOT_ON_OR_AFTER: &str = "SessionNotOnOrAfter";
    pub const NAME: &str = "Name";
    pub const NIL: &str = "nil";
    pub const ALGORITHM: &str = "Algorithm";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const PREFIX_LIST: &str = "PrefixList";
}
