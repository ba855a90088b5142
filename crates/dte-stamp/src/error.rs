//! # Stamp Error Types
//!
//! Failures from folio authorization validation, stamping, stamp
//! verification and document signing. Every variant names the folio,
//! document type, or authority key serial involved so audit logs can say
//! exactly which document or authorization was refused.

use dte_core::{DocumentType, XmlError};
use dte_crypto::{CryptoError, SignatureError};
use thiserror::Error;

/// A folio authorization block was refused.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    /// Structural parse failure: missing element, bad number, bad key encoding.
    #[error("malformed folio authorization: {0}")]
    Malformed(String),

    /// No authority public key is registered for the block's key serial.
    #[error("no authority key registered for serial {serial}")]
    KeyUnknown {
        /// The `IDK` value of the block.
        serial: u32,
    },

    /// The authority's signature over the payload does not verify.
    #[error("authority signature invalid (type {document_type}, folios {desde}..={hasta}, serial {serial})")]
    SignatureInvalid {
        /// Document type the block authorizes.
        document_type: DocumentType,
        /// First authorized folio.
        desde: u64,
        /// Last authorized folio.
        hasta: u64,
        /// Authority key serial.
        serial: u32,
    },

    /// The embedded private and public keys are not one key pair.
    #[error("embedded key pair is inconsistent: {0}")]
    KeyPairInconsistent(String),
}

impl From<XmlError> for AuthorizationError {
    fn from(e: XmlError) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Stamping, stamp verification, or document signing failed.
#[derive(Error, Debug)]
pub enum StampError {
    /// The folio lies outside the authorization's range.
    #[error("folio {folio} of type {document_type} outside authorized range {desde}..={hasta}")]
    FolioOutOfRange {
        /// Document type.
        document_type: DocumentType,
        /// The rejected folio.
        folio: u64,
        /// First authorized folio.
        desde: u64,
        /// Last authorized folio.
        hasta: u64,
    },

    /// A field the stamp needs is absent or empty.
    #[error("folio {folio}: missing required field {field}")]
    MissingRequiredField {
        /// Folio of the document, 0 if the folio itself is missing.
        folio: u64,
        /// Element path of the missing field.
        field: &'static str,
    },

    /// The document's type differs from the authorization's.
    #[error("folio {folio}: document type {document} but authorization is for type {authorization}")]
    DocumentTypeMismatch {
        /// Folio of the document.
        folio: u64,
        /// Type declared by the document.
        document: DocumentType,
        /// Type the authorization covers.
        authorization: DocumentType,
    },

    /// The document's emitter differs from the authorization's.
    #[error("folio {folio}: emitter {document} but authorization belongs to {authorization}")]
    EmitterMismatch {
        /// Folio of the document.
        folio: u64,
        /// Emitter declared by the document.
        document: String,
        /// Emitter the authorization belongs to.
        authorization: String,
    },

    /// No strategy is registered for the type code.
    #[error("unsupported document type {0}")]
    UnsupportedDocumentType(DocumentType),

    /// The document lacks the structure of a tax document.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The document carries no stamp.
    #[error("folio {folio}: document carries no stamp")]
    StampMissing {
        /// Folio of the document.
        folio: u64,
    },

    /// The stamp's signature does not verify under the authorization's key.
    #[error("folio {folio}: stamp signature invalid")]
    StampSignatureInvalid {
        /// Folio of the document.
        folio: u64,
    },

    /// The stamp embeds a different authorization than the one supplied.
    #[error("folio {folio}: stamp embeds a different folio authorization")]
    AuthorizationMismatch {
        /// Folio of the document.
        folio: u64,
    },

    /// Key operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Document signature failed.
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// XML navigation or canonicalization failed.
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),
}
