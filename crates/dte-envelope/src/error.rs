//! Envelope assembly errors.

use dte_core::{DocumentType, XmlError};
use dte_crypto::SignatureError;
use dte_stamp::{DocumentCategory, StampError};
use thiserror::Error;

/// Which envelope limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Total number of documents.
    Documents,
    /// Number of distinct document types.
    DocumentTypes,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Documents => f.write_str("documents"),
            Self::DocumentTypes => f.write_str("document types"),
        }
    }
}

/// Failure to add to or seal an envelope.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// The envelope limit would be exceeded.
    #[error("envelope full: at most {max} {limit} per {category} envelope (rejected type {document_type} folio {folio})")]
    EnvelopeFull {
        /// The limit hit.
        limit: LimitKind,
        /// Its configured maximum.
        max: usize,
        /// Envelope category.
        category: DocumentCategory,
        /// Type of the rejected document.
        document_type: DocumentType,
        /// Folio of the rejected document.
        folio: u64,
    },

    /// The envelope was sealed over more entries than its limits allow.
    #[error("cannot seal: {count} {limit} exceed the {category} limit of {max}")]
    LimitExceededAtSeal {
        /// The limit hit.
        limit: LimitKind,
        /// Entries present.
        count: usize,
        /// Configured maximum.
        max: usize,
        /// Envelope category.
        category: DocumentCategory,
    },

    /// The document's category differs from the envelope's.
    #[error("type {document_type} folio {folio} is a {found} but the envelope holds {expected}s")]
    CategoryMismatch {
        /// Envelope category.
        expected: DocumentCategory,
        /// Category of the rejected document.
        found: DocumentCategory,
        /// Type of the rejected document.
        document_type: DocumentType,
        /// Folio of the rejected document.
        folio: u64,
    },

    /// The same type and folio is already in the envelope.
    #[error("type {document_type} folio {folio} already in the envelope")]
    DuplicateDocument {
        /// Document type.
        document_type: DocumentType,
        /// Folio.
        folio: u64,
    },

    /// The document type has no registered strategy.
    #[error("unsupported document type {0}")]
    UnsupportedDocumentType(DocumentType),

    /// No documents to seal.
    #[error("cannot seal an empty envelope")]
    Empty,

    /// Documents cannot be added once sealed.
    #[error("envelope already sealed")]
    AlreadySealed,

    /// A cover sheet field is absent and cannot be inferred.
    #[error("cover sheet field {0} missing and not inferable from the documents")]
    MissingCoverField(&'static str),

    /// A loaded envelope does not have the expected shape.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// Document inspection failed.
    #[error("document error: {0}")]
    Document(#[from] StampError),

    /// Envelope signature failed.
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// XML failure.
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),
}
