//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error types shared by every crate in the DTE stack. All
//! errors use `thiserror` for derive-based `Display` and `Error`
//! implementations.
//!
//! ## Design
//!
//! - XML errors carry the byte position, path, or ID that failed so that
//!   audit logs can point at the offending fragment.
//! - Identity errors carry the rejected input verbatim.

use thiserror::Error;

/// Top-level error type for the DTE stack foundation.
#[derive(Error, Debug)]
pub enum DteError {
    /// XML parsing, lookup, or canonicalization failed.
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),

    /// A taxpayer identifier or document type code was rejected.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// A date or timestamp field could not be parsed.
    #[error("temporal error: {0}")]
    Temporal(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error while parsing, navigating, or canonicalizing an XML tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// The input is not well-formed XML.
    #[error("malformed xml at byte {position}: {message}")]
    Malformed {
        /// Byte offset in the input where the reader stopped.
        position: u64,
        /// Reader diagnostic.
        message: String,
    },

    /// The input contains no root element.
    #[error("document has no root element")]
    NoRoot,

    /// No element exists at the requested path.
    #[error("element not found at path {0:?}")]
    PathNotFound(String),

    /// No element carries the requested `ID` attribute.
    #[error("no element carries ID {0:?}")]
    IdNotFound(String),

    /// An element or attribute uses a prefix with no namespace binding.
    #[error("undeclared namespace prefix {0:?}")]
    UndeclaredPrefix(String),
}

/// Error validating a domain identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The RUT is not of the form `NNNNNNNN-D`.
    #[error("malformed RUT {0:?}")]
    MalformedRut(String),

    /// The RUT's check digit does not match its number.
    #[error("RUT {rut:?} has check digit {found}, expected {expected}")]
    CheckDigit {
        /// The rejected input.
        rut: String,
        /// Check digit present in the input.
        found: char,
        /// Check digit computed from the number.
        expected: char,
    },

    /// The document type code is not a positive integer.
    #[error("malformed document type code {0:?}")]
    MalformedDocumentType(String),
}
