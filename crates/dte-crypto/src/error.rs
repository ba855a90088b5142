//! # Cryptographic Error Types
//!
//! Structured errors for key handling, certificates, and raw RSA
//! operations in `dte-crypto`. XML signature outcomes have their own
//! enum in [`crate::xmldsig`].

use thiserror::Error;

/// Errors from cryptographic operations in the DTE stack.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// RSA key material could not be decoded or is inconsistent.
    #[error("invalid RSA key: {0}")]
    InvalidKey(String),

    /// An X.509 certificate could not be decoded or carries no RSA key.
    #[error("malformed certificate: {0}")]
    CertificateMalformed(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64(String),

    /// The private-key operation failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// The signature does not verify under the given public key.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// The algorithm identifier is not supported.
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    /// I/O error (reading key or certificate files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e.to_string())
    }
}
