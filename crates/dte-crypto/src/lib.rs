//! # dte-crypto — Cryptographic Primitives for the DTE Stack
//!
//! Provides the signing layer every document, stamp and envelope relies on:
//!
//! - **RSA** ([`keys`]): PKCS#1 v1.5 sign/verify over `CanonicalBytes`,
//!   key decoding from PEM and from base64 modulus/exponent pairs, and the
//!   key-pair consistency check used on folio authorizations.
//!
//! - **Certificates** ([`certificate`]): X.509 signing certificates as
//!   carried in signature blocks.
//!
//! - **Signer capability** ([`signer`]): the `Signer` trait and an
//!   in-memory `LocalSigner`.
//!
//! - **Enveloped signatures** ([`xmldsig`]): produce and verify
//!   `Signature` blocks bound to a referenced subtree.
//!
//! ## Crate Policy
//!
//! - Depends only on `dte-core` internally.
//! - All signing operations take `&CanonicalBytes`, never raw bytes.
//! - Private key material never reaches `Debug` output.

pub mod certificate;
pub mod error;
pub mod keys;
pub mod signer;
pub mod xmldsig;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

// Re-export primary types.
pub use certificate::Certificate;
pub use error::CryptoError;
pub use keys::SignatureAlgorithm;
pub use signer::{LocalSigner, Signer};
pub use xmldsig::{
    sign_enveloped, signature_count, verify, verify_all, verify_at, verify_whole_document,
    Reference, SignatureError, SignatureReport, VerifiedSignature,
};
