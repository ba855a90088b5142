//! # dte-core — Foundational Types for the DTE Stack
//!
//! This crate is the bedrock of the electronic tax document stack. Every
//! other crate in the workspace depends on `dte-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **One XML tree model.** Authorization blocks, documents, envelopes
//!    and authority responses are all parsed into [`xml::Element`].
//!
//! 2. **`CanonicalBytes` newtype.** ALL digest and signature computation
//!    flows through the `flatten*` functions in [`canonical`]. There is no
//!    way to digest a raw string, which makes "signed one serialization,
//!    verified another" impossible by construction.
//!
//! 3. **Validated identifiers.** `Rut` cannot exist with a wrong check
//!    digit; `DocumentType` is a newtype, not a bare integer.
//!
//! 4. **Injected time.** Components that stamp time take a [`Clock`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `dte-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;
pub mod xml;

// Re-export primary types for ergonomic imports.
pub use canonical::{
    flatten, flatten_bare, flatten_bare_path, flatten_enveloped, flatten_id, flatten_id_enveloped,
    flatten_in_context, flatten_path, CanonicalBytes, EXCLUSIVE_C14N,
};
pub use digest::{digest, ContentDigest, DigestAlgorithm};
pub use error::{DteError, IdentityError, XmlError};
pub use identity::{DocumentType, Rut};
pub use temporal::{format_date, parse_date, Clock, ManualClock, SystemClock, Timestamp};
pub use xml::{parse, Element, Node};
