//! # dte-stamp — Folio Authorizations and Electronic Stamps
//!
//! Turns an authority-issued folio authorization into stamped, signed
//! documents:
//!
//! - [`caf`]: validates `AUTORIZACION` blocks against the authority's
//!   public keys ([`keyring`]) and checks the embedded key pair.
//! - [`registry`]: the per-type strategy table deciding envelope category
//!   and stamp field extraction.
//! - [`ted`]: generates the `TED` stamp and verifies it against a CAF.
//! - [`signing`]: signs a stamped document's body with the issuer's
//!   `Signer`.
//!
//! ## Data Flow
//!
//! ```text
//! raw CAF ──CafValidator──▶ FolioAuthorization
//!                                  │
//! Document ──StampGenerator───────┴──▶ StampedDocument ──sign_document──▶ SignedDocument
//! ```
//!
//! Folio uniqueness is not enforced here; callers serialize folio
//! assignment per authorization.

pub mod caf;
pub mod document;
pub mod error;
pub mod keyring;
pub mod registry;
pub mod signing;
pub mod ted;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use caf::{AuthorizationSummary, CafValidator, FolioAuthorization, FolioRange};
pub use document::Document;
pub use error::{AuthorizationError, StampError};
pub use keyring::AuthorityKeyRing;
pub use registry::{DocumentCategory, DocumentKind, KindRegistry, StampFields};
pub use signing::{sign_document, SignedDocument};
pub use ted::{StampGenerator, StampedDocument, Ted};
