//! # dte-envelope — Document Envelope Assembly
//!
//! Batches signed documents into one submission envelope. An envelope holds
//! a single category (full tax documents or simplified receipts), stays
//! within that category's type and count limits, and is sealed exactly once
//! with the sender's signature over `SetDTE`.
//!
//! ```text
//! SignedDocument* ──add()──▶ EnvelopeAssembler ──seal(CoverSheet, Signer)──▶ SealedEnvelope
//! ```

pub mod assembler;
pub mod cover;
pub mod error;
pub mod limits;

pub use assembler::{EnvelopeAssembler, EnvelopeSummary, SealedEnvelope, SubTotal, SET_ID};
pub use cover::CoverSheet;
pub use error::{EnvelopeError, LimitKind};
pub use limits::{EnvelopeLimits, LimitTable};
