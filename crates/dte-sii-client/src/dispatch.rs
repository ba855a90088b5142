//! # Dispatch — Envelope Submission
//!
//! Uploads a sealed envelope with an authenticated [`Session`] and reads
//! the authority's receipt (`RECEPCIONDTE`): `STATUS` 0 carries a tracking
//! id, anything else is a rejection classified through a [`RejectionTable`].
//!
//! A dispatch is never retried here. A repeated upload after a transport
//! failure may come back as a duplicate-submission rejection, which callers
//! can detect with [`DispatchError::is_duplicate`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dte_core::parse;
use dte_envelope::SealedEnvelope;
use serde::{Deserialize, Serialize};

use crate::auth::Session;
use crate::error::{DispatchError, TransportError};
use crate::transport::{AuthorityTransport, Upload, UPLOAD_PATH};

/// Status the authority reports for an accepted upload.
pub const UPLOAD_OK: &str = "0";

/// Identifier the authority assigns to an accepted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(String);

impl TrackingId {
    /// The id as sent by the authority.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a rejection status means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    /// Envelope content does not meet the schema or is truncated.
    MalformedContent,
    /// Envelope or document signature failed.
    BadSignature,
    /// The emitter or receiver is not known to the authority.
    UnknownReceiver,
    /// The envelope was already received.
    DuplicateSubmission,
    /// The sender is not authorized or the session is invalid.
    Unauthorized,
    /// The authority is temporarily not accepting uploads.
    ServiceUnavailable,
    /// A status not present in the table.
    Unknown,
}

impl std::fmt::Display for RejectionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::MalformedContent => "malformed content",
            Self::BadSignature => "bad signature",
            Self::UnknownReceiver => "unknown receiver",
            Self::DuplicateSubmission => "duplicate submission",
            Self::Unauthorized => "unauthorized",
            Self::ServiceUnavailable => "service unavailable",
            Self::Unknown => "unknown",
        })
    }
}

/// Maps upload status codes to categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionTable {
    codes: BTreeMap<String, RejectionCategory>,
}

impl RejectionTable {
    /// Table with no known codes.
    pub fn empty() -> Self {
        Self {
            codes: BTreeMap::new(),
        }
    }

    /// Add or replace a code.
    pub fn with(mut self, code: &str, category: RejectionCategory) -> Self {
        self.codes.insert(code.to_string(), category);
        self
    }

    /// Category for `code`, `Unknown` when absent.
    pub fn classify(&self, code: &str) -> RejectionCategory {
        self.codes
            .get(code.trim())
            .copied()
            .unwrap_or(RejectionCategory::Unknown)
    }
}

impl Default for RejectionTable {
    fn default() -> Self {
        use RejectionCategory::*;
        Self::empty()
            .with("1", Unauthorized)
            .with("2", MalformedContent)
            .with("3", MalformedContent)
            .with("5", Unauthorized)
            .with("6", UnknownReceiver)
            .with("7", MalformedContent)
            .with("8", BadSignature)
            .with("9", ServiceUnavailable)
            .with("99", DuplicateSubmission)
    }
}

/// Submits sealed envelopes.
#[derive(Clone)]
pub struct DispatchClient {
    transport: Arc<dyn AuthorityTransport>,
    rejections: RejectionTable,
}

impl std::fmt::Debug for DispatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchClient")
            .field("transport", &self.transport.transport_name())
            .field("rejections", &self.rejections)
            .finish()
    }
}

impl DispatchClient {
    /// Client over `transport` classifying rejections with `rejections`.
    pub fn new(transport: Arc<dyn AuthorityTransport>, rejections: RejectionTable) -> Self {
        Self {
            transport,
            rejections,
        }
    }

    /// Upload `envelope` once.
    ///
    /// # Errors
    ///
    /// `Transport` when the exchange fails or the receipt is unreadable,
    /// `Rejected` when the authority reports a non-zero status.
    pub fn dispatch(
        &self,
        envelope: &SealedEnvelope,
        session: &Session,
    ) -> Result<TrackingId, DispatchError> {
        let upload = Upload {
            sender: envelope.sender(),
            emitter: envelope.emitter(),
            token: session.token(),
            file_name: file_name(envelope),
            content: envelope.as_bytes(),
        };
        let receipt = self.transport.upload(&upload)?;
        let outcome = self.interpret(&receipt);
        match &outcome {
            Ok(track_id) => tracing::info!(
                %track_id,
                emitter = %upload.emitter,
                documents = envelope.document_count(),
                "envelope accepted"
            ),
            Err(e) => tracing::warn!(emitter = %upload.emitter, file = %upload.file_name, "envelope not accepted: {e}"),
        }
        outcome
    }

    fn interpret(&self, receipt: &str) -> Result<TrackingId, DispatchError> {
        let malformed = |reason: String| TransportError::MalformedResponse {
            endpoint: UPLOAD_PATH.to_string(),
            reason,
        };
        let root = parse(receipt).map_err(|e| malformed(e.to_string()))?;
        let status = root
            .child_text("STATUS")
            .map(|s| s.trim().to_string())
            .ok_or_else(|| malformed("receipt has no STATUS".into()))?;
        if status == UPLOAD_OK {
            let track_id = root
                .child_text("TRACKID")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| malformed("accepted receipt has no TRACKID".into()))?;
            return Ok(TrackingId(track_id));
        }
        let detail = root
            .find("DETAIL")
            .map(|d| {
                d.child_elements()
                    .map(|e| e.text().trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|s| !s.is_empty());
        Err(DispatchError::Rejected {
            category: self.rejections.classify(&status),
            code: status,
            detail,
        })
    }
}

fn file_name(envelope: &SealedEnvelope) -> String {
    let stamp: String = envelope
        .sealed_at()
        .to_authority_string()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    format!("{}_{}.xml", envelope.emitter().number(), stamp)
}
