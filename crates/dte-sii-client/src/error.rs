//! Authority client error types.

use dte_crypto::SignatureError;

use crate::config::ConfigError;
use crate::dispatch::RejectionCategory;

/// Failure to complete one request/response exchange with the authority.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection, timeout, or body read failure.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The authority answered with a non-2xx status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// The response could not be interpreted.
    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TransportError {
    /// Whether repeating the exchange may succeed: connectivity failures and
    /// 5xx answers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            Self::Status { status, .. } => *status >= 500,
            Self::MalformedResponse { .. } | Self::Config(_) => false,
        }
    }

    /// The endpoint involved, when known.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Http { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::MalformedResponse { endpoint, .. } => Some(endpoint),
            Self::Config(_) => None,
        }
    }
}

/// Which handshake step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Seed request.
    Seed,
    /// Seed signing.
    Sign,
    /// Token request.
    Token,
}

/// The handshake reached `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The seed endpoint answered with a non-"00" status.
    #[error("seed request rejected by {endpoint}: status {status}{}", detail_suffix(.detail))]
    SeedRejected {
        endpoint: String,
        status: String,
        detail: Option<String>,
    },
    /// The seed exchange itself failed.
    #[error("seed request failed: {0}")]
    SeedTransport(#[source] TransportError),
    /// The signer could not sign the seed request.
    #[error("signing the seed failed: {0}")]
    Sign(#[from] SignatureError),
    /// The token endpoint answered with a non-"00" status.
    #[error("token request rejected by {endpoint}: status {status}{}", detail_suffix(.detail))]
    TokenRejected {
        endpoint: String,
        status: String,
        detail: Option<String>,
    },
    /// The token exchange itself failed.
    #[error("token request failed: {0}")]
    TokenTransport(#[source] TransportError),
}

impl AuthError {
    /// The step that failed.
    pub fn step(&self) -> HandshakeStep {
        match self {
            Self::SeedRejected { .. } | Self::SeedTransport(_) => HandshakeStep::Seed,
            Self::Sign(_) => HandshakeStep::Sign,
            Self::TokenRejected { .. } | Self::TokenTransport(_) => HandshakeStep::Token,
        }
    }

    /// Whether a fresh handshake may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SeedTransport(e) | Self::TokenTransport(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Dispatch did not yield a tracking id.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Connectivity failure or unreadable response. The authority may or may
    /// not have received the envelope.
    #[error("dispatch transport error: {0}")]
    Transport(#[from] TransportError),
    /// The authority read the envelope and refused it.
    #[error("dispatch rejected with status {code} ({category}){}", detail_suffix(.detail))]
    Rejected {
        code: String,
        category: RejectionCategory,
        detail: Option<String>,
    },
}

impl DispatchError {
    /// Whether the authority reports it already has this envelope.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                category: RejectionCategory::DuplicateSubmission,
                ..
            }
        )
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_transient_only_for_5xx() {
        let err = |status| TransportError::Status {
            endpoint: "/DTEWS/CrSeed.jws".into(),
            status,
            body: String::new(),
        };
        assert!(err(503).is_transient());
        assert!(!err(404).is_transient());
        assert_eq!(err(500).endpoint(), Some("/DTEWS/CrSeed.jws"));
    }

    #[test]
    fn rejected_display_carries_detail() {
        let err = AuthError::SeedRejected {
            endpoint: "/DTEWS/CrSeed.jws".into(),
            status: "-07".into(),
            detail: Some("Error interno".into()),
        };
        assert_eq!(
            err.to_string(),
            "seed request rejected by /DTEWS/CrSeed.jws: status -07: Error interno"
        );
        assert_eq!(err.step(), HandshakeStep::Seed);
        assert!(!err.is_transient());
    }

    #[test]
    fn duplicate_detection() {
        let dup = DispatchError::Rejected {
            code: "99".into(),
            category: RejectionCategory::DuplicateSubmission,
            detail: None,
        };
        assert!(dup.is_duplicate());
        assert_eq!(dup.to_string(), "dispatch rejected with status 99 (duplicate submission)");
    }
}
