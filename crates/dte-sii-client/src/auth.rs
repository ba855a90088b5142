//! # Authentication Handshake Typestate Machine
//!
//! Obtains a session token from the authority in three exchanges. Each
//! state is a distinct type, so a token can only be requested with a signed
//! seed and only an `Authenticated` handshake yields a [`Session`].
//!
//! ## States
//!
//! ```text
//! Idle ──request_seed()──▶ SeedRequested ──sign_seed()──▶ SeedSigned
//!                                                              │
//!                                      request_token() ────────┘
//!                                              │
//!                                              ▼
//!                                        Authenticated ──into_session()──▶ Session
//! ```
//!
//! Every transition consumes the handshake. A failed transition returns
//! [`AuthError`] and the handshake is gone: `Failed` is the error itself,
//! and `TokenRequested` only exists for the duration of `request_token()`.
//!
//! ## Security Invariant
//!
//! The token is held in [`Zeroizing`] storage, is redacted from `Debug`
//! output, and is never cached. Each dispatch runs a fresh handshake.

use dte_core::{parse, Element};
use dte_crypto::xmldsig::{self, Reference};
use dte_crypto::{SignatureAlgorithm, Signer};
use zeroize::Zeroizing;

use crate::config::SiiConfig;
use crate::error::{AuthError, TransportError};
use crate::retry::{retry_transport, RetryPolicy};
use crate::transport::{AuthorityTransport, SEED_PATH, TOKEN_PATH};

/// Status the authority reports for a successful seed or token request.
pub const STATUS_OK: &str = "00";

// ─── State Types ─────────────────────────────────────────────────────

/// Handshake state: nothing requested yet.
#[derive(Debug, Clone, Copy)]
pub struct Idle;

/// Handshake state: the authority issued a seed.
#[derive(Debug, Clone)]
pub struct SeedRequested {
    seed: String,
}

/// Handshake state: the seed request document is signed.
#[derive(Debug, Clone)]
pub struct SeedSigned {
    seed: String,
    signed_request: String,
}

/// Handshake state: a token was issued (terminal).
pub struct Authenticated {
    session: Session,
}

impl std::fmt::Debug for Authenticated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticated").field("session", &self.session).finish()
    }
}

// ─── Sealed Trait ────────────────────────────────────────────────────

mod private {
    pub trait Sealed {}
    impl Sealed for super::Idle {}
    impl Sealed for super::SeedRequested {}
    impl Sealed for super::SeedSigned {}
    impl Sealed for super::Authenticated {}
}

/// Marker trait for the handshake states.
pub trait HandshakeState: private::Sealed + std::fmt::Debug {
    /// State name for logs.
    fn name() -> &'static str;
}

impl HandshakeState for Idle {
    fn name() -> &'static str {
        "IDLE"
    }
}
impl HandshakeState for SeedRequested {
    fn name() -> &'static str {
        "SEED_REQUESTED"
    }
}
impl HandshakeState for SeedSigned {
    fn name() -> &'static str {
        "SEED_SIGNED"
    }
}
impl HandshakeState for Authenticated {
    fn name() -> &'static str {
        "AUTHENTICATED"
    }
}

// ─── Session ─────────────────────────────────────────────────────────

/// An authenticated session. Only obtainable from a completed handshake.
pub struct Session {
    seed: String,
    token: Zeroizing<String>,
}

impl Session {
    /// The seed the token was issued for.
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// The opaque session token.
    pub fn token(&self) -> &str {
        self.token.as_str()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("seed", &self.seed)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// ─── Handshake ───────────────────────────────────────────────────────

/// One run of the seed → sign → token protocol.
pub struct Handshake<'t, S: HandshakeState> {
    transport: &'t dyn AuthorityTransport,
    retry: RetryPolicy,
    state: S,
}

impl<S: HandshakeState> std::fmt::Debug for Handshake<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("state", &S::name())
            .field("transport", &self.transport.transport_name())
            .finish_non_exhaustive()
    }
}

impl<'t, S: HandshakeState> Handshake<'t, S> {
    /// Current state name.
    pub fn state_name(&self) -> &'static str {
        S::name()
    }

    fn advance<N: HandshakeState>(self, state: N) -> Handshake<'t, N> {
        tracing::debug!(from = S::name(), to = N::name(), "handshake transition");
        Handshake {
            transport: self.transport,
            retry: self.retry,
            state,
        }
    }
}

impl<'t> Handshake<'t, Idle> {
    /// New handshake making one attempt per exchange.
    pub fn new(transport: &'t dyn AuthorityTransport) -> Self {
        Self::with_retry(transport, RetryPolicy::none())
    }

    /// New handshake retrying transient transport failures.
    pub fn with_retry(transport: &'t dyn AuthorityTransport, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            state: Idle,
        }
    }

    /// Ask the authority for a seed.
    ///
    /// # Errors
    ///
    /// `SeedRejected` on a non-"00" status, `SeedTransport` when the
    /// exchange fails or the answer is unreadable.
    pub fn request_seed(self) -> Result<Handshake<'t, SeedRequested>, AuthError> {
        let response = retry_transport(self.retry, || self.transport.request_seed())
            .map_err(AuthError::SeedTransport)?;
        let body = read_response(SEED_PATH, &response).map_err(AuthError::SeedTransport)?;
        if body.status != STATUS_OK {
            tracing::warn!(endpoint = SEED_PATH, status = %body.status, "seed request rejected");
            return Err(AuthError::SeedRejected {
                endpoint: SEED_PATH.to_string(),
                status: body.status,
                detail: body.detail,
            });
        }
        let seed = body
            .value("SEMILLA")
            .ok_or_else(|| AuthError::SeedTransport(missing(SEED_PATH, "SEMILLA")))?;
        Ok(self.advance(SeedRequested { seed }))
    }
}

impl<'t> Handshake<'t, SeedRequested> {
    /// The issued seed.
    pub fn seed(&self) -> &str {
        &self.state.seed
    }

    /// Wrap the seed in a `getToken` request and sign the whole document.
    ///
    /// # Errors
    ///
    /// `Sign` when the signer fails.
    pub fn sign_seed(self, signer: &dyn Signer) -> Result<Handshake<'t, SeedSigned>, AuthError> {
        let mut request = Element::new("getToken").with_child(
            Element::new("item").with_child(Element::leaf("Semilla", self.state.seed.clone())),
        );
        xmldsig::sign_enveloped(
            &mut request,
            Reference::WholeDocument,
            signer,
            SignatureAlgorithm::RsaSha1,
        )?;
        let seed = self.state.seed.clone();
        Ok(self.advance(SeedSigned {
            seed,
            signed_request: request.to_document(),
        }))
    }
}

impl<'t> Handshake<'t, SeedSigned> {
    /// The signed request document that will be submitted.
    pub fn signed_request(&self) -> &str {
        &self.state.signed_request
    }

    /// Exchange the signed seed for a token.
    ///
    /// # Errors
    ///
    /// `TokenRejected` on a non-"00" status, `TokenTransport` when the
    /// exchange fails or the answer is unreadable.
    pub fn request_token(self) -> Result<Handshake<'t, Authenticated>, AuthError> {
        let response = retry_transport(self.retry, || {
            self.transport.request_token(&self.state.signed_request)
        })
        .map_err(AuthError::TokenTransport)?;
        let body = read_response(TOKEN_PATH, &response).map_err(AuthError::TokenTransport)?;
        if body.status != STATUS_OK {
            tracing::warn!(endpoint = TOKEN_PATH, status = %body.status, "token request rejected");
            return Err(AuthError::TokenRejected {
                endpoint: TOKEN_PATH.to_string(),
                status: body.status,
                detail: body.detail,
            });
        }
        let token = body
            .value("TOKEN")
            .ok_or_else(|| AuthError::TokenTransport(missing(TOKEN_PATH, "TOKEN")))?;
        let session = Session {
            seed: self.state.seed.clone(),
            token: Zeroizing::new(token),
        };
        tracing::info!(transport = self.transport.transport_name(), "authenticated with the authority");
        Ok(self.advance(Authenticated { session }))
    }
}

impl Handshake<'_, Authenticated> {
    /// The session.
    pub fn session(&self) -> &Session {
        &self.state.session
    }

    /// Take the session out of the handshake.
    pub fn into_session(self) -> Session {
        self.state.session
    }
}

// ─── Response parsing ────────────────────────────────────────────────

/// `RESPUESTA` document: `RESP_HDR/ESTADO` (+ optional `GLOSA`) and a
/// `RESP_BODY` holding the payload.
struct AuthorityResponse {
    status: String,
    detail: Option<String>,
    body: Option<Element>,
}

impl AuthorityResponse {
    fn value(&self, name: &str) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| b.child_text(name))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn read_response(endpoint: &str, xml: &str) -> Result<AuthorityResponse, TransportError> {
    let root = parse(xml).map_err(|e| TransportError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let status = root
        .find("RESP_HDR/ESTADO")
        .map(|e| e.text().trim().to_string())
        .ok_or_else(|| missing(endpoint, "RESP_HDR/ESTADO"))?;
    Ok(AuthorityResponse {
        status,
        detail: root
            .find("RESP_HDR/GLOSA")
            .map(|e| e.text().trim().to_string())
            .filter(|s| !s.is_empty()),
        body: root.child("RESP_BODY").cloned(),
    })
}

fn missing(endpoint: &str, field: &str) -> TransportError {
    TransportError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason: format!("response has no {field}"),
    }
}

// ─── Client ──────────────────────────────────────────────────────────

/// Runs complete handshakes with the configured retry policy.
pub struct AuthClient<'t> {
    transport: &'t dyn AuthorityTransport,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AuthClient<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("transport", &self.transport.transport_name())
            .field("retry", &self.retry)
            .finish()
    }
}

impl<'t> AuthClient<'t> {
    /// Client over `transport` retrying per `config`.
    pub fn new(transport: &'t dyn AuthorityTransport, config: &SiiConfig) -> Self {
        Self {
            transport,
            retry: RetryPolicy::from_config(config),
        }
    }

    /// Client with an explicit retry policy.
    pub fn with_retry(transport: &'t dyn AuthorityTransport, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Start a handshake.
    pub fn handshake(&self) -> Handshake<'t, Idle> {
        Handshake::with_retry(self.transport, self.retry)
    }

    /// Run seed → sign → token and return the session.
    ///
    /// Transient transport failures are retried within each exchange.
    /// Authority status rejections and signing failures are returned at once.
    pub fn authenticate(&self, signer: &dyn Signer) -> Result<Session, AuthError> {
        Ok(self
            .handshake()
            .request_seed()?
            .sign_seed(signer)?
            .request_token()?
            .into_session())
    }
}
