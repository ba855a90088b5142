//! # dte-sii-client — Tax Authority Client
//!
//! Blocking client for the authority's three exchanges:
//! - **Seed** and **token** via [`auth`], the typestate handshake that turns
//!   a seed signed with the sender's certificate into a session token.
//! - **Upload** via [`dispatch`], which submits a sealed envelope with an
//!   authenticated session and classifies the receipt.
//!
//! ## Architecture
//!
//! Protocol logic only sees the authority's response documents through the
//! [`AuthorityTransport`] trait. [`HttpTransport`] carries them over HTTP;
//! tests substitute scripted transports.
//!
//! ## Retry Semantics
//!
//! Seed and token requests retry transient transport failures with
//! exponential backoff. Uploads are attempted exactly once.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub(crate) mod retry;
pub mod transport;

pub use auth::{AuthClient, Handshake, Session};
pub use config::{ConfigError, Environment, SiiConfig};
pub use dispatch::{DispatchClient, RejectionCategory, RejectionTable, TrackingId};
pub use error::{AuthError, DispatchError, HandshakeStep, TransportError};
pub use retry::RetryPolicy;
pub use transport::{AuthorityTransport, HttpTransport, Upload};

use std::sync::Arc;

use dte_crypto::Signer;
use dte_envelope::SealedEnvelope;

/// Failure to submit an envelope end to end.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The handshake failed; nothing was uploaded.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// The upload failed or was rejected.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Top-level authority client: a fresh handshake per submission, then one
/// upload.
#[derive(Clone)]
pub struct SiiClient {
    config: SiiConfig,
    transport: Arc<dyn AuthorityTransport>,
    dispatch: DispatchClient,
}

impl std::fmt::Debug for SiiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiiClient")
            .field("config", &self.config)
            .field("transport", &self.transport.transport_name())
            .finish_non_exhaustive()
    }
}

impl SiiClient {
    /// HTTP client from configuration with the default rejection table.
    pub fn new(config: SiiConfig) -> Result<Self, TransportError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport, RejectionTable::default()))
    }

    /// Client over an explicit transport.
    pub fn with_transport(
        config: SiiConfig,
        transport: Arc<dyn AuthorityTransport>,
        rejections: RejectionTable,
    ) -> Self {
        Self {
            dispatch: DispatchClient::new(transport.clone(), rejections),
            transport,
            config,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SiiConfig {
        &self.config
    }

    /// Handshake client over this client's transport.
    pub fn auth(&self) -> AuthClient<'_> {
        AuthClient::new(self.transport.as_ref(), &self.config)
    }

    /// The dispatch client.
    pub fn dispatcher(&self) -> &DispatchClient {
        &self.dispatch
    }

    /// Authenticate with `signer`, then upload `envelope` once.
    pub fn submit(
        &self,
        envelope: &SealedEnvelope,
        signer: &dyn Signer,
    ) -> Result<TrackingId, SubmitError> {
        let session = self.auth().authenticate(signer)?;
        Ok(self.dispatch.dispatch(envelope, &session)?)
    }
}
