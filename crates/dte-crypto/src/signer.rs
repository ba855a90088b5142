//! # Signer Capability
//!
//! Abstracts the issuer's signing key and certificate behind a trait, so
//! document signing, envelope sealing, and the authentication handshake
//! depend on the capability rather than on where the key lives.
//!
//! - [`LocalSigner`]: RSA private key and certificate held in memory,
//!   built from PEM text, files, or environment-named files.
//!
//! ## Security Invariants
//!
//! - `Signer` is `Send + Sync` so a single signer can serve every thread.
//! - Signing input is `&CanonicalBytes` (never raw bytes).
//! - A `LocalSigner` refuses a certificate whose public key is not the
//!   public half of its private key.
//! - Key material never appears in `Debug` output; `RsaPrivateKey`
//!   zeroizes itself on drop.

use std::path::Path;

use dte_core::CanonicalBytes;
use rsa::RsaPrivateKey;

use crate::certificate::Certificate;
use crate::error::CryptoError;
use crate::keys::{self, SignatureAlgorithm};

/// Environment variable naming the PEM private key file.
pub const SIGNING_KEY_PATH_VAR: &str = "DTE_SIGNING_KEY_PATH";
/// Environment variable naming the PEM certificate file.
pub const SIGNING_CERT_PATH_VAR: &str = "DTE_SIGNING_CERT_PATH";

/// Signing capability: an RSA key plus the certificate that vouches for it.
pub trait Signer: Send + Sync {
    /// Sign canonicalized data.
    fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        data: &CanonicalBytes,
    ) -> Result<Vec<u8>, CryptoError>;

    /// The certificate embedded in produced signature blocks.
    fn certificate(&self) -> &Certificate;

    /// Human-readable name for this provider (for diagnostics/logging).
    fn provider_name(&self) -> &str;
}

// ─── LocalSigner ─────────────────────────────────────────────────────────

/// In-memory RSA signer.
pub struct LocalSigner {
    key: RsaPrivateKey,
    certificate: Certificate,
}

impl LocalSigner {
    /// Pair a private key with its certificate.
    ///
    /// Fails with `InvalidKey` if the certificate belongs to another key.
    pub fn new(key: RsaPrivateKey, certificate: Certificate) -> Result<Self, CryptoError> {
        if &key.to_public_key() != certificate.public_key() {
            return Err(CryptoError::InvalidKey(format!(
                "certificate {} does not match the private key",
                certificate.subject()
            )));
        }
        Ok(Self { key, certificate })
    }

    /// Build from PEM text.
    pub fn from_pem(key_pem: &str, cert_pem: &str) -> Result<Self, CryptoError> {
        Self::new(keys::private_key_from_pem(key_pem)?, Certificate::from_pem(cert_pem)?)
    }

    /// Build from PEM files on disk.
    pub fn from_pem_files(key_path: &Path, cert_path: &Path) -> Result<Self, CryptoError> {
        let key_pem = std::fs::read_to_string(key_path)?;
        let cert_pem = std::fs::read_to_string(cert_path)?;
        Self::from_pem(&key_pem, &cert_pem)
    }

    /// Build from the files named by `DTE_SIGNING_KEY_PATH` and
    /// `DTE_SIGNING_CERT_PATH`.
    pub fn from_env() -> Result<Self, CryptoError> {
        let key_path = env_path(SIGNING_KEY_PATH_VAR)?;
        let cert_path = env_path(SIGNING_CERT_PATH_VAR)?;
        Self::from_pem_files(Path::new(&key_path), Path::new(&cert_path))
    }
}

fn env_path(var: &str) -> Result<String, CryptoError> {
    std::env::var(var)
        .map_err(|_| CryptoError::InvalidKey(format!("environment variable {var} not set")))
}

impl Signer for LocalSigner {
    fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        data: &CanonicalBytes,
    ) -> Result<Vec<u8>, CryptoError> {
        keys::sign(&self.key, algorithm, data)
    }

    fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    fn provider_name(&self) -> &str {
        "LocalSigner"
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("key", &"[REDACTED]")
            .field("certificate", &self.certificate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self_signed_certificate, test_key};
    use dte_core::{flatten, parse};
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use x509_cert::der::EncodePem;

    #[test]
    fn test_mismatched_certificate_rejected() {
        let cert = self_signed_certificate(test_key(1), "Other");
        let result = LocalSigner::new(test_key(0).clone(), cert);
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_signature_verifies_under_certificate_key() {
        let signer = LocalSigner::new(
            test_key(0).clone(),
            self_signed_certificate(test_key(0), "Signer"),
        )
        .unwrap();
        let data = flatten(&parse("<x>1</x>").unwrap()).unwrap();
        let sig = signer.sign(SignatureAlgorithm::RsaSha1, &data).unwrap();
        keys::verify(signer.certificate().public_key(), SignatureAlgorithm::RsaSha1, &data, &sig)
            .unwrap();
        assert_eq!(signer.provider_name(), "LocalSigner");
    }

    #[test]
    fn test_from_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.pem");
        let cert_path = dir.path().join("cert.pem");
        let key = test_key(2);
        std::fs::write(&key_path, key.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
        let cert = self_signed_certificate(key, "File Signer");
        let x509 = <x509_cert::Certificate as x509_cert::der::Decode>::from_der(cert.der()).unwrap();
        std::fs::write(&cert_path, x509.to_pem(LineEnding::LF).unwrap()).unwrap();

        let signer = LocalSigner::from_pem_files(&key_path, &cert_path).unwrap();
        assert_eq!(signer.certificate(), &cert);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = LocalSigner::from_pem_files(
            Path::new("/nonexistent/key.pem"),
            Path::new("/nonexistent/cert.pem"),
        );
        assert!(matches!(result, Err(CryptoError::Io(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = LocalSigner::new(
            test_key(0).clone(),
            self_signed_certificate(test_key(0), "Redacted"),
        )
        .unwrap();
        let dbg = format!("{signer:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("BEGIN"));
    }
}
