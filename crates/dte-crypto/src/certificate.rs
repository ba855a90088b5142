//! # Signing Certificates
//!
//! An X.509 certificate as carried in `X509Certificate` elements, decoded
//! once and paired with its RSA public key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_cert::der::pem::LineEnding;
use x509_cert::der::{Decode, DecodePem, Encode, EncodePem};
use x509_cert::Certificate as X509Certificate;

use crate::error::CryptoError;
use crate::keys::strip_whitespace;

/// A decoded X.509 certificate holding an RSA public key.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    public_key: RsaPublicKey,
    subject: String,
}

impl Certificate {
    /// Decode a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let cert = X509Certificate::from_der(der)
            .map_err(|e| CryptoError::CertificateMalformed(e.to_string()))?;
        Self::from_x509(&cert, der.to_vec())
    }

    /// Decode a PEM `CERTIFICATE` block.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let cert = X509Certificate::from_pem(pem.trim().as_bytes())
            .map_err(|e| CryptoError::CertificateMalformed(e.to_string()))?;
        let der = cert
            .to_der()
            .map_err(|e| CryptoError::CertificateMalformed(e.to_string()))?;
        Self::from_x509(&cert, der)
    }

    /// Decode the base64 body of an `X509Certificate` element.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let der = STANDARD
            .decode(strip_whitespace(text))
            .map_err(|e| CryptoError::CertificateMalformed(format!("base64: {e}")))?;
        Self::from_der(&der)
    }

    fn from_x509(cert: &X509Certificate, der: Vec<u8>) -> Result<Self, CryptoError> {
        let spki = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| CryptoError::CertificateMalformed(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| CryptoError::CertificateMalformed(format!("no RSA public key: {e}")))?;
        Ok(Self {
            der,
            public_key,
            subject: cert.tbs_certificate.subject.to_string(),
        })
    }

    /// The certificate's RSA public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The subject distinguished name, RFC 4514 style.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Raw DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Base64 DER, the body of an `X509Certificate` element.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.der)
    }

    /// PEM `CERTIFICATE` block.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        X509Certificate::from_der(&self.der)
            .and_then(|cert| cert.to_pem(LineEnding::LF))
            .map_err(|e| CryptoError::CertificateMalformed(e.to_string()))
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("der_len", &self.der.len())
            .finish()
    }
}
