//! # RSA Signing and Verification
//!
//! RSA PKCS#1 v1.5 signatures over canonical bytes, key decoding from the
//! encodings the authority uses (PEM blocks and base64 modulus/exponent
//! pairs), and the key-pair self-consistency check used on authorization
//! blocks.
//!
//! ## Security Invariant
//!
//! Signing input MUST be `&CanonicalBytes`; raw bytes cannot be signed.
//! Whatever is signed here was produced by the canonical flattening in
//! `dte-core`, so verification elsewhere recomputes the exact same input.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dte_core::{digest, CanonicalBytes, DigestAlgorithm};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::CryptoError;

/// Signature algorithm for document signatures and stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 over SHA-1, required by the authority.
    RsaSha1,
    /// RSA PKCS#1 v1.5 over SHA-256.
    RsaSha256,
}

impl SignatureAlgorithm {
    /// The XML Signature `SignatureMethod` URI.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
        }
    }

    /// The tag written in a stamp's or authorization's `algoritmo` attribute.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "SHA1withRSA",
            Self::RsaSha256 => "SHA256withRSA",
        }
    }

    /// Digest used both for the signature and for reference digests.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            Self::RsaSha1 => DigestAlgorithm::Sha1,
            Self::RsaSha256 => DigestAlgorithm::Sha256,
        }
    }

    /// Resolve a `SignatureMethod` URI.
    pub fn from_uri(uri: &str) -> Result<Self, CryptoError> {
        [Self::RsaSha1, Self::RsaSha256]
            .into_iter()
            .find(|a| a.uri() == uri)
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(uri.to_string()))
    }

    /// Resolve an `algoritmo` tag.
    pub fn from_tag(tag: &str) -> Result<Self, CryptoError> {
        [Self::RsaSha1, Self::RsaSha256]
            .into_iter()
            .find(|a| a.tag() == tag)
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(tag.to_string()))
    }

    fn padding(&self) -> Pkcs1v15Sign {
        match self {
            Self::RsaSha1 => Pkcs1v15Sign::new::<Sha1>(),
            Self::RsaSha256 => Pkcs1v15Sign::new::<Sha256>(),
        }
    }
}

/// Sign canonical bytes with an RSA private key.
pub fn sign(
    key: &RsaPrivateKey,
    algorithm: SignatureAlgorithm,
    data: &CanonicalBytes,
) -> Result<Vec<u8>, CryptoError> {
    let hashed = digest(algorithm.digest_algorithm(), data);
    key.sign_with_rng(&mut OsRng, algorithm.padding(), &hashed.bytes)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))
}

/// Verify an RSA signature over canonical bytes.
pub fn verify(
    key: &RsaPublicKey,
    algorithm: SignatureAlgorithm,
    data: &CanonicalBytes,
    signature: &[u8],
) -> Result<(), CryptoError> {
    let hashed = digest(algorithm.digest_algorithm(), data);
    key.verify(algorithm.padding(), &hashed.bytes, signature)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))
}

/// Decode a PEM private key (`RSA PRIVATE KEY` or PKCS#8 `PRIVATE KEY`).
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    let pem = pem.trim();
    let result = if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| e.to_string())
    } else {
        RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| e.to_string())
    };
    result.map_err(CryptoError::InvalidKey)
}

/// Decode a PEM public key (`PUBLIC KEY` or `RSA PUBLIC KEY`).
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    let pem = pem.trim();
    let result = if pem.contains("BEGIN RSA PUBLIC KEY") {
        RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| e.to_string())
    } else {
        RsaPublicKey::from_public_key_pem(pem).map_err(|e| e.to_string())
    };
    result.map_err(CryptoError::InvalidKey)
}

/// Build a public key from base64 big-endian modulus and exponent.
pub fn public_key_from_components(modulus: &str, exponent: &str) -> Result<RsaPublicKey, CryptoError> {
    let n = STANDARD.decode(strip_whitespace(modulus))?;
    let e = STANDARD.decode(strip_whitespace(exponent))?;
    RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
        .map_err(|err| CryptoError::InvalidKey(err.to_string()))
}

/// Base64 big-endian modulus and exponent of a public key.
pub fn public_key_components(key: &RsaPublicKey) -> (String, String) {
    (
        STANDARD.encode(key.n().to_bytes_be()),
        STANDARD.encode(key.e().to_bytes_be()),
    )
}

/// Whether `private` and `public` are two halves of the same key pair.
///
/// A fresh random challenge is transformed with the private key (PKCS#1
/// v1.5 type 1 padding, no digest prefix) and recovered with the public
/// key; the pair is consistent only if the recovered bytes are exactly the
/// challenge. This catches corrupted key material that a signature over
/// the public half alone cannot.
pub fn key_pair_consistent(private: &RsaPrivateKey, public: &RsaPublicKey) -> bool {
    let mut challenge = [0u8; 32];
    OsRng.fill_bytes(&mut challenge);
    let Ok(transformed) =
        private.sign_with_rng(&mut OsRng, Pkcs1v15Sign::new_unprefixed(), &challenge)
    else {
        return false;
    };
    public
        .verify(Pkcs1v15Sign::new_unprefixed(), &challenge, &transformed)
        .is_ok()
}

/// Remove line breaks and indentation from base64 text embedded in XML.
pub fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
