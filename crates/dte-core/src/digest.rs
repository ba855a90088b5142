//! # Content Digest — Digests over Canonical Bytes
//!
//! Defines `DigestAlgorithm` and `ContentDigest` for the reference digests
//! carried in signature blocks.
//!
//! ## Security Invariant
//!
//! `ContentDigest` can only be computed from `CanonicalBytes`, ensuring that
//! every digest in the system is produced over the canonical form of a
//! subtree. This is enforced by the signature of [`digest()`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// The hash algorithm used to produce a reference digest.
///
/// The authority mandates SHA-1 for document and envelope signatures;
/// SHA-256 is accepted on verification and selectable when signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-1 (`http://www.w3.org/2000/09/xmldsig#sha1`).
    Sha1,
    /// SHA-256 (`http://www.w3.org/2001/04/xmlenc#sha256`).
    Sha256,
}

impl DigestAlgorithm {
    /// Returns the algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// The XML Signature `DigestMethod` URI.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
        }
    }

    /// Resolve a `DigestMethod` URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::Sha1, Self::Sha256]
            .into_iter()
            .find(|alg| alg.uri() == uri)
    }

    /// Hash arbitrary bytes. Callers outside this module go through [`digest()`].
    pub(crate) fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest with its algorithm tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// The hash algorithm that produced this digest.
    pub algorithm: DigestAlgorithm,
    /// The raw digest value.
    pub bytes: Vec<u8>,
}

impl ContentDigest {
    /// Render as standard base64, the form used in `DigestValue`.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// Compute a digest over canonical bytes.
pub fn digest(algorithm: DigestAlgorithm, data: &CanonicalBytes) -> ContentDigest {
    ContentDigest {
        algorithm,
        bytes: algorithm.hash(data.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::flatten;
    use crate::xml::parse;

    #[test]
    fn test_digest_independent_of_formatting() {
        let a = flatten(&parse("<a y='2' x='1'><b/></a>").unwrap()).unwrap();
        let b = flatten(&parse("<a x=\"1\" y=\"2\">\n  <b></b>\n</a>").unwrap()).unwrap();
        assert_eq!(digest(DigestAlgorithm::Sha1, &a), digest(DigestAlgorithm::Sha1, &b));
    }

    #[test]
    fn test_known_sha1_vector() {
        // SHA-1("<a></a>")
        let cb = flatten(&parse("<a/>").unwrap()).unwrap();
        assert_eq!(cb.as_bytes(), b"<a></a>");
        let d = digest(DigestAlgorithm::Sha1, &cb);
        assert_eq!(d.to_hex(), "f61bc7e2aced9c862061f24344b9c430f25da1a6");
    }

    #[test]
    fn test_sha256_length_and_display() {
        let cb = flatten(&parse("<a/>").unwrap()).unwrap();
        let d = digest(DigestAlgorithm::Sha256, &cb);
        assert_eq!(d.bytes.len(), 32);
        assert!(d.to_string().starts_with("sha256:"));
    }

    #[test]
    fn test_uri_roundtrip() {
        for alg in [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256] {
            assert_eq!(DigestAlgorithm::from_uri(alg.uri()), Some(alg));
        }
        assert_eq!(DigestAlgorithm::from_uri("urn:md5"), None);
    }

    #[test]
    fn test_different_content_different_digest() {
        let a = flatten(&parse("<a>1</a>").unwrap()).unwrap();
        let b = flatten(&parse("<a>2</a>").unwrap()).unwrap();
        assert_ne!(digest(DigestAlgorithm::Sha1, &a), digest(DigestAlgorithm::Sha1, &b));
    }
}
