//! # Authority Key Ring
//!
//! The tax authority's public keys, indexed by the key serial (`IDK`)
//! written into every folio authorization. Injected into the validator at
//! construction; there is no process-wide key table.

use std::collections::BTreeMap;
use std::path::Path;

use dte_crypto::keys::public_key_from_pem;
use dte_crypto::CryptoError;
use rsa::RsaPublicKey;

/// Authority public keys by key serial.
#[derive(Debug, Clone, Default)]
pub struct AuthorityKeyRing {
    keys: BTreeMap<u32, RsaPublicKey>,
}

impl AuthorityKeyRing {
    /// An empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the key for `serial`.
    pub fn insert(&mut self, serial: u32, key: RsaPublicKey) -> Option<RsaPublicKey> {
        self.keys.insert(serial, key)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_key(mut self, serial: u32, key: RsaPublicKey) -> Self {
        self.insert(serial, key);
        self
    }

    /// Register a PEM-encoded key for `serial`.
    pub fn insert_pem(&mut self, serial: u32, pem: &str) -> Result<(), CryptoError> {
        self.insert(serial, public_key_from_pem(pem)?);
        Ok(())
    }

    /// Load every `<serial>.pem` file in `dir`. Other files are ignored.
    pub fn from_pem_dir(dir: &Path) -> Result<Self, CryptoError> {
        let mut ring = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let Some(serial) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            else {
                tracing::debug!(path = %path.display(), "skipping non-serial key file");
                continue;
            };
            let pem = std::fs::read_to_string(&path)?;
            ring.insert_pem(serial, &pem)?;
        }
        tracing::info!(dir = %dir.display(), keys = ring.len(), "authority key ring loaded");
        Ok(ring)
    }

    /// The key for `serial`, if registered.
    pub fn get(&self, serial: u32) -> Option<&RsaPublicKey> {
        self.keys.get(&serial)
    }

    /// Registered serials in ascending order.
    pub fn serials(&self) -> impl Iterator<Item = u32> + '_ {
        self.keys.keys().copied()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is registered.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dte_crypto::fixtures::test_key;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};

    fn pem(slot: usize) -> String {
        test_key(slot)
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let ring = AuthorityKeyRing::new().with_key(100, test_key(0).to_public_key());
        assert_eq!(ring.get(100), Some(&test_key(0).to_public_key()));
        assert!(ring.get(300).is_none());
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_from_pem_dir_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("100.pem"), pem(0)).unwrap();
        std::fs::write(dir.path().join("300.pem"), pem(1)).unwrap();
        std::fs::write(dir.path().join("README.pem"), "not a key").unwrap();
        std::fs::write(dir.path().join("100.txt"), "ignored").unwrap();

        let ring = AuthorityKeyRing::from_pem_dir(dir.path()).unwrap();
        assert_eq!(ring.serials().collect::<Vec<_>>(), vec![100, 300]);
        assert_eq!(ring.get(300), Some(&test_key(1).to_public_key()));
    }

    #[test]
    fn test_from_pem_dir_rejects_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("7.pem"), "-----BEGIN PUBLIC KEY-----\nAA==\n-----END PUBLIC KEY-----\n").unwrap();
        assert!(matches!(
            AuthorityKeyRing::from_pem_dir(dir.path()),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_missing_dir_is_io_error() {
        assert!(matches!(
            AuthorityKeyRing::from_pem_dir(Path::new("/nonexistent/keys")),
            Err(CryptoError::Io(_))
        ));
    }
}
