//! Arguments and helpers shared by several subcommands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use dte_crypto::LocalSigner;
use dte_stamp::{AuthorityKeyRing, CafValidator, Document};
use serde::Serialize;

/// Where the signing key and certificate come from.
///
/// Without flags the paths are read from `DTE_SIGNING_KEY_PATH` and
/// `DTE_SIGNING_CERT_PATH`.
#[derive(Args, Debug, Clone, Default)]
pub struct SignerArgs {
    /// PEM private key (PKCS#1 or PKCS#8).
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,
    /// PEM certificate matching the key.
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,
}

impl SignerArgs {
    /// Load the signer from the flags or the environment.
    pub fn load(&self) -> Result<LocalSigner> {
        let signer = match (&self.key, &self.cert) {
            (Some(key), Some(cert)) => LocalSigner::from_pem_files(key, cert).with_context(|| {
                format!("loading signer from {} and {}", key.display(), cert.display())
            })?,
            (None, None) => LocalSigner::from_env().context("loading signer from environment")?,
            _ => bail!("--key and --cert must be given together"),
        };
        tracing::debug!(?signer, "signer loaded");
        Ok(signer)
    }
}

/// The authority keys a folio authorization is checked against.
#[derive(Args, Debug, Clone)]
pub struct AuthorityArgs {
    /// Directory of `<serial>.pem` authority public keys.
    #[arg(long = "authority-keys", env = "DTE_AUTHORITY_KEYS")]
    pub keys: PathBuf,
    /// Key serial that marks a certification-environment authorization.
    /// May be repeated. Defaults to the authority's certification serial.
    #[arg(long = "certification-serial")]
    pub certification_serials: Vec<u32>,
}

impl AuthorityArgs {
    /// Validator over the key directory.
    pub fn validator(&self) -> Result<CafValidator> {
        let ring = AuthorityKeyRing::from_pem_dir(&self.keys)
            .with_context(|| format!("loading authority keys from {}", self.keys.display()))?;
        if ring.is_empty() {
            bail!("no authority keys found in {}", self.keys.display());
        }
        let validator = CafValidator::new(ring);
        if self.certification_serials.is_empty() {
            return Ok(validator);
        }
        Ok(validator.with_certification_serials(self.certification_serials.iter().copied()))
    }
}

/// Read a UTF-8 file.
pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Read and parse a tax document.
pub fn read_document(path: &Path) -> Result<Document> {
    Document::from_xml(&read_text(path)?).with_context(|| format!("parsing {}", path.display()))
}

/// Write `content` to `path`, or to stdout when no path is given.
pub fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = content.len(), "output written");
        }
        None => println!("{content}"),
    }
    Ok(())
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_flags_must_come_in_pairs() {
        let args = SignerArgs {
            key: Some(PathBuf::from("key.pem")),
            cert: None,
        };
        assert!(args.load().is_err());
    }

    #[test]
    fn empty_key_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.txt"), "not a key").unwrap();
        let args = AuthorityArgs {
            keys: dir.path().to_path_buf(),
            certification_serials: vec![],
        };
        let err = args.validator().unwrap_err();
        assert!(err.to_string().contains("no authority keys"));
    }

    #[test]
    fn write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xml");
        write_output(Some(&path), "<a/>").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<a/>");
    }
}
