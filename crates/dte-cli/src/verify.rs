//! # Verify Subcommand
//!
//! Checks every signature block in a document or envelope and, given a
//! folio authorization, the stamps of the documents it covers. Prints one
//! JSON report.
//!
//! Exit code 0 when everything checked is valid, 1 otherwise.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dte_core::parse;
use dte_crypto::{verify_all, SignatureReport};
use dte_stamp::{Document, FolioAuthorization, Ted};
use serde::Serialize;

use crate::common::{print_json, read_text, AuthorityArgs};

/// Arguments for the `dte verify` subcommand.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signed document or sealed envelope.
    pub file: PathBuf,

    /// Also check stamps against this folio authorization.
    #[arg(long, requires = "keys")]
    pub caf: Option<PathBuf>,

    /// Directory of `<serial>.pem` authority public keys (with `--caf`).
    #[arg(long = "authority-keys", env = "DTE_AUTHORITY_KEYS")]
    pub keys: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct BlockReport {
    position: usize,
    reference: Option<String>,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    signer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<SignatureReport> for BlockReport {
    fn from(report: SignatureReport) -> Self {
        let (signer, error) = match report.outcome {
            Ok(verified) => (Some(verified.signer_subject), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            position: report.position,
            reference: report.reference,
            valid: error.is_none(),
            signer,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
struct StampReport {
    folio: u64,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    root: String,
    signatures: Vec<BlockReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stamps: Vec<StampReport>,
    valid: bool,
}

/// Execute the verify subcommand.
pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    let root = parse(&read_text(&args.file)?)
        .with_context(|| format!("parsing {}", args.file.display()))?;
    let signatures: Vec<BlockReport> = verify_all(&root).into_iter().map(BlockReport::from).collect();

    let stamps = match (&args.caf, &args.keys) {
        (Some(caf), Some(keys)) => {
            let authority = AuthorityArgs {
                keys: keys.clone(),
                certification_serials: Vec::new(),
            };
            let auth = authority
                .validator()?
                .validate_file(caf)
                .with_context(|| format!("validating {}", caf.display()))?;
            check_stamps(&root, &auth)
        }
        _ => Vec::new(),
    };

    let valid = !signatures.is_empty()
        && signatures.iter().all(|s| s.valid)
        && stamps.iter().all(|s| s.valid);
    for block in signatures.iter().filter(|s| !s.valid) {
        tracing::warn!(position = block.position, reference = ?block.reference, "signature invalid");
    }
    print_json(&VerifyReport {
        root: root.local_name().to_string(),
        signatures,
        stamps,
        valid,
    })?;
    Ok(if valid { 0 } else { 1 })
}

/// Stamps of every document of the authorization's type.
fn check_stamps(root: &dte_core::Element, auth: &FolioAuthorization) -> Vec<StampReport> {
    root.descendants("DTE")
        .into_iter()
        .filter_map(|dte| Document::from_element(dte.clone()).ok())
        .filter(|doc| doc.document_type().ok() == Some(auth.document_type()))
        .map(|doc| {
            let folio = doc.folio().unwrap_or_default();
            let outcome = Ted::from_document(&doc).and_then(|ted| ted.verify(auth));
            StampReport {
                folio,
                valid: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            }
        })
        .collect()
}
