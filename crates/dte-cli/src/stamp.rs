//! # Stamp Subcommand
//!
//! Stamps a document with a folio authorization, optionally signing it in
//! the same pass.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dte_core::SystemClock;
use dte_stamp::{sign_document, StampGenerator};

use crate::common::{read_document, write_output, AuthorityArgs, SignerArgs};

/// Arguments for the `dte stamp` subcommand.
#[derive(Args, Debug)]
pub struct StampArgs {
    /// Unstamped document (`DTE` root).
    pub document: PathBuf,

    /// Folio authorization covering the document's type and folio.
    #[arg(long)]
    pub caf: PathBuf,

    #[command(flatten)]
    pub authority: AuthorityArgs,

    /// Sign the stamped document as well.
    #[arg(long)]
    pub sign: bool,

    #[command(flatten)]
    pub signer: SignerArgs,

    /// Output file. Defaults to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the stamp subcommand.
pub fn run_stamp(args: &StampArgs) -> Result<u8> {
    let auth = args
        .authority
        .validator()?
        .validate_file(&args.caf)
        .with_context(|| format!("validating {}", args.caf.display()))?;
    let document = read_document(&args.document)?;
    let stamped = StampGenerator::with_system_clock()
        .stamp(document, &auth)
        .with_context(|| format!("stamping {}", args.document.display()))?;
    tracing::info!(
        document_type = %auth.document_type(),
        folio = stamped.ted().folio(),
        "document stamped"
    );

    let xml = if args.sign {
        let signer = args.signer.load()?;
        sign_document(stamped, &signer, &SystemClock)
            .context("signing stamped document")?
            .to_xml()
    } else {
        stamped.document().to_xml()
    };
    write_output(args.output.as_deref(), &xml)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{read, Scratch};
    use dte_core::DocumentType;
    use dte_stamp::fixtures::caf_validator;
    use dte_stamp::{Document, SignedDocument, StampError, Ted};

    fn args(scratch: &Scratch, folio: u64, sign: bool) -> StampArgs {
        StampArgs {
            document: scratch.write_document(DocumentType::INVOICE, folio),
            caf: scratch.write_caf(DocumentType::INVOICE, 21, 30),
            authority: scratch.authority_args(),
            sign,
            signer: scratch.signer_args(),
            output: Some(scratch.path(&format!("stamped-{folio}.xml"))),
        }
    }

    #[test]
    fn stamps_document_in_range() {
        let scratch = Scratch::new();
        let args = args(&scratch, 21, false);
        assert_eq!(run_stamp(&args).unwrap(), 0);

        let out = Document::from_xml(&read(args.output.as_ref().unwrap())).unwrap();
        let ted = Ted::from_document(&out).unwrap();
        assert_eq!(ted.folio(), 21);
        let auth = caf_validator().validate(&read(&args.caf)).unwrap();
        ted.verify(&auth).unwrap();
    }

    #[test]
    fn stamp_and_sign_in_one_pass() {
        let scratch = Scratch::new();
        let args = args(&scratch, 30, true);
        run_stamp(&args).unwrap();
        let out = Document::from_xml(&read(args.output.as_ref().unwrap())).unwrap();
        let signed = SignedDocument::from_document(out).unwrap();
        assert_eq!(signed.folio(), 30);
    }

    #[test]
    fn folio_outside_authorization_fails() {
        let scratch = Scratch::new();
        let err = run_stamp(&args(&scratch, 31, false)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StampError>(),
            Some(StampError::FolioOutOfRange { folio: 31, .. })
        ));
    }
}
