//! # Sign Subcommand
//!
//! Signs a stamped document with the issuer's certificate.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dte_core::SystemClock;
use dte_stamp::{sign_document, StampedDocument};

use crate::common::{read_document, write_output, SignerArgs};

/// Arguments for the `dte sign` subcommand.
#[derive(Args, Debug)]
pub struct SignArgs {
    /// Stamped document.
    pub document: PathBuf,

    #[command(flatten)]
    pub signer: SignerArgs,

    /// Output file. Defaults to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the sign subcommand.
pub fn run_sign(args: &SignArgs) -> Result<u8> {
    let stamped = StampedDocument::from_document(read_document(&args.document)?)
        .with_context(|| format!("{} is not stamped", args.document.display()))?;
    let signer = args.signer.load()?;
    let signed = sign_document(stamped, &signer, &SystemClock).context("signing document")?;
    tracing::info!(
        document_type = %signed.document_type(),
        folio = signed.folio(),
        reference = signed.reference_id(),
        "document signed"
    );
    write_output(args.output.as_deref(), &signed.to_xml())?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{read, Scratch};
    use dte_core::DocumentType;
    use dte_stamp::{Document, SignedDocument};

    #[test]
    fn unstamped_document_is_refused() {
        let scratch = Scratch::new();
        let args = SignArgs {
            document: scratch.write_document(DocumentType::INVOICE, 5),
            signer: scratch.signer_args(),
            output: Some(scratch.path("signed.xml")),
        };
        assert!(run_sign(&args).is_err());
        assert!(!scratch.path("signed.xml").exists());
    }

    #[test]
    fn signs_stamped_document() {
        let scratch = Scratch::new();
        let stamped = scratch.path("stamped.xml");
        crate::stamp::run_stamp(&crate::stamp::StampArgs {
            document: scratch.write_document(DocumentType::CREDIT_NOTE, 7),
            caf: scratch.write_caf(DocumentType::CREDIT_NOTE, 1, 10),
            authority: scratch.authority_args(),
            sign: false,
            signer: Default::default(),
            output: Some(stamped.clone()),
        })
        .unwrap();

        let args = SignArgs {
            document: stamped,
            signer: scratch.signer_args(),
            output: Some(scratch.path("signed.xml")),
        };
        assert_eq!(run_sign(&args).unwrap(), 0);
        let signed =
            SignedDocument::from_document(Document::from_xml(&read(&scratch.path("signed.xml"))).unwrap())
                .unwrap();
        assert_eq!(signed.reference_id(), "T61F7");
        assert!(signed.verify().unwrap().signer_subject.contains("Fixture Signer 0"));
    }
}
