//! # Envelope Subcommand
//!
//! Collects signed documents of one category into an envelope, builds the
//! cover sheet, and seals it with the sender's signature.
//!
//! When the envelope is written to a file, its summary is printed as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use dte_core::{Rut, SystemClock};
use dte_envelope::{CoverSheet, EnvelopeAssembler, LimitTable};
use dte_stamp::{KindRegistry, SignedDocument};

use crate::common::{print_json, read_document, write_output, SignerArgs};

/// Arguments for the `dte envelope` subcommand.
#[derive(Args, Debug)]
pub struct EnvelopeArgs {
    /// Signed documents, all tax documents or all receipts.
    #[arg(required = true)]
    pub documents: Vec<PathBuf>,

    /// Id of the person submitting (`RutEnvia`).
    #[arg(long)]
    pub sender: Rut,

    /// Date of the emitter's authorization resolution (YYYY-MM-DD).
    #[arg(long)]
    pub resolution_date: NaiveDate,

    /// Number of the emitter's authorization resolution.
    #[arg(long)]
    pub resolution_number: u32,

    /// Emitter id. Defaults to the first document's emitter.
    #[arg(long)]
    pub emitter: Option<Rut>,

    /// Receiver id. Defaults to the first document's receiver.
    #[arg(long)]
    pub receiver: Option<Rut>,

    #[command(flatten)]
    pub signer: SignerArgs,

    /// Output file. Defaults to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl EnvelopeArgs {
    fn cover(&self) -> CoverSheet {
        let mut cover = CoverSheet::new(self.sender, self.resolution_date, self.resolution_number);
        if let Some(emitter) = self.emitter {
            cover = cover.with_emitter(emitter);
        }
        if let Some(receiver) = self.receiver {
            cover = cover.with_receiver(receiver);
        }
        cover
    }
}

/// Execute the envelope subcommand.
pub fn run_envelope(args: &EnvelopeArgs) -> Result<u8> {
    let mut assembler =
        EnvelopeAssembler::new(KindRegistry::default(), LimitTable::default(), Arc::new(SystemClock));
    for path in &args.documents {
        let signed = SignedDocument::from_document(read_document(path)?)
            .with_context(|| format!("{} is not a validly signed document", path.display()))?;
        assembler
            .add(signed)
            .with_context(|| format!("adding {}", path.display()))?;
    }

    let signer = args.signer.load()?;
    let sealed = assembler.seal(&args.cover(), &signer).context("sealing envelope")?;
    write_output(args.output.as_deref(), sealed.xml())?;
    if args.output.is_some() {
        print_json(&sealed.summary())?;
    }
    Ok(0)
}
