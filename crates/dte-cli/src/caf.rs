//! # CAF Subcommand
//!
//! Validates a folio authorization file against the authority's keys and
//! prints what it grants as JSON.
//!
//! Exit code 0 when the authorization is valid, 2 when it is valid but not
//! current on the checked date and `--require-current` was given.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use dte_stamp::AuthorizationSummary;
use serde::Serialize;

use crate::common::{print_json, AuthorityArgs};

/// Arguments for the `dte caf` subcommand.
#[derive(Args, Debug)]
pub struct CafArgs {
    /// Authorization (`AUTORIZACION`) file.
    pub file: PathBuf,

    #[command(flatten)]
    pub authority: AuthorityArgs,

    /// Date to check currency against (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub on: Option<NaiveDate>,

    /// Exit with status 2 when the authorization is no longer current.
    #[arg(long)]
    pub require_current: bool,
}

#[derive(Debug, Serialize)]
struct CafReport {
    #[serde(flatten)]
    summary: AuthorizationSummary,
    checked_on: NaiveDate,
    current: bool,
}

/// Execute the caf subcommand.
pub fn run_caf(args: &CafArgs) -> Result<u8> {
    let validator = args.authority.validator()?;
    let auth = validator
        .validate_file(&args.file)
        .with_context(|| format!("validating {}", args.file.display()))?;
    let checked_on = args.on.unwrap_or_else(|| Local::now().date_naive());
    let current = auth.is_current(checked_on);
    tracing::info!(
        emitter = %auth.emitter(),
        document_type = %auth.document_type(),
        current,
        "authorization valid"
    );
    print_json(&CafReport {
        summary: auth.summary(),
        checked_on,
        current,
    })?;
    if args.require_current && !current {
        tracing::warn!(%checked_on, "authorization is not current");
        return Ok(2);
    }
    Ok(0)
}
