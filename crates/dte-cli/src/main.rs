//! # dte CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dte_cli::caf::{run_caf, CafArgs};
use dte_cli::envelope::{run_envelope, EnvelopeArgs};
use dte_cli::send::{run_send, SendArgs};
use dte_cli::sign::{run_sign, SignArgs};
use dte_cli::stamp::{run_stamp, StampArgs};
use dte_cli::verify::{run_verify, VerifyArgs};

/// Electronic tax document toolchain.
///
/// Validates folio authorizations, stamps and signs documents, seals them
/// into envelopes, and submits envelopes to the tax authority.
#[derive(Parser, Debug)]
#[command(name = "dte", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a folio authorization (CAF) file.
    Caf(CafArgs),

    /// Stamp a document with a folio authorization.
    Stamp(StampArgs),

    /// Sign a stamped document.
    Sign(SignArgs),

    /// Verify signatures and stamps.
    Verify(VerifyArgs),

    /// Seal signed documents into an envelope.
    Envelope(EnvelopeArgs),

    /// Submit a sealed envelope to the tax authority.
    Send(SendArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::debug!("dte CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Caf(args) => run_caf(&args),
        Commands::Stamp(args) => run_stamp(&args),
        Commands::Sign(args) => run_sign(&args),
        Commands::Verify(args) => run_verify(&args),
        Commands::Envelope(args) => run_envelope(&args),
        Commands::Send(args) => run_send(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn cli_parse_caf() {
        let cli = Cli::try_parse_from([
            "dte",
            "caf",
            "caf33.xml",
            "--authority-keys",
            "keys",
            "--certification-serial",
            "100",
            "--on",
            "2026-03-01",
        ])
        .unwrap();
        if let Commands::Caf(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("caf33.xml"));
            assert_eq!(args.authority.certification_serials, vec![100]);
            assert_eq!(args.on.unwrap().to_string(), "2026-03-01");
            assert!(!args.require_current);
        } else {
            panic!("expected caf");
        }
    }

    #[test]
    fn cli_parse_stamp_with_signing() {
        let cli = Cli::try_parse_from([
            "dte",
            "-vv",
            "stamp",
            "doc.xml",
            "--caf",
            "caf.xml",
            "--authority-keys",
            "keys",
            "--sign",
            "--key",
            "k.pem",
            "--cert",
            "c.pem",
            "-o",
            "out.xml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        if let Commands::Stamp(args) = cli.command {
            assert!(args.sign);
            assert_eq!(args.signer.key, Some(PathBuf::from("k.pem")));
            assert_eq!(args.output, Some(PathBuf::from("out.xml")));
        } else {
            panic!("expected stamp");
        }
    }

    #[test]
    fn cli_key_without_cert_is_rejected() {
        let result = Cli::try_parse_from(["dte", "sign", "doc.xml", "--key", "k.pem"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parse_envelope() {
        let cli = Cli::try_parse_from([
            "dte",
            "envelope",
            "a.xml",
            "b.xml",
            "--sender",
            "11111111-1",
            "--resolution-date",
            "2014-08-22",
            "--resolution-number",
            "0",
            "--receiver",
            "60803000-K",
        ])
        .unwrap();
        if let Commands::Envelope(args) = cli.command {
            assert_eq!(args.documents.len(), 2);
            assert_eq!(args.sender.to_string(), "11111111-1");
            assert_eq!(args.receiver.map(|r| r.to_string()).as_deref(), Some("60803000-K"));
            assert!(args.emitter.is_none());
        } else {
            panic!("expected envelope");
        }
    }

    #[test]
    fn cli_envelope_rejects_bad_rut() {
        let result = Cli::try_parse_from([
            "dte",
            "envelope",
            "a.xml",
            "--sender",
            "11111111-2",
            "--resolution-date",
            "2014-08-22",
            "--resolution-number",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_envelope_requires_documents() {
        let result = Cli::try_parse_from([
            "dte",
            "envelope",
            "--sender",
            "11111111-1",
            "--resolution-date",
            "2014-08-22",
            "--resolution-number",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parse_send_environment() {
        let cli = Cli::try_parse_from(["dte", "send", "envio.xml", "--environment", "prod"]).unwrap();
        if let Commands::Send(args) = cli.command {
            assert_eq!(args.environment, Some(dte_sii_client::Environment::Production));
        } else {
            panic!("expected send");
        }
        assert!(Cli::try_parse_from(["dte", "send", "envio.xml", "--environment", "staging"]).is_err());
    }

    #[test]
    fn cli_parse_verify_caf_requires_keys() {
        std::env::remove_var("DTE_AUTHORITY_KEYS");
        assert!(Cli::try_parse_from(["dte", "verify", "doc.xml", "--caf", "caf.xml"]).is_err());
        let cli = Cli::try_parse_from(["dte", "verify", "doc.xml"]).unwrap();
        assert!(matches!(cli.command, Commands::Verify(_)));
    }
}
