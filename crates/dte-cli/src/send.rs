//! # Send Subcommand
//!
//! Authenticates with the tax authority and uploads a sealed envelope.
//!
//! Prints the outcome as JSON. Exit code 0 when the authority accepts the
//! envelope, 3 when it rejects it. Transport and handshake failures are
//! errors (exit code 1).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dte_envelope::SealedEnvelope;
use dte_sii_client::{DispatchError, Environment, RejectionCategory, SiiClient, SiiConfig, SubmitError};
use serde::Serialize;

use crate::common::{print_json, read_text, SignerArgs};

/// Arguments for the `dte send` subcommand.
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Sealed envelope file.
    pub envelope: PathBuf,

    #[command(flatten)]
    pub signer: SignerArgs,

    /// Authority environment (`certification` or `production`).
    /// Overrides `DTE_SII_ENV`.
    #[arg(long, value_parser = Environment::parse)]
    pub environment: Option<Environment>,

    /// Base URL of the authority. Overrides `DTE_SII_BASE_URL`.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Retries for the seed and token requests.
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl SendArgs {
    fn config(&self) -> Result<SiiConfig> {
        let mut config = match self.environment {
            Some(environment) => SiiConfig::for_environment(environment)?,
            None => SiiConfig::from_env()?,
        };
        if let Some(raw) = &self.base_url {
            config.base_url = raw.parse().with_context(|| format!("invalid base URL {raw:?}"))?;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum SendReport {
    Accepted {
        track_id: String,
        documents: usize,
    },
    Rejected {
        code: String,
        category: RejectionCategory,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// Execute the send subcommand.
pub fn run_send(args: &SendArgs) -> Result<u8> {
    let envelope = SealedEnvelope::from_xml(&read_text(&args.envelope)?)
        .with_context(|| format!("{} is not a valid sealed envelope", args.envelope.display()))?;
    let config = args.config()?;
    let signer = args.signer.load()?;
    tracing::info!(
        environment = ?config.environment,
        base_url = %config.base_url,
        documents = envelope.document_count(),
        "submitting envelope"
    );

    let client = SiiClient::new(config).context("building authority client")?;
    match client.submit(&envelope, &signer) {
        Ok(track_id) => {
            print_json(&SendReport::Accepted {
                track_id: track_id.to_string(),
                documents: envelope.document_count(),
            })?;
            Ok(0)
        }
        Err(SubmitError::Dispatch(DispatchError::Rejected {
            code,
            category,
            detail,
        })) => {
            print_json(&SendReport::Rejected {
                code,
                category,
                detail,
            })?;
            Ok(3)
        }
        Err(e) => Err(e).context("submission failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{run_envelope, EnvelopeArgs};
    use crate::stamp::{run_stamp, StampArgs};
    use crate::test_support::{read, Scratch};
    use chrono::NaiveDate;
    use dte_core::DocumentType;

    fn sealed(scratch: &Scratch) -> PathBuf {
        let signed = scratch.path("signed.xml");
        run_stamp(&StampArgs {
            document: scratch.write_document(DocumentType::INVOICE, 1),
            caf: scratch.write_caf(DocumentType::INVOICE, 1, 10),
            authority: scratch.authority_args(),
            sign: true,
            signer: scratch.signer_args(),
            output: Some(signed.clone()),
        })
        .unwrap();
        let output = scratch.path("envelope.xml");
        run_envelope(&EnvelopeArgs {
            documents: vec![signed],
            sender: "11111111-1".parse().unwrap(),
            resolution_date: NaiveDate::from_ymd_opt(2014, 8, 22).unwrap(),
            resolution_number: 0,
            emitter: None,
            receiver: None,
            signer: scratch.signer_args(),
            output: Some(output.clone()),
        })
        .unwrap();
        output
    }

    fn args(scratch: &Scratch, envelope: PathBuf) -> SendArgs {
        SendArgs {
            envelope,
            signer: scratch.signer_args(),
            environment: Some(Environment::Certification),
            base_url: Some("http://127.0.0.1:9".into()),
            max_retries: Some(0),
        }
    }

    #[test]
    fn config_overrides_apply() {
        let scratch = Scratch::new();
        let config = args(&scratch, PathBuf::from("unused.xml")).config().unwrap();
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:9/");
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn tampered_envelope_is_refused_before_any_request() {
        let scratch = Scratch::new();
        let file = sealed(&scratch);
        let tampered = read(&file).replace("<NroDTE>1</NroDTE>", "<NroDTE>2</NroDTE>");
        std::fs::write(&file, tampered).unwrap();
        let err = run_send(&args(&scratch, file)).unwrap_err();
        assert!(err.to_string().contains("not a valid sealed envelope"));
    }

    #[test]
    fn unreachable_authority_fails_the_handshake() {
        let scratch = Scratch::new();
        let err = run_send(&args(&scratch, sealed(&scratch))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SubmitError>(),
            Some(SubmitError::Auth(_))
        ));
    }

    #[test]
    fn rejection_report_serializes_category() {
        let report = SendReport::Rejected {
            code: "99".into(),
            category: RejectionCategory::DuplicateSubmission,
            detail: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["category"], "duplicate_submission");
    }
}
