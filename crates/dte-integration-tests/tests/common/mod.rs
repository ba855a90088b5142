//! Shared builders and an in-process authority for the cross-crate tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use dte_core::{parse, DocumentType, ManualClock, Rut, Timestamp};
use dte_crypto::fixtures::local_signer;
use dte_crypto::verify_whole_document;
use dte_envelope::{CoverSheet, EnvelopeAssembler, LimitTable, SealedEnvelope};
use dte_sii_client::{AuthorityTransport, TransportError, Upload};
use dte_stamp::fixtures::{caf_validator, sample_document, CafBuilder};
use dte_stamp::{sign_document, FolioAuthorization, KindRegistry, SignedDocument, StampGenerator};

pub const START: &str = "2026-03-02T10:00:00";
pub const SENDER: &str = "11111111-1";
pub const SEED: &str = "000123456789";
pub const TOKEN: &str = "J0QF7Z1PLK4TX";

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp::parse(START).unwrap()))
}

pub fn authorization(document_type: DocumentType, desde: u64, hasta: u64) -> FolioAuthorization {
    caf_validator()
        .validate(&CafBuilder::new(document_type, desde, hasta).build_xml())
        .unwrap()
}

/// Stamp and sign folio `folio` of `document_type` under a fresh CAF.
pub fn signed_document(document_type: DocumentType, folio: u64) -> SignedDocument {
    let clock = clock();
    let auth = authorization(document_type, 1, 1000);
    let stamped = StampGenerator::new(KindRegistry::default(), clock.clone())
        .stamp(sample_document(document_type, folio), &auth)
        .unwrap();
    sign_document(stamped, &local_signer(0), clock.as_ref()).unwrap()
}

pub fn cover() -> CoverSheet {
    CoverSheet::new(
        Rut::parse(SENDER).unwrap(),
        NaiveDate::from_ymd_opt(2014, 8, 22).unwrap(),
        0,
    )
}

pub fn sealed(documents: Vec<SignedDocument>) -> SealedEnvelope {
    let mut assembler = EnvelopeAssembler::new(KindRegistry::default(), LimitTable::default(), clock());
    for document in documents {
        assembler.add(document).unwrap();
    }
    assembler.seal(&cover(), &local_signer(0)).unwrap()
}

pub fn respuesta(status: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><SII:RESPUESTA xmlns:SII="http://www.sii.cl/XMLSchema"><SII:RESP_BODY>{body}</SII:RESP_BODY><SII:RESP_HDR><ESTADO>{status}</ESTADO></SII:RESP_HDR></SII:RESPUESTA>"#
    )
}

/// What the fake authority saw in one upload.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub sender: Rut,
    pub emitter: Rut,
    pub token: String,
    pub file_name: String,
    pub content: String,
}

/// An authority that checks what it receives the way the real one does:
/// the token request must carry a valid whole-document signature over the
/// issued seed, and uploads must carry the issued token and a valid
/// envelope signature.
pub struct FakeAuthority {
    seed_status: String,
    receipt_status: String,
    token_requests: Mutex<Vec<String>>,
    uploads: Mutex<Vec<ReceivedUpload>>,
}

impl FakeAuthority {
    pub fn accepting() -> Self {
        Self::new("00", "0")
    }

    pub fn new(seed_status: &str, receipt_status: &str) -> Self {
        Self {
            seed_status: seed_status.to_string(),
            receipt_status: receipt_status.to_string(),
            token_requests: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn token_requests(&self) -> Vec<String> {
        self.token_requests.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl AuthorityTransport for FakeAuthority {
    fn request_seed(&self) -> Result<String, TransportError> {
        Ok(respuesta(&self.seed_status, &format!("<SEMILLA>{SEED}</SEMILLA>")))
    }

    fn request_token(&self, signed_request: &str) -> Result<String, TransportError> {
        self.token_requests.lock().unwrap().push(signed_request.to_string());
        let accepted = parse(signed_request)
            .ok()
            .filter(|doc| verify_whole_document(doc).is_ok())
            .and_then(|doc| doc.find("item/Semilla").map(|s| s.text()))
            .is_some_and(|seed| seed == SEED);
        Ok(if accepted {
            respuesta("00", &format!("<TOKEN>{TOKEN}</TOKEN>"))
        } else {
            respuesta("-07", "")
        })
    }

    fn upload(&self, upload: &Upload<'_>) -> Result<String, TransportError> {
        let content = String::from_utf8_lossy(upload.content).into_owned();
        self.uploads.lock().unwrap().push(ReceivedUpload {
            sender: upload.sender,
            emitter: upload.emitter,
            token: upload.token.to_string(),
            file_name: upload.file_name.clone(),
            content: content.clone(),
        });
        let status = if upload.token != TOKEN {
            "5"
        } else if SealedEnvelope::from_xml(&content).is_err() {
            "8"
        } else {
            self.receipt_status.as_str()
        };
        let track = if status == "0" { "<TRACKID>0204561234</TRACKID>" } else { "" };
        Ok(format!(
            "<RECEPCIONDTE><RUTSENDER>{}</RUTSENDER><STATUS>{status}</STATUS>{track}</RECEPCIONDTE>",
            upload.sender
        ))
    }

    fn transport_name(&self) -> &str {
        "fake-authority"
    }
}
