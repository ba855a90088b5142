//! Handshake, dispatch outcomes, and envelope limits as seen from the
//! authority's side of the wire.

mod common;

use std::sync::Arc;

use common::*;
use dte_core::{parse, DocumentType};
use dte_crypto::fixtures::local_signer;
use dte_crypto::verify_whole_document;
use dte_envelope::{EnvelopeAssembler, EnvelopeError, EnvelopeLimits, LimitKind, LimitTable};
use dte_sii_client::{
    AuthClient, AuthError, DispatchError, HandshakeStep, RejectionCategory, RejectionTable,
    RetryPolicy, SiiClient, SiiConfig, SubmitError,
};
use dte_stamp::KindRegistry;

fn client(authority: &Arc<FakeAuthority>) -> SiiClient {
    SiiClient::with_transport(
        SiiConfig::local_mock(1).unwrap(),
        authority.clone(),
        RejectionTable::default(),
    )
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[test]
fn handshake_yields_opaque_token() {
    let authority = FakeAuthority::accepting();
    let handshake = AuthClient::with_retry(&authority, RetryPolicy::none()).handshake();
    assert_eq!(handshake.state_name(), "IDLE");

    let requested = handshake.request_seed().unwrap();
    assert_eq!(requested.seed(), SEED);
    let signed = requested.sign_seed(&local_signer(0)).unwrap();
    let request = parse(signed.signed_request()).unwrap();
    assert_eq!(request.local_name(), "getToken");
    verify_whole_document(&request).unwrap();

    let session = signed.request_token().unwrap().into_session();
    assert!(!session.token().is_empty());
    assert_eq!(session.token(), TOKEN);
    assert_eq!(session.seed(), SEED);
    assert!(!format!("{session:?}").contains(TOKEN));
}

#[test]
fn rejected_seed_never_produces_a_token() {
    let authority = Arc::new(FakeAuthority::new("-07", "0"));
    let err = client(&authority)
        .submit(&sealed(vec![signed_document(DocumentType::INVOICE, 1)]), &local_signer(0))
        .unwrap_err();
    match err {
        SubmitError::Auth(auth) => {
            assert!(matches!(auth, AuthError::SeedRejected { ref status, .. } if status == "-07"));
            assert_eq!(auth.step(), HandshakeStep::Seed);
        }
        other => panic!("expected a seed rejection, got {other:?}"),
    }
    assert!(authority.token_requests().is_empty());
    assert!(authority.uploads().is_empty());
}

#[test]
fn every_submission_runs_a_fresh_handshake() {
    let authority = Arc::new(FakeAuthority::accepting());
    let client = client(&authority);
    let envelope = sealed(vec![signed_document(DocumentType::INVOICE, 1)]);
    client.submit(&envelope, &local_signer(0)).unwrap();
    client.submit(&envelope, &local_signer(0)).unwrap();
    assert_eq!(authority.token_requests().len(), 2);
    assert_eq!(authority.uploads().len(), 2);
}

// ---------------------------------------------------------------------------
// Dispatch outcomes
// ---------------------------------------------------------------------------

#[test]
fn duplicate_submission_is_reported_as_such() {
    let authority = Arc::new(FakeAuthority::new("00", "99"));
    let err = client(&authority)
        .submit(&sealed(vec![signed_document(DocumentType::INVOICE, 4)]), &local_signer(0))
        .unwrap_err();
    match err {
        SubmitError::Dispatch(dispatch) => {
            assert!(dispatch.is_duplicate());
            assert!(matches!(
                dispatch,
                DispatchError::Rejected { category: RejectionCategory::DuplicateSubmission, .. }
            ));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[test]
fn session_dispatch_reaches_authority_with_token() {
    let authority = Arc::new(FakeAuthority::accepting());
    let client = client(&authority);
    let session = client.auth().authenticate(&local_signer(0)).unwrap();
    let envelope = sealed(vec![signed_document(DocumentType::CREDIT_NOTE, 2)]);
    let track = client.dispatcher().dispatch(&envelope, &session).unwrap();
    assert!(!track.as_str().is_empty());
    assert_eq!(authority.uploads()[0].token, session.token());
}

#[test]
fn unknown_status_is_surfaced_generically() {
    let authority = Arc::new(FakeAuthority::new("00", "42"));
    let err = client(&authority)
        .submit(&sealed(vec![signed_document(DocumentType::INVOICE, 4)]), &local_signer(0))
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Dispatch(DispatchError::Rejected { ref code, category: RejectionCategory::Unknown, .. })
            if code == "42"
    ));
}

// ---------------------------------------------------------------------------
// Envelope limits
// ---------------------------------------------------------------------------

fn small_limits() -> LimitTable {
    LimitTable {
        tax_document: EnvelopeLimits {
            max_types: 2,
            max_documents: 3,
        },
        ..LimitTable::default()
    }
}

#[test]
fn exactly_the_maximum_document_count_fits() {
    let mut assembler = EnvelopeAssembler::new(KindRegistry::default(), small_limits(), clock());
    for folio in 1..=3 {
        assembler.add(signed_document(DocumentType::INVOICE, folio)).unwrap();
    }
    let err = assembler
        .add(signed_document(DocumentType::INVOICE, 4))
        .unwrap_err();
    assert!(matches!(
        err,
        EnvelopeError::EnvelopeFull { limit: LimitKind::Documents, max: 3, folio: 4, .. }
    ));
    let sealed = assembler.seal(&cover(), &local_signer(0)).unwrap();
    assert_eq!(sealed.document_count(), 3);
}

#[test]
fn one_type_too_many_is_refused() {
    let mut assembler = EnvelopeAssembler::new(KindRegistry::default(), small_limits(), clock());
    assembler.add(signed_document(DocumentType::INVOICE, 1)).unwrap();
    assembler.add(signed_document(DocumentType::CREDIT_NOTE, 1)).unwrap();
    let err = assembler
        .add(signed_document(DocumentType::DEBIT_NOTE, 1))
        .unwrap_err();
    assert!(matches!(
        err,
        EnvelopeError::EnvelopeFull { limit: LimitKind::DocumentTypes, max: 2, .. }
    ));
    assert_eq!(assembler.len(), 2);
}
