//! Any change to signed content must surface as a digest mismatch, and any
//! change to formatting alone must not.

use dte_core::{parse, Element};
use dte_crypto::fixtures::local_signer;
use dte_crypto::{sign_enveloped, verify, Reference, SignatureAlgorithm, SignatureError};
use proptest::prelude::*;

fn invoice(amount: u64, name: &str) -> Element {
    let name = name.replace('&', "&amp;").replace('<', "&lt;");
    parse(&format!(
        r#"<DTE xmlns="http://www.sii.cl/SiiDte" version="1.0"><Documento ID="F7T33"><Encabezado><Receptor><RznSocRecep>{name}</RznSocRecep></Receptor><Totales><MntTotal>{amount}</MntTotal></Totales></Encabezado></Documento></DTE>"#
    ))
    .unwrap()
}

fn signed(amount: u64, name: &str) -> Element {
    let mut doc = invoice(amount, name);
    sign_enveloped(&mut doc, Reference::Id("F7T33"), &local_signer(3), SignatureAlgorithm::RsaSha1)
        .unwrap();
    doc
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn altered_amount_is_detected(amount in 1u64..10_000_000, delta in 1u64..1000) {
        let mut doc = signed(amount, "Cliente");
        let total = doc.find_mut("Documento/Encabezado/Totales/MntTotal").unwrap();
        *total = Element::leaf("MntTotal", (amount + delta).to_string());
        let is_mismatch = matches!(verify(&doc, "F7T33"), Err(SignatureError::DigestMismatch { .. }));
        prop_assert!(is_mismatch);
    }

    #[test]
    fn reformatting_is_not_tampering(amount in 1u64..10_000_000, name in "[A-Za-z][A-Za-z &<]{0,20}") {
        let doc = signed(amount, &name);
        let spaced = doc.to_document().replace("><", ">\n\t<");
        let reparsed = parse(&spaced).unwrap();
        prop_assert!(verify(&reparsed, "F7T33").is_ok());
    }
}
