//! Folio range enforcement across arbitrary authorizations.

use std::sync::Arc;

use dte_core::{DocumentType, ManualClock, Timestamp};
use dte_stamp::fixtures::{caf_validator, sample_document, CafBuilder};
use dte_stamp::{KindRegistry, StampError, StampGenerator, Ted};
use proptest::prelude::*;

fn generator() -> StampGenerator {
    let clock = ManualClock::new(Timestamp::parse("2026-03-02T09:00:00").unwrap());
    StampGenerator::new(KindRegistry::default(), Arc::new(clock))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn folio_accepted_iff_inside_range(desde in 1u64..5000, span in 0u64..200, offset in 0u64..400) {
        let hasta = desde + span;
        let auth = caf_validator()
            .validate(&CafBuilder::new(DocumentType::CREDIT_NOTE, desde, hasta).build_xml())
            .unwrap();
        let folio = desde - 1 + offset;
        let result = generator().stamp(sample_document(DocumentType::CREDIT_NOTE, folio), &auth);
        if folio >= desde && folio <= hasta {
            let stamped = result.unwrap();
            prop_assert!(Ted::from_document(stamped.document()).unwrap().verify(&auth).is_ok());
        } else {
            let out_of_range = matches!(result, Err(StampError::FolioOutOfRange { .. }));
            prop_assert!(out_of_range);
        }
    }
}

#[test]
fn receipt_without_receiver_is_stamped_anonymous() {
    let auth = caf_validator()
        .validate(&CafBuilder::new(DocumentType::RECEIPT, 1, 10).build_xml())
        .unwrap();
    let xml = sample_document(DocumentType::RECEIPT, 3).to_xml();
    let start = xml.find("<Receptor>").unwrap();
    let end = xml.find("</Receptor>").unwrap() + "</Receptor>".len();
    let anonymous = dte_stamp::Document::from_xml(&format!("{}{}", &xml[..start], &xml[end..])).unwrap();

    let stamped = generator().stamp(anonymous, &auth).unwrap();
    assert_eq!(stamped.ted().field("RR").as_deref(), Some("66666666-6"));
    assert_eq!(stamped.ted().field("RSR").as_deref(), Some(""));
}
