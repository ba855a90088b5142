//! Test fixtures: an authority key ring, authority-signed folio
//! authorizations, and unstamped sample documents. Available under
//! `cfg(test)` or the `fixtures` feature.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::NaiveDate;
use dte_core::{flatten_bare, DocumentType, Element};
use dte_crypto::fixtures::test_key;
use dte_crypto::keys::{self, public_key_components, SignatureAlgorithm};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::caf::CafValidator;
use crate::document::{Document, SII_NS};
use crate::keyring::AuthorityKeyRing;
use crate::registry::KindRegistry;

/// Emitter id used by every fixture.
pub const EMITTER: &str = "76192083-9";
/// Receiver id used by sample tax documents.
pub const RECEIVER: &str = "60803000-K";
/// Cached key slot holding the authority's signing key.
pub const AUTHORITY_SLOT: usize = 3;
/// Cached key slot holding the default CAF stamping key.
pub const CAF_SLOT: usize = 2;
/// Serials the fixture key ring trusts: certification and production.
pub const FIXTURE_SERIALS: [u32; 2] = [100, 300];

/// Ring trusting the fixture authority key under [`FIXTURE_SERIALS`].
pub fn authority_key_ring() -> AuthorityKeyRing {
    let public = test_key(AUTHORITY_SLOT).to_public_key();
    FIXTURE_SERIALS
        .iter()
        .fold(AuthorityKeyRing::new(), |ring, &serial| ring.with_key(serial, public.clone()))
}

/// Validator over [`authority_key_ring`].
pub fn caf_validator() -> CafValidator {
    CafValidator::new(authority_key_ring())
}

/// Builds authority-signed `AUTORIZACION` documents.
#[derive(Debug, Clone)]
pub struct CafBuilder {
    document_type: DocumentType,
    desde: u64,
    hasta: u64,
    emitter: String,
    business_name: String,
    authorized_on: NaiveDate,
    serial: u32,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    signed_public_key: Option<RsaPublicKey>,
    authority_key: RsaPrivateKey,
}

impl CafBuilder {
    /// Certification-serial CAF for `[desde, hasta]`, stamping key in [`CAF_SLOT`].
    pub fn new(document_type: DocumentType, desde: u64, hasta: u64) -> Self {
        let key = test_key(CAF_SLOT);
        Self {
            document_type,
            desde,
            hasta,
            emitter: EMITTER.to_string(),
            business_name: "COMERCIAL DEMO SPA".to_string(),
            authorized_on: NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date"),
            serial: 100,
            private_key: key.clone(),
            public_key: key.to_public_key(),
            signed_public_key: None,
            authority_key: test_key(AUTHORITY_SLOT).clone(),
        }
    }

    /// Authority key serial (`IDK`).
    pub fn serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    /// Issue date (`FA`).
    pub fn authorized_on(mut self, date: NaiveDate) -> Self {
        self.authorized_on = date;
        self
    }

    /// Emitter business name (`RS`).
    pub fn business_name(mut self, name: &str) -> Self {
        self.business_name = name.to_string();
        self
    }

    /// Emitter id (`RE`).
    pub fn emitter(mut self, rut: &str) -> Self {
        self.emitter = rut.to_string();
        self
    }

    /// Replace the embedded private key only (`RSASK`).
    pub fn private_key(mut self, key: RsaPrivateKey) -> Self {
        self.private_key = key;
        self
    }

    /// Sign a different public key into `RSAPK` than the one in `RSAPUBK`.
    pub fn signed_public_key(mut self, key: RsaPublicKey) -> Self {
        self.signed_public_key = Some(key);
        self
    }

    /// Sign with a different authority key.
    pub fn authority_key(mut self, key: RsaPrivateKey) -> Self {
        self.authority_key = key;
        self
    }

    /// Render the signed authorization.
    pub fn build_xml(&self) -> String {
        let signed = self.signed_public_key.as_ref().unwrap_or(&self.public_key);
        let (modulus, exponent) = public_key_components(signed);
        let da = Element::new("DA")
            .with_child(Element::leaf("RE", self.emitter.clone()))
            .with_child(Element::leaf("RS", self.business_name.clone()))
            .with_child(Element::leaf("TD", self.document_type.to_string()))
            .with_child(
                Element::new("RNG")
                    .with_child(Element::leaf("D", self.desde.to_string()))
                    .with_child(Element::leaf("H", self.hasta.to_string())),
            )
            .with_child(Element::leaf("FA", self.authorized_on.format("%Y-%m-%d").to_string()))
            .with_child(
                Element::new("RSAPK")
                    .with_child(Element::leaf("M", modulus))
                    .with_child(Element::leaf("E", exponent)),
            )
            .with_child(Element::leaf("IDK", self.serial.to_string()));
        let signature = keys::sign(&self.authority_key, SignatureAlgorithm::RsaSha1, &flatten_bare(&da))
            .expect("fixture authority signature");
        let private_pem = self
            .private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("encode fixture private key");
        let public_pem = self
            .public_key
            .to_public_key_pem(LineEnding::LF)
            .expect("encode fixture public key");

        Element::new("AUTORIZACION")
            .with_child(
                Element::new("CAF")
                    .with_attr("version", "1.0")
                    .with_child(da)
                    .with_child(
                        Element::leaf("FRMA", STANDARD.encode(signature))
                            .with_attr("algoritmo", "SHA1withRSA"),
                    ),
            )
            .with_child(Element::leaf("RSASK", private_pem.as_str()))
            .with_child(Element::leaf("RSAPUBK", public_pem))
            .to_document()
    }
}

/// An unstamped document of `document_type` with folio `folio`, carrying a
/// `<TED/>` placeholder. The body element follows the type's strategy.
pub fn sample_document(document_type: DocumentType, folio: u64) -> Document {
    let registry = KindRegistry::default();
    let body_name = registry
        .get(document_type)
        .map(|k| k.body_name())
        .unwrap_or("Documento");
    let body = Element::new(body_name)
        .with_child(
            Element::new("Encabezado")
                .with_child(
                    Element::new("IdDoc")
                        .with_child(Element::leaf("TipoDTE", document_type.to_string()))
                        .with_child(Element::leaf("Folio", folio.to_string()))
                        .with_child(Element::leaf("FchEmis", "2026-03-02")),
                )
                .with_child(
                    Element::new("Emisor")
                        .with_child(Element::leaf("RUTEmisor", EMITTER))
                        .with_child(Element::leaf("RznSoc", "COMERCIAL DEMO SPA")),
                )
                .with_child(
                    Element::new("Receptor")
                        .with_child(Element::leaf("RUTRecep", RECEIVER))
                        .with_child(Element::leaf("RznSocRecep", "Servicio Nacional de Aduanas")),
                )
                .with_child(
                    Element::new("Totales")
                        .with_child(Element::leaf("MntNeto", "100000"))
                        .with_child(Element::leaf("IVA", "19000"))
                        .with_child(Element::leaf("MntTotal", "119000")),
                ),
        )
        .with_child(
            Element::new("Detalle")
                .with_child(Element::leaf("NroLinDet", "1"))
                .with_child(Element::leaf("NmbItem", "Servicio de consultoría"))
                .with_child(Element::leaf("MontoItem", "100000")),
        )
        .with_child(Element::new("TED"));
    let root = Element::new("DTE")
        .with_attr("xmlns", SII_NS)
        .with_attr("version", "1.0")
        .with_child(body);
    Document::from_element(root).expect("fixture document is well formed")
}
