//! # Folio Authorization (CAF) Validation
//!
//! A folio authorization is the authority-signed block granting an emitter
//! a range of folios for one document type, together with the RSA key pair
//! used to stamp those documents:
//!
//! ```text
//! <AUTORIZACION>
//!   <CAF version="1.0">
//!     <DA>                         signed payload
//!       <RE/> <RS/> <TD/> <RNG><D/><H/></RNG> <FA/>
//!       <RSAPK><M/><E/></RSAPK> <IDK/>
//!     </DA>
//!     <FRMA algoritmo="SHA1withRSA"/>   authority signature over DA
//!   </CAF>
//!   <RSASK/>                       PEM private key
//!   <RSAPUBK/>                     PEM public key
//! </AUTORIZACION>
//! ```
//!
//! ## Security Invariant
//!
//! A [`FolioAuthorization`] exists only after [`CafValidator::validate`]
//! accepted it, which requires all of:
//!
//! 1. the authority signature over the (bare-flattened) `DA` verifies under
//!    the ring key for `IDK`;
//! 2. the key signed into `RSAPK` is the key in `RSAPUBK`;
//! 3. the private key in `RSASK` is the other half of that key, proven
//!    with a fresh random challenge.
//!
//! The private key never leaves this type; stamps are signed through
//! [`FolioAuthorization::sign`].

use std::collections::BTreeSet;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Months, NaiveDate};
use dte_core::temporal::parse_date;
use dte_core::{flatten_bare, parse, CanonicalBytes, DocumentType, Element, Rut};
use dte_crypto::keys::{self, SignatureAlgorithm};
use dte_crypto::CryptoError;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;

use crate::error::AuthorizationError;
use crate::keyring::AuthorityKeyRing;

/// Key serial the authority uses for certification-environment CAFs.
pub const CERTIFICATION_KEY_SERIAL: u32 = 100;

/// Document types whose production CAFs lapse six months after issue.
const EXPIRING_TYPES: [DocumentType; 5] = [
    DocumentType::INVOICE,
    DocumentType::SETTLEMENT,
    DocumentType::PURCHASE_INVOICE,
    DocumentType::DEBIT_NOTE,
    DocumentType::CREDIT_NOTE,
];

const VALIDITY_MONTHS: u32 = 6;

/// Inclusive folio range `[desde, hasta]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FolioRange {
    /// First authorized folio.
    pub desde: u64,
    /// Last authorized folio.
    pub hasta: u64,
}

impl FolioRange {
    /// Whether `folio` is authorized. Both ends are inclusive.
    pub fn contains(&self, folio: u64) -> bool {
        self.desde <= folio && folio <= self.hasta
    }

    /// Number of folios in the range.
    pub fn len(&self) -> u64 {
        self.hasta - self.desde + 1
    }

    /// Always false: a validated range holds at least one folio.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A validated, immutable folio authorization.
pub struct FolioAuthorization {
    emitter: Rut,
    business_name: String,
    document_type: DocumentType,
    range: FolioRange,
    authorized_on: NaiveDate,
    key_serial: u32,
    certification: bool,
    caf: Element,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl FolioAuthorization {
    /// Emitter the folios belong to.
    pub fn emitter(&self) -> &Rut {
        &self.emitter
    }

    /// Emitter business name as authorized.
    pub fn business_name(&self) -> &str {
        &self.business_name
    }

    /// Authorized document type.
    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Authorized folio range.
    pub fn range(&self) -> FolioRange {
        self.range
    }

    /// Whether `folio` may be stamped with this authorization.
    pub fn covers(&self, folio: u64) -> bool {
        self.range.contains(folio)
    }

    /// Date the authority issued the block.
    pub fn authorized_on(&self) -> NaiveDate {
        self.authorized_on
    }

    /// Authority key serial (`IDK`).
    pub fn key_serial(&self) -> u32 {
        self.key_serial
    }

    /// Whether the block was issued for the certification environment.
    pub fn is_certification(&self) -> bool {
        self.certification
    }

    /// Whether folios may still be stamped on `on`.
    ///
    /// Production authorizations for invoices, settlements, purchase
    /// invoices, debit and credit notes lapse six months after issue.
    /// Certification authorizations and other types do not lapse.
    pub fn is_current(&self, on: NaiveDate) -> bool {
        if self.certification || !EXPIRING_TYPES.contains(&self.document_type) {
            return true;
        }
        match self.authorized_on.checked_add_months(Months::new(VALIDITY_MONTHS)) {
            Some(expiry) => on < expiry,
            None => false,
        }
    }

    /// The `CAF` element, embedded verbatim in every stamp.
    pub fn caf_element(&self) -> &Element {
        &self.caf
    }

    /// Public half of the stamping key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Sign a stamp body with the authorization's private key.
    pub fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        data: &CanonicalBytes,
    ) -> Result<Vec<u8>, CryptoError> {
        keys::sign(&self.private_key, algorithm, data)
    }

    /// Serializable summary without key material.
    pub fn summary(&self) -> AuthorizationSummary {
        AuthorizationSummary {
            emitter: self.emitter.to_string(),
            business_name: self.business_name.clone(),
            document_type: self.document_type,
            range: self.range,
            authorized_on: self.authorized_on,
            key_serial: self.key_serial,
            certification: self.certification,
        }
    }
}

impl std::fmt::Debug for FolioAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolioAuthorization")
            .field("emitter", &self.emitter)
            .field("document_type", &self.document_type)
            .field("range", &self.range)
            .field("key_serial", &self.key_serial)
            .field("certification", &self.certification)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// What a validated authorization grants, for display and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationSummary {
    /// Emitter id.
    pub emitter: String,
    /// Emitter business name.
    pub business_name: String,
    /// Authorized document type.
    pub document_type: DocumentType,
    /// Authorized folio range.
    pub range: FolioRange,
    /// Issue date.
    pub authorized_on: NaiveDate,
    /// Authority key serial.
    pub key_serial: u32,
    /// Certification environment flag.
    pub certification: bool,
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates raw folio authorization blocks against the authority's keys.
#[derive(Debug, Clone)]
pub struct CafValidator {
    key_ring: AuthorityKeyRing,
    certification_serials: BTreeSet<u32>,
}

impl CafValidator {
    /// A validator trusting `key_ring`, treating serial 100 as certification.
    pub fn new(key_ring: AuthorityKeyRing) -> Self {
        Self {
            key_ring,
            certification_serials: BTreeSet::from([CERTIFICATION_KEY_SERIAL]),
        }
    }

    /// Replace the set of serials that mark certification blocks.
    pub fn with_certification_serials(mut self, serials: impl IntoIterator<Item = u32>) -> Self {
        self.certification_serials = serials.into_iter().collect();
        self
    }

    /// The trusted authority keys.
    pub fn key_ring(&self) -> &AuthorityKeyRing {
        &self.key_ring
    }

    /// Validate a CAF file read from disk. Latin-1 content is accepted.
    pub fn validate_file(&self, path: &Path) -> Result<FolioAuthorization, AuthorizationError> {
        let bytes = std::fs::read(path)
            .map_err(|e| AuthorizationError::Malformed(format!("{}: {e}", path.display())))?;
        self.validate_bytes(&bytes)
    }

    /// Validate raw bytes, decoding Latin-1 when they are not UTF-8.
    pub fn validate_bytes(&self, raw: &[u8]) -> Result<FolioAuthorization, AuthorizationError> {
        match std::str::from_utf8(raw) {
            Ok(text) => self.validate(text),
            Err(_) => {
                let text: String = raw.iter().map(|&b| char::from(b)).collect();
                self.validate(&text)
            }
        }
    }

    /// Validate a raw authorization block.
    pub fn validate(&self, raw: &str) -> Result<FolioAuthorization, AuthorizationError> {
        let root = parse(raw)?;
        let parsed = ParsedCaf::read(&root)?;

        // Authority signature over the payload.
        let authority_key = self
            .key_ring
            .get(parsed.key_serial)
            .ok_or(AuthorizationError::KeyUnknown {
                serial: parsed.key_serial,
            })?;
        let payload = flatten_bare(&parsed.da);
        let invalid = || AuthorizationError::SignatureInvalid {
            document_type: parsed.document_type,
            desde: parsed.range.desde,
            hasta: parsed.range.hasta,
            serial: parsed.key_serial,
        };
        let signature = STANDARD
            .decode(keys::strip_whitespace(&parsed.signature))
            .map_err(|_| invalid())?;
        if keys::verify(authority_key, parsed.algorithm, &payload, &signature).is_err() {
            tracing::warn!(
                document_type = %parsed.document_type,
                serial = parsed.key_serial,
                "folio authorization signature rejected"
            );
            return Err(invalid());
        }

        // Embedded key material.
        if parsed.signed_public_key != parsed.public_key {
            return Err(AuthorizationError::KeyPairInconsistent(
                "RSAPK does not match RSAPUBK".into(),
            ));
        }
        if !keys::key_pair_consistent(&parsed.private_key, &parsed.public_key) {
            return Err(AuthorizationError::KeyPairInconsistent(
                "RSASK is not the private half of RSAPUBK".into(),
            ));
        }

        let certification = self.certification_serials.contains(&parsed.key_serial);
        tracing::info!(
            emitter = %parsed.emitter,
            document_type = %parsed.document_type,
            desde = parsed.range.desde,
            hasta = parsed.range.hasta,
            certification,
            "folio authorization accepted"
        );
        Ok(FolioAuthorization {
            emitter: parsed.emitter,
            business_name: parsed.business_name,
            document_type: parsed.document_type,
            range: parsed.range,
            authorized_on: parsed.authorized_on,
            key_serial: parsed.key_serial,
            certification,
            caf: parsed.caf,
            private_key: parsed.private_key,
            public_key: parsed.public_key,
        })
    }
}

/// Fields of an authorization block before any cryptographic check.
struct ParsedCaf {
    emitter: Rut,
    business_name: String,
    document_type: DocumentType,
    range: FolioRange,
    authorized_on: NaiveDate,
    key_serial: u32,
    algorithm: SignatureAlgorithm,
    signature: String,
    signed_public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    caf: Element,
    da: Element,
}

impl ParsedCaf {
    fn read(root: &Element) -> Result<Self, AuthorizationError> {
        if root.local_name() != "AUTORIZACION" {
            return Err(malformed(format!("root element is {}, expected AUTORIZACION", root.name())));
        }
        let caf = root.require("CAF")?;
        let da = caf.require("DA")?;
        let frma = caf.require("FRMA")?;

        let emitter = Rut::parse(&da.require_text("RE")?).map_err(|e| malformed(e.to_string()))?;
        let document_type =
            DocumentType::parse(&da.require_text("TD")?).map_err(|e| malformed(e.to_string()))?;
        let desde = parse_number(&da.require_text("RNG/D")?, "RNG/D")?;
        let hasta = parse_number(&da.require_text("RNG/H")?, "RNG/H")?;
        if desde == 0 || desde > hasta {
            return Err(malformed(format!("empty folio range {desde}..={hasta}")));
        }
        let authorized_on =
            parse_date(&da.require_text("FA")?).map_err(|e| malformed(e.to_string()))?;
        let key_serial = u32::try_from(parse_number(&da.require_text("IDK")?, "IDK")?)
            .map_err(|_| malformed("IDK out of range".into()))?;
        let signed_public_key =
            keys::public_key_from_components(&da.require_text("RSAPK/M")?, &da.require_text("RSAPK/E")?)
                .map_err(|e| malformed(format!("RSAPK: {e}")))?;
        let algorithm = SignatureAlgorithm::from_tag(frma.attr("algoritmo").unwrap_or("SHA1withRSA"))
            .map_err(|e| malformed(e.to_string()))?;
        let private_key = keys::private_key_from_pem(&root.require_text("RSASK")?)
            .map_err(|e| malformed(format!("RSASK: {e}")))?;
        let public_key = keys::public_key_from_pem(&root.require_text("RSAPUBK")?)
            .map_err(|e| malformed(format!("RSAPUBK: {e}")))?;

        Ok(Self {
            emitter,
            business_name: da.child_text("RS").unwrap_or_default(),
            document_type,
            range: FolioRange { desde, hasta },
            authorized_on,
            key_serial,
            algorithm,
            signature: frma.text(),
            signed_public_key,
            private_key,
            public_key,
            caf: caf.clone(),
            da: da.clone(),
        })
    }
}

fn malformed(message: String) -> AuthorizationError {
    AuthorizationError::Malformed(message)
}

fn parse_number(text: &str, field: &str) -> Result<u64, AuthorizationError> {
    text.trim()
        .parse()
        .map_err(|_| malformed(format!("{field} is not a number: {text:?}")))
}
