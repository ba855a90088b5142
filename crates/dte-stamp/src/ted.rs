//! # Electronic Stamp (TED)
//!
//! Builds the per-document stamp from the document header and a validated
//! folio authorization, signs it with the authorization's private key, and
//! splices it into the document body:
//!
//! ```text
//! <TED version="1.0">
//!   <DD>
//!     <RE/> <TD/> <F/> <FE/> <RR/> <RSR/> <MNT/> <IT1/>
//!     <CAF version="1.0">…</CAF>       authorization block, verbatim
//!     <TSTED/>                          generation timestamp
//!   </DD>
//!   <FRMT algoritmo="SHA1withRSA"/>     signature over bare-flattened DD
//! </TED>
//! ```
//!
//! Stamping is deliberately not idempotent: `TSTED` comes from the injected
//! [`Clock`], so two stamps of one document taken at different instants
//! differ in that field alone and each verifies under the authorization.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dte_core::{flatten_bare, Clock, DocumentType, Element, SystemClock, Timestamp};
use dte_crypto::keys::{self, SignatureAlgorithm};

use crate::caf::FolioAuthorization;
use crate::document::Document;
use crate::error::StampError;
use crate::registry::KindRegistry;

/// Maximum characters kept from the receiver name and the first item name.
pub const TRUNCATED_FIELD_CHARS: usize = 40;

const STAMP_ALGORITHM: SignatureAlgorithm = SignatureAlgorithm::RsaSha1;

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Stamps documents with folio authorizations.
#[derive(Clone)]
pub struct StampGenerator {
    registry: KindRegistry,
    clock: Arc<dyn Clock>,
}

impl StampGenerator {
    /// A generator using `registry` for field extraction and `clock` for `TSTED`.
    pub fn new(registry: KindRegistry, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// The default registry and the system clock.
    pub fn with_system_clock() -> Self {
        Self::new(KindRegistry::default(), Arc::new(SystemClock))
    }

    /// The strategy registry in use.
    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Stamp `document` with `auth`.
    ///
    /// Fails with `FolioOutOfRange` unless `desde ≤ folio ≤ hasta`, and with
    /// `MissingRequiredField` when the emission date or total is absent.
    /// Any existing `TED` (placeholder or earlier stamp) is replaced.
    pub fn stamp(
        &self,
        mut document: Document,
        auth: &FolioAuthorization,
    ) -> Result<StampedDocument, StampError> {
        let document_type = document.document_type()?;
        let folio = document.folio()?;
        let kind = self.registry.require(document_type)?;
        if document_type != auth.document_type() {
            return Err(StampError::DocumentTypeMismatch {
                folio,
                document: document_type,
                authorization: auth.document_type(),
            });
        }
        let range = auth.range();
        if !range.contains(folio) {
            tracing::warn!(%document_type, folio, desde = range.desde, hasta = range.hasta, "folio outside authorized range");
            return Err(StampError::FolioOutOfRange {
                document_type,
                folio,
                desde: range.desde,
                hasta: range.hasta,
            });
        }
        let fields = kind.stamp_fields(&document)?;
        if fields.emitter != auth.emitter().to_string() {
            return Err(StampError::EmitterMismatch {
                folio,
                document: fields.emitter,
                authorization: auth.emitter().to_string(),
            });
        }

        let timestamp = self.clock.now();
        let dd = Element::new("DD")
            .with_child(Element::leaf("RE", fields.emitter))
            .with_child(Element::leaf("TD", document_type.to_string()))
            .with_child(Element::leaf("F", folio.to_string()))
            .with_child(Element::leaf("FE", fields.issued_on))
            .with_child(Element::leaf("RR", fields.receiver))
            .with_child(Element::leaf(
                "RSR",
                truncate_chars(&fields.receiver_name, TRUNCATED_FIELD_CHARS),
            ))
            .with_child(Element::leaf("MNT", fields.total))
            .with_child(Element::leaf(
                "IT1",
                truncate_chars(&fields.first_item, TRUNCATED_FIELD_CHARS),
            ))
            .with_child(auth.caf_element().clone())
            .with_child(Element::leaf("TSTED", timestamp.to_authority_string()));
        let signature = auth.sign(STAMP_ALGORITHM, &flatten_bare(&dd))?;
        let ted = Element::new("TED")
            .with_attr("version", "1.0")
            .with_child(dd)
            .with_child(
                Element::leaf("FRMT", STANDARD.encode(signature))
                    .with_attr("algoritmo", STAMP_ALGORITHM.tag()),
            );

        let body = document.body_mut()?;
        if !body.replace_child("TED", ted.clone()) {
            body.push_child(ted.clone());
        }
        tracing::info!(%document_type, folio, tsted = %timestamp, "document stamped");
        Ok(StampedDocument {
            document,
            ted: Ted { element: ted },
        })
    }
}

impl std::fmt::Debug for StampGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampGenerator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// A document carrying a fresh stamp.
#[derive(Debug, Clone)]
pub struct StampedDocument {
    document: Document,
    ted: Ted,
}

impl StampedDocument {
    /// Wrap a document stamped earlier, e.g. read back from disk.
    ///
    /// Only checks that a stamp is present; use [`Ted::verify`] to check it
    /// against its authorization.
    pub fn from_document(document: Document) -> Result<Self, StampError> {
        let ted = Ted::from_document(&document)?;
        Ok(Self { document, ted })
    }

    /// The stamped document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The stamp that was spliced in.
    pub fn ted(&self) -> &Ted {
        &self.ted
    }

    /// Consume into the document.
    pub fn into_document(self) -> Document {
        self.document
    }
}

// ---------------------------------------------------------------------------
// Stamp inspection and verification
// ---------------------------------------------------------------------------

/// A `TED` element read from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ted {
    element: Element,
}

impl Ted {
    /// Read the stamp of a document.
    pub fn from_document(document: &Document) -> Result<Self, StampError> {
        let folio = document.folio().unwrap_or(0);
        let ted = document
            .body()?
            .child("TED")
            .filter(|ted| ted.child("DD").is_some())
            .ok_or(StampError::StampMissing { folio })?;
        Ok(Self {
            element: ted.clone(),
        })
    }

    /// The `TED` element.
    pub fn element(&self) -> &Element {
        &self.element
    }

    fn dd_text(&self, name: &str) -> Option<String> {
        self.element.find("DD").and_then(|dd| dd.child_text(name))
    }

    /// Stamped folio (`DD/F`), 0 if unreadable.
    pub fn folio(&self) -> u64 {
        self.dd_text("F").and_then(|f| f.trim().parse().ok()).unwrap_or(0)
    }

    /// Stamped document type (`DD/TD`).
    pub fn document_type(&self) -> Option<DocumentType> {
        self.dd_text("TD").and_then(|t| DocumentType::parse(&t).ok())
    }

    /// Generation timestamp (`DD/TSTED`).
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.dd_text("TSTED").and_then(|t| Timestamp::parse(&t).ok())
    }

    /// Value of a `DD` field by element name.
    pub fn field(&self, name: &str) -> Option<String> {
        self.dd_text(name)
    }

    /// Check the stamp against the authorization it claims.
    ///
    /// Verifies the detached signature over `DD` with the authorization's
    /// public key, that the embedded `CAF` is this authorization, and that
    /// type, emitter and folio agree with it.
    pub fn verify(&self, auth: &FolioAuthorization) -> Result<(), StampError> {
        let folio = self.folio();
        let dd = self
            .element
            .child("DD")
            .ok_or(StampError::StampMissing { folio })?;
        let frmt = self
            .element
            .child("FRMT")
            .ok_or(StampError::StampSignatureInvalid { folio })?;
        let algorithm = SignatureAlgorithm::from_tag(frmt.attr("algoritmo").unwrap_or("SHA1withRSA"))?;
        let signature = STANDARD
            .decode(keys::strip_whitespace(&frmt.text()))
            .map_err(|_| StampError::StampSignatureInvalid { folio })?;
        if keys::verify(auth.public_key(), algorithm, &flatten_bare(dd), &signature).is_err() {
            return Err(StampError::StampSignatureInvalid { folio });
        }

        let embedded = dd
            .child("CAF")
            .ok_or(StampError::AuthorizationMismatch { folio })?;
        if flatten_bare(embedded) != flatten_bare(auth.caf_element()) {
            return Err(StampError::AuthorizationMismatch { folio });
        }
        let document_type = self.document_type().unwrap_or(DocumentType(0));
        if document_type != auth.document_type() {
            return Err(StampError::DocumentTypeMismatch {
                folio,
                document: document_type,
                authorization: auth.document_type(),
            });
        }
        let emitter = self.dd_text("RE").unwrap_or_default();
        if emitter != auth.emitter().to_string() {
            return Err(StampError::EmitterMismatch {
                folio,
                document: emitter,
                authorization: auth.emitter().to_string(),
            });
        }
        let range = auth.range();
        if !range.contains(folio) {
            return Err(StampError::FolioOutOfRange {
                document_type,
                folio,
                desde: range.desde,
                hasta: range.hasta,
            });
        }
        Ok(())
    }
}
