//! # Envelope Assembler — Batching and Sealing Signed Documents
//!
//! Accumulates signed documents of one category and seals them into a
//! single signed `EnvioDTE` (tax documents) or `EnvioBOLETA` (receipts).
//!
//! ## States
//!
//! ```text
//! Open ──add()──▶ Open ──seal()──▶ Sealed ──seal()──▶ Sealed (cached)
//! ```
//!
//! `add` on a sealed assembler fails with `AlreadySealed`.
//!
//! ## Security Invariant
//!
//! The envelope signature references `SetDTE` by ID and is appended to the
//! envelope root. Embedded documents keep their own signatures, which stay
//! verifiable inside the envelope because both digests are computed over
//! exclusive canonical forms.

use std::collections::BTreeMap;
use std::sync::Arc;

use dte_core::{format_date, Clock, DocumentType, Element, Rut, Timestamp};
use dte_crypto::xmldsig::{self, Reference, SignatureReport, VerifiedSignature};
use dte_crypto::{SignatureAlgorithm, Signer};
use dte_stamp::document::{Document, SII_NS};
use dte_stamp::{DocumentCategory, KindRegistry, SignedDocument};
use serde::Serialize;

use crate::cover::CoverSheet;
use crate::error::{EnvelopeError, LimitKind};
use crate::limits::{template, EnvelopeLimits, LimitTable};

/// `ID` of the `SetDTE` node the envelope signature references.
pub const SET_ID: &str = "SetDoc";

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Collects signed documents and seals them once.
pub struct EnvelopeAssembler {
    registry: KindRegistry,
    limits: LimitTable,
    clock: Arc<dyn Clock>,
    category: Option<DocumentCategory>,
    documents: Vec<SignedDocument>,
    sealed: Option<SealedEnvelope>,
}

impl EnvelopeAssembler {
    /// Empty assembler. The category is fixed by the first document added.
    pub fn new(registry: KindRegistry, limits: LimitTable, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            limits,
            clock,
            category: None,
            documents: Vec::new(),
            sealed: None,
        }
    }

    /// Category of the documents held so far.
    pub fn category(&self) -> Option<DocumentCategory> {
        self.category
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether no documents were added.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether [`seal`](Self::seal) has succeeded.
    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    /// Add a signed document.
    ///
    /// Rejects a category change, a repeated type/folio pair, a new type
    /// past the type limit, and any document past the count limit.
    pub fn add(&mut self, document: SignedDocument) -> Result<(), EnvelopeError> {
        if self.sealed.is_some() {
            return Err(EnvelopeError::AlreadySealed);
        }
        let document_type = document.document_type();
        let folio = document.folio();
        let category = self
            .registry
            .category_of(document_type)
            .ok_or(EnvelopeError::UnsupportedDocumentType(document_type))?;
        if let Some(expected) = self.category {
            if expected != category {
                return Err(EnvelopeError::CategoryMismatch {
                    expected,
                    found: category,
                    document_type,
                    folio,
                });
            }
        }
        if self
            .documents
            .iter()
            .any(|d| d.document_type() == document_type && d.folio() == folio)
        {
            return Err(EnvelopeError::DuplicateDocument {
                document_type,
                folio,
            });
        }

        let limits = self.limits.for_category(category);
        let full = |limit: LimitKind, max: usize| EnvelopeError::EnvelopeFull {
            limit,
            max,
            category,
            document_type,
            folio,
        };
        if self.documents.len() >= limits.max_documents {
            return Err(full(LimitKind::Documents, limits.max_documents));
        }
        let mut types = self.subtotals();
        *types.entry(document_type).or_default() += 1;
        if types.len() > limits.max_types {
            return Err(full(LimitKind::DocumentTypes, limits.max_types));
        }

        tracing::debug!(%document_type, folio, %category, held = self.documents.len() + 1, "document added to envelope");
        self.category = Some(category);
        self.documents.push(document);
        Ok(())
    }

    /// Seal the envelope: build the cover sheet, embed every document and
    /// sign `SetDTE`. A second call returns the first result unchanged,
    /// ignoring its arguments.
    pub fn seal(
        &mut self,
        cover: &CoverSheet,
        signer: &dyn Signer,
    ) -> Result<SealedEnvelope, EnvelopeError> {
        if let Some(sealed) = &self.sealed {
            return Ok(sealed.clone());
        }
        let category = self.category.ok_or(EnvelopeError::Empty)?;
        let subtotals = self.subtotals();
        check_limits(
            category,
            self.limits.for_category(category),
            self.documents.len(),
            subtotals.len(),
        )?;

        let first = &self.documents[0];
        let emitter = match cover.emitter {
            Some(rut) => rut,
            None => first_rut(first.document().emitter(), "RutEmisor")?,
        };
        let receiver = match cover.receiver {
            Some(rut) => rut,
            None => {
                let kind = self
                    .registry
                    .require(first.document_type())
                    .map_err(|_| EnvelopeError::UnsupportedDocumentType(first.document_type()))?;
                let fields = kind.stamp_fields(first.document())?;
                first_rut(Some(fields.receiver), "RutReceptor")?
            }
        };
        let sealed_at = self.clock.now();

        let (root_name, schema_location) = template(category);
        let mut set = Element::new("SetDTE")
            .with_attr("ID", SET_ID)
            .with_child(caratula(cover, emitter, receiver, sealed_at, &subtotals));
        for document in &self.documents {
            set.push_child(document.root().clone());
        }
        let mut root = Element::new(root_name)
            .with_attr("xmlns", SII_NS)
            .with_attr("xmlns:xsi", XSI_NS)
            .with_attr("xsi:schemaLocation", schema_location)
            .with_attr("version", "1.0")
            .with_child(set);
        xmldsig::sign_enveloped(
            &mut root,
            Reference::Id(SET_ID),
            signer,
            SignatureAlgorithm::RsaSha1,
        )?;

        let sealed = SealedEnvelope {
            xml: root.to_document(),
            root,
            set_id: SET_ID.to_string(),
            category,
            subtotals,
            emitter,
            sender: cover.sender,
            sealed_at,
        };
        tracing::info!(
            %category,
            documents = sealed.document_count(),
            emitter = %emitter,
            sender = %cover.sender,
            tmst_firma_env = %sealed_at,
            "envelope sealed"
        );
        self.sealed = Some(sealed.clone());
        Ok(sealed)
    }

    fn subtotals(&self) -> BTreeMap<DocumentType, usize> {
        let mut out = BTreeMap::new();
        for document in &self.documents {
            *out.entry(document.document_type()).or_default() += 1;
        }
        out
    }
}

impl std::fmt::Debug for EnvelopeAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeAssembler")
            .field("category", &self.category)
            .field("documents", &self.documents.len())
            .field("limits", &self.limits)
            .field("sealed", &self.sealed.is_some())
            .finish_non_exhaustive()
    }
}

fn check_limits(
    category: DocumentCategory,
    limits: EnvelopeLimits,
    documents: usize,
    types: usize,
) -> Result<(), EnvelopeError> {
    if documents > limits.max_documents {
        return Err(EnvelopeError::LimitExceededAtSeal {
            limit: LimitKind::Documents,
            count: documents,
            max: limits.max_documents,
            category,
        });
    }
    if types > limits.max_types {
        return Err(EnvelopeError::LimitExceededAtSeal {
            limit: LimitKind::DocumentTypes,
            count: types,
            max: limits.max_types,
            category,
        });
    }
    Ok(())
}

fn first_rut(value: Option<String>, field: &'static str) -> Result<Rut, EnvelopeError> {
    let value = value.ok_or(EnvelopeError::MissingCoverField(field))?;
    Rut::parse(&value).map_err(|_| EnvelopeError::MissingCoverField(field))
}

fn caratula(
    cover: &CoverSheet,
    emitter: Rut,
    receiver: Rut,
    sealed_at: Timestamp,
    subtotals: &BTreeMap<DocumentType, usize>,
) -> Element {
    let mut caratula = Element::new("Caratula")
        .with_attr("version", "1.0")
        .with_child(Element::leaf("RutEmisor", emitter.to_string()))
        .with_child(Element::leaf("RutEnvia", cover.sender.to_string()))
        .with_child(Element::leaf("RutReceptor", receiver.to_string()))
        .with_child(Element::leaf("FchResol", format_date(&cover.resolution_date)))
        .with_child(Element::leaf("NroResol", cover.resolution_number.to_string()))
        .with_child(Element::leaf("TmstFirmaEnv", sealed_at.to_authority_string()));
    for (document_type, count) in subtotals {
        caratula.push_child(
            Element::new("SubTotDTE")
                .with_child(Element::leaf("TpoDTE", document_type.to_string()))
                .with_child(Element::leaf("NroDTE", count.to_string())),
        );
    }
    caratula
}

// ---------------------------------------------------------------------------
// Sealed envelope
// ---------------------------------------------------------------------------

/// A signed envelope ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    root: Element,
    xml: String,
    set_id: String,
    category: DocumentCategory,
    subtotals: BTreeMap<DocumentType, usize>,
    emitter: Rut,
    sender: Rut,
    sealed_at: Timestamp,
}

impl SealedEnvelope {
    /// Load a previously sealed envelope and check its signature.
    ///
    /// The original text is kept byte for byte for dispatch.
    pub fn from_xml(xml: &str) -> Result<Self, EnvelopeError> {
        let root = dte_core::parse(xml)?;
        let category = match root.local_name() {
            "EnvioDTE" => DocumentCategory::TaxDocument,
            "EnvioBOLETA" => DocumentCategory::Receipt,
            other => {
                return Err(EnvelopeError::Malformed(format!(
                    "unexpected envelope root <{other}>"
                )))
            }
        };
        let set = root.require("SetDTE")?;
        let set_id = set
            .attr("ID")
            .ok_or_else(|| EnvelopeError::Malformed("SetDTE has no ID".into()))?
            .to_string();
        let caratula = set.require("Caratula")?;
        let emitter = first_rut(caratula.child_text("RutEmisor"), "RutEmisor")?;
        let sender = first_rut(caratula.child_text("RutEnvia"), "RutEnvia")?;
        let mut subtotals = BTreeMap::new();
        for entry in caratula.descendants("SubTotDTE") {
            let document_type = DocumentType::parse(&entry.require_text("TpoDTE")?)
                .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
            let count = entry
                .require_text("NroDTE")?
                .trim()
                .parse::<usize>()
                .map_err(|e| EnvelopeError::Malformed(format!("NroDTE: {e}")))?;
            subtotals.insert(document_type, count);
        }
        let sealed_at = Timestamp::parse(&caratula.require_text("TmstFirmaEnv")?)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        xmldsig::verify(&root, &set_id)?;
        let carried = carried_counts(set)?;
        if carried != subtotals {
            return Err(EnvelopeError::Malformed(format!(
                "cover sheet declares {} documents, SetDTE carries {}",
                subtotals.values().sum::<usize>(),
                carried.values().sum::<usize>()
            )));
        }
        Ok(Self {
            emitter,
            sender,
            xml: xml.to_string(),
            set_id,
            category,
            subtotals,
            sealed_at,
            root,
        })
    }

    /// Serialized envelope with XML declaration.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Bytes submitted to the authority.
    pub fn as_bytes(&self) -> &[u8] {
        self.xml.as_bytes()
    }

    /// Envelope root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Envelope category.
    pub fn category(&self) -> DocumentCategory {
        self.category
    }

    /// Documents per type.
    pub fn subtotals(&self) -> &BTreeMap<DocumentType, usize> {
        &self.subtotals
    }

    /// Total documents.
    pub fn document_count(&self) -> usize {
        self.subtotals.values().sum()
    }

    /// `RutEmisor`.
    pub fn emitter(&self) -> Rut {
        self.emitter
    }

    /// `RutEnvia`.
    pub fn sender(&self) -> Rut {
        self.sender
    }

    /// `TmstFirmaEnv`.
    pub fn sealed_at(&self) -> Timestamp {
        self.sealed_at
    }

    /// Check the envelope signature over `SetDTE`.
    pub fn verify(&self) -> Result<VerifiedSignature, EnvelopeError> {
        Ok(xmldsig::verify(&self.root, &self.set_id)?)
    }

    /// One report per signature block: every document's and the envelope's.
    pub fn verify_all(&self) -> Vec<SignatureReport> {
        xmldsig::verify_all(&self.root)
    }

    /// Printable summary.
    pub fn summary(&self) -> EnvelopeSummary {
        EnvelopeSummary {
            category: self.category,
            document_count: self.document_count(),
            subtotals: self
                .subtotals
                .iter()
                .map(|(&document_type, &count)| SubTotal {
                    document_type,
                    count,
                })
                .collect(),
            emitter: self.emitter,
            sender: self.sender,
            sealed_at: self.sealed_at,
        }
    }
}

/// Documents per type as found in the `DTE` children of `SetDTE`.
fn carried_counts(set: &Element) -> Result<BTreeMap<DocumentType, usize>, EnvelopeError> {
    let mut counts = BTreeMap::new();
    for dte in set.child_elements().filter(|el| el.local_name() == "DTE") {
        let document_type = Document::from_element(dte.clone())?.document_type()?;
        *counts.entry(document_type).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Serializable description of a sealed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeSummary {
    /// Tax documents or receipts.
    pub category: DocumentCategory,
    /// Total documents carried.
    pub document_count: usize,
    /// Count per document type, ascending by type code.
    pub subtotals: Vec<SubTotal>,
    /// `RutEmisor`.
    pub emitter: Rut,
    /// `RutEnvia`.
    pub sender: Rut,
    /// `TmstFirmaEnv`.
    pub sealed_at: Timestamp,
}

/// One `SubTotDTE` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubTotal {
    /// `TpoDTE`.
    pub document_type: DocumentType,
    /// `NroDTE`.
    pub count: usize,
}
