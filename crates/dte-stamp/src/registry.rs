//! # Document-Type Strategies
//!
//! Each supported document type is a registered [`DocumentKind`] keyed by
//! its type code. A kind decides two things the rest of the stack needs:
//!
//! - its [`DocumentCategory`], which envelopes must keep homogeneous;
//! - how the stamp fields are drawn from the document, including the
//!   receiver defaults the authority mandates for receipts and exports.
//!
//! The registry is a value injected into the stamp generator and the
//! envelope assembler; there is no name-based lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use dte_core::DocumentType;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::StampError;

/// Receiver id the authority prescribes for anonymous receipt buyers.
pub const ANONYMOUS_RECEIVER: &str = "66666666-6";
/// Receiver id the authority prescribes for foreign buyers.
pub const FOREIGN_RECEIVER: &str = "55555555-5";

/// Whether a document is a full tax document or a simplified receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    /// Invoices, notes, guides, settlements, export documents.
    TaxDocument,
    /// Simplified sales receipts.
    Receipt,
}

impl DocumentCategory {
    /// Lowercase label for logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaxDocument => "tax_document",
            Self::Receipt => "receipt",
        }
    }
}

impl std::fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values the stamp body is built from, before truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampFields {
    /// Emitter id (`RE`).
    pub emitter: String,
    /// Document type (`TD`).
    pub document_type: DocumentType,
    /// Folio (`F`).
    pub folio: u64,
    /// Emission date (`FE`).
    pub issued_on: String,
    /// Receiver id (`RR`).
    pub receiver: String,
    /// Receiver name (`RSR`).
    pub receiver_name: String,
    /// Total amount (`MNT`).
    pub total: String,
    /// First line item name (`IT1`).
    pub first_item: String,
}

/// Capability every registered document type implements.
pub trait DocumentKind: Send + Sync {
    /// The type code this strategy handles.
    fn document_type(&self) -> DocumentType;

    /// Envelope category.
    fn category(&self) -> DocumentCategory;

    /// Short human label.
    fn label(&self) -> &'static str;

    /// Local name of the body element under `DTE`.
    fn body_name(&self) -> &'static str {
        "Documento"
    }

    /// Draw the stamp fields from `document`.
    fn stamp_fields(&self, document: &Document) -> Result<StampFields, StampError>;
}

/// Fields every kind requires, shared by the built-in strategies.
fn common_fields(
    document: &Document,
    receiver_default: Option<&'static str>,
) -> Result<StampFields, StampError> {
    let folio = document.folio()?;
    let required = |path: &'static str| {
        document
            .field(path)
            .ok_or(StampError::MissingRequiredField { folio, field: path })
    };
    let receiver = match receiver_default {
        Some(default) => document.receiver().unwrap_or_else(|| default.to_string()),
        None => required("Encabezado/Receptor/RUTRecep")?,
    };
    Ok(StampFields {
        emitter: required("Encabezado/Emisor/RUTEmisor")?,
        document_type: document.document_type()?,
        folio,
        issued_on: required("Encabezado/IdDoc/FchEmis")?,
        receiver,
        receiver_name: document
            .field("Encabezado/Receptor/RznSocRecep")
            .unwrap_or_default(),
        total: required("Encabezado/Totales/MntTotal")?,
        first_item: document.field("Detalle/NmbItem").unwrap_or_default(),
    })
}

// ─── Built-in strategies ────────────────────────────────────────────────

/// Domestic tax documents: the receiver id is mandatory.
#[derive(Debug, Clone, Copy)]
pub struct TaxDocumentKind {
    code: DocumentType,
    label: &'static str,
    body: &'static str,
}

impl TaxDocumentKind {
    /// A domestic tax document with a `Documento` body.
    pub const fn new(code: DocumentType, label: &'static str) -> Self {
        Self {
            code,
            label,
            body: "Documento",
        }
    }

    /// Settlements carry a `Liquidacion` body.
    pub const fn settlement() -> Self {
        Self {
            code: DocumentType::SETTLEMENT,
            label: "settlement invoice",
            body: "Liquidacion",
        }
    }
}

impl DocumentKind for TaxDocumentKind {
    fn document_type(&self) -> DocumentType {
        self.code
    }

    fn category(&self) -> DocumentCategory {
        DocumentCategory::TaxDocument
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn body_name(&self) -> &'static str {
        self.body
    }

    fn stamp_fields(&self, document: &Document) -> Result<StampFields, StampError> {
        common_fields(document, None)
    }
}

/// Simplified receipts: anonymous buyer unless a receiver is given.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptKind {
    code: DocumentType,
    label: &'static str,
}

impl ReceiptKind {
    /// A receipt type.
    pub const fn new(code: DocumentType, label: &'static str) -> Self {
        Self { code, label }
    }
}

impl DocumentKind for ReceiptKind {
    fn document_type(&self) -> DocumentType {
        self.code
    }

    fn category(&self) -> DocumentCategory {
        DocumentCategory::Receipt
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn stamp_fields(&self, document: &Document) -> Result<StampFields, StampError> {
        common_fields(document, Some(ANONYMOUS_RECEIVER))
    }
}

/// Export documents: foreign buyer id unless a receiver is given.
#[derive(Debug, Clone, Copy)]
pub struct ExportKind {
    code: DocumentType,
    label: &'static str,
}

impl ExportKind {
    /// An export document type.
    pub const fn new(code: DocumentType, label: &'static str) -> Self {
        Self { code, label }
    }
}

impl DocumentKind for ExportKind {
    fn document_type(&self) -> DocumentType {
        self.code
    }

    fn category(&self) -> DocumentCategory {
        DocumentCategory::TaxDocument
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn body_name(&self) -> &'static str {
        "Exportaciones"
    }

    fn stamp_fields(&self, document: &Document) -> Result<StampFields, StampError> {
        common_fields(document, Some(FOREIGN_RECEIVER))
    }
}

// ─── Registry ───────────────────────────────────────────────────────────

/// Strategies by type code.
#[derive(Clone)]
pub struct KindRegistry {
    kinds: BTreeMap<DocumentType, Arc<dyn DocumentKind>>,
}

impl KindRegistry {
    /// A registry with no strategies.
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    /// Register `kind`, replacing any strategy for the same code.
    pub fn register(&mut self, kind: impl DocumentKind + 'static) {
        self.kinds.insert(kind.document_type(), Arc::new(kind));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: impl DocumentKind + 'static) -> Self {
        self.register(kind);
        self
    }

    /// The strategy for `code`.
    pub fn get(&self, code: DocumentType) -> Option<&dyn DocumentKind> {
        self.kinds.get(&code).map(|k| k.as_ref())
    }

    /// The strategy for `code`, or `UnsupportedDocumentType`.
    pub fn require(&self, code: DocumentType) -> Result<&dyn DocumentKind, StampError> {
        self.get(code)
            .ok_or(StampError::UnsupportedDocumentType(code))
    }

    /// Category of `code`, if registered.
    pub fn category_of(&self, code: DocumentType) -> Option<DocumentCategory> {
        self.get(code).map(|k| k.category())
    }

    /// Registered codes in ascending order.
    pub fn types(&self) -> impl Iterator<Item = DocumentType> + '_ {
        self.kinds.keys().copied()
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::empty()
            .with(TaxDocumentKind::new(DocumentType::INVOICE, "invoice"))
            .with(TaxDocumentKind::new(DocumentType::EXEMPT_INVOICE, "exempt invoice"))
            .with(ReceiptKind::new(DocumentType::RECEIPT, "receipt"))
            .with(ReceiptKind::new(DocumentType::EXEMPT_RECEIPT, "exempt receipt"))
            .with(TaxDocumentKind::settlement())
            .with(TaxDocumentKind::new(DocumentType::PURCHASE_INVOICE, "purchase invoice"))
            .with(TaxDocumentKind::new(DocumentType::DISPATCH_GUIDE, "dispatch guide"))
            .with(TaxDocumentKind::new(DocumentType::DEBIT_NOTE, "debit note"))
            .with(TaxDocumentKind::new(DocumentType::CREDIT_NOTE, "credit note"))
            .with(ExportKind::new(DocumentType::EXPORT_INVOICE, "export invoice"))
            .with(ExportKind::new(DocumentType::EXPORT_DEBIT_NOTE, "export debit note"))
            .with(ExportKind::new(DocumentType::EXPORT_CREDIT_NOTE, "export credit note"))
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.kinds.values().map(|k| (k.document_type().code(), k.label())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str, type_code: u16, receptor: &str) -> Document {
        Document::from_xml(&format!(
            r#"<DTE version="1.0"><{body} ID="X"><Encabezado><IdDoc><TipoDTE>{type_code}</TipoDTE><Folio>5</Folio><FchEmis>2026-03-02</FchEmis></IdDoc><Emisor><RUTEmisor>76192083-9</RUTEmisor></Emisor>{receptor}<Totales><MntTotal>1190</MntTotal></Totales></Encabezado><Detalle><NmbItem>Cable</NmbItem></Detalle></{body}></DTE>"#
        ))
        .unwrap()
    }

    #[test]
    fn test_default_registry_covers_all_types() {
        let registry = KindRegistry::default();
        let codes: Vec<u16> = registry.types().map(|t| t.code()).collect();
        assert_eq!(codes, vec![33, 34, 39, 41, 43, 46, 52, 56, 61, 110, 111, 112]);
        assert!(registry.get(DocumentType(30)).is_none());
        assert!(matches!(
            registry.require(DocumentType(30)),
            Err(StampError::UnsupportedDocumentType(DocumentType(30)))
        ));
    }

    #[test]
    fn test_categories() {
        let registry = KindRegistry::default();
        assert_eq!(registry.category_of(DocumentType::RECEIPT), Some(DocumentCategory::Receipt));
        assert_eq!(registry.category_of(DocumentType::EXEMPT_RECEIPT), Some(DocumentCategory::Receipt));
        assert_eq!(registry.category_of(DocumentType::INVOICE), Some(DocumentCategory::TaxDocument));
        assert_eq!(registry.category_of(DocumentType::EXPORT_INVOICE), Some(DocumentCategory::TaxDocument));
    }

    #[test]
    fn test_body_names() {
        let registry = KindRegistry::default();
        assert_eq!(registry.get(DocumentType::SETTLEMENT).unwrap().body_name(), "Liquidacion");
        assert_eq!(registry.get(DocumentType::EXPORT_INVOICE).unwrap().body_name(), "Exportaciones");
        assert_eq!(registry.get(DocumentType::CREDIT_NOTE).unwrap().body_name(), "Documento");
    }

    #[test]
    fn test_invoice_requires_receiver() {
        let registry = KindRegistry::default();
        let invoice = doc("Documento", 33, "");
        assert!(matches!(
            registry.get(DocumentType::INVOICE).unwrap().stamp_fields(&invoice),
            Err(StampError::MissingRequiredField { folio: 5, field: "Encabezado/Receptor/RUTRecep" })
        ));
    }

    #[test]
    fn test_receipt_and_export_default_receiver() {
        let registry = KindRegistry::default();
        let receipt = registry
            .get(DocumentType::RECEIPT)
            .unwrap()
            .stamp_fields(&doc("Documento", 39, ""))
            .unwrap();
        assert_eq!(receipt.receiver, ANONYMOUS_RECEIVER);
        assert_eq!(receipt.receiver_name, "");
        assert_eq!(receipt.first_item, "Cable");

        let export = registry
            .get(DocumentType::EXPORT_INVOICE)
            .unwrap()
            .stamp_fields(&doc("Exportaciones", 110, ""))
            .unwrap();
        assert_eq!(export.receiver, FOREIGN_RECEIVER);
    }

    #[test]
    fn test_explicit_receiver_wins_over_default() {
        let registry = KindRegistry::default();
        let fields = registry
            .get(DocumentType::RECEIPT)
            .unwrap()
            .stamp_fields(&doc(
                "Documento",
                39,
                "<Receptor><RUTRecep>60803000-K</RUTRecep><RznSocRecep>SII</RznSocRecep></Receptor>",
            ))
            .unwrap();
        assert_eq!(fields.receiver, "60803000-K");
        assert_eq!(fields.receiver_name, "SII");
    }

    #[test]
    fn test_missing_total_and_date() {
        let registry = KindRegistry::default();
        let kind = registry.get(DocumentType::RECEIPT).unwrap();
        let no_total = Document::from_xml(
            &doc("Documento", 39, "").to_xml().replace("<MntTotal>1190</MntTotal>", ""),
        )
        .unwrap();
        assert!(matches!(
            kind.stamp_fields(&no_total),
            Err(StampError::MissingRequiredField { field: "Encabezado/Totales/MntTotal", .. })
        ));
        let no_date = Document::from_xml(
            &doc("Documento", 39, "").to_xml().replace("<FchEmis>2026-03-02</FchEmis>", ""),
        )
        .unwrap();
        assert!(matches!(
            kind.stamp_fields(&no_date),
            Err(StampError::MissingRequiredField { field: "Encabezado/IdDoc/FchEmis", .. })
        ));
    }

    #[test]
    fn test_custom_registration_replaces() {
        let registry = KindRegistry::empty().with(ReceiptKind::new(DocumentType::INVOICE, "odd"));
        assert_eq!(registry.category_of(DocumentType::INVOICE), Some(DocumentCategory::Receipt));
        assert_eq!(registry.types().count(), 1);
    }
}
