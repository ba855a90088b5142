//! # Document Signing
//!
//! Signs a stamped document's body by its `ID`, after recording the
//! signing time in `TmstFirma`. The resulting [`SignedDocument`] is what
//! the envelope assembler accepts.

use dte_core::{Clock, DocumentType, Element};
use dte_crypto::xmldsig::{self, Reference, VerifiedSignature};
use dte_crypto::{SignatureAlgorithm, Signer};

use crate::document::Document;
use crate::error::StampError;
use crate::ted::StampedDocument;

/// A stamped document carrying its own signature block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument {
    document: Document,
    reference_id: String,
    document_type: DocumentType,
    folio: u64,
}

impl SignedDocument {
    /// Wrap a document that is already signed, checking its signature.
    pub fn from_document(document: Document) -> Result<Self, StampError> {
        let reference_id = document
            .reference_id()
            .ok_or_else(|| StampError::MalformedDocument("body has no ID attribute".into()))?
            .to_string();
        xmldsig::verify(document.root(), &reference_id)?;
        Ok(Self {
            document_type: document.document_type()?,
            folio: document.folio()?,
            reference_id,
            document,
        })
    }

    /// The signed document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The `DTE` root.
    pub fn root(&self) -> &Element {
        self.document.root()
    }

    /// The `ID` the signature references.
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// Document type.
    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Folio.
    pub fn folio(&self) -> u64 {
        self.folio
    }

    /// Re-check the document's own signature.
    pub fn verify(&self) -> Result<VerifiedSignature, StampError> {
        Ok(xmldsig::verify(self.document.root(), &self.reference_id)?)
    }

    /// Compact serialization with XML declaration.
    pub fn to_xml(&self) -> String {
        self.document.to_xml()
    }
}

/// Sign a stamped document.
///
/// Assigns `ID="T{type}F{folio}"` to the body when it has none, replaces
/// or appends `TmstFirma` with the clock's time, then appends a signature
/// block referencing the body to `DTE`.
pub fn sign_document(
    stamped: StampedDocument,
    signer: &dyn Signer,
    clock: &dyn Clock,
) -> Result<SignedDocument, StampError> {
    let mut document = stamped.into_document();
    let document_type = document.document_type()?;
    let folio = document.folio()?;
    let reference_id = match document.reference_id() {
        Some(id) => id.to_string(),
        None => format!("T{}F{folio}", document_type.code()),
    };

    let signed_at = clock.now().to_authority_string();
    let body = document.body_mut()?;
    body.set_attr("ID", reference_id.clone());
    if !body.replace_child("TmstFirma", Element::leaf("TmstFirma", signed_at.clone())) {
        body.push_child(Element::leaf("TmstFirma", signed_at.clone()));
    }

    xmldsig::sign_enveloped(
        document.root_mut(),
        Reference::Id(&reference_id),
        signer,
        SignatureAlgorithm::RsaSha1,
    )?;
    tracing::info!(%document_type, folio, reference = %reference_id, tmst_firma = %signed_at, "document signed");
    Ok(SignedDocument {
        document,
        reference_id,
        document_type,
        folio,
    })
}
