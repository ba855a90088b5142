//! # Tax Documents
//!
//! A thin wrapper over a parsed `DTE` tree exposing the header fields the
//! stamp and the envelope need. The document body is the first child of
//! `DTE` (`Documento`, `Liquidacion` or `Exportaciones`); its `ID`
//! attribute is what the document signature references.

use dte_core::{parse, DocumentType, Element};

use crate::error::StampError;

/// Namespace of authority documents.
pub const SII_NS: &str = "http://www.sii.cl/SiiDte";

/// A tax document, stamped or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parse a `DTE` document.
    pub fn from_xml(xml: &str) -> Result<Self, StampError> {
        Self::from_element(parse(xml)?)
    }

    /// Wrap a parsed `DTE` tree.
    pub fn from_element(root: Element) -> Result<Self, StampError> {
        if root.local_name() != "DTE" {
            return Err(StampError::MalformedDocument(format!(
                "root element is {}, expected DTE",
                root.name()
            )));
        }
        let document = Self { root };
        document.body()?;
        Ok(document)
    }

    /// The `DTE` root.
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Consume into the `DTE` root.
    pub fn into_element(self) -> Element {
        self.root
    }

    /// The document body (first non-signature child of `DTE`).
    pub fn body(&self) -> Result<&Element, StampError> {
        self.root
            .child_elements()
            .find(|el| el.local_name() != "Signature")
            .ok_or_else(|| StampError::MalformedDocument("DTE has no body element".into()))
    }

    pub(crate) fn body_mut(&mut self) -> Result<&mut Element, StampError> {
        let name = self.body()?.local_name().to_string();
        self.root
            .child_mut(&name)
            .ok_or_else(|| StampError::MalformedDocument("DTE has no body element".into()))
    }

    /// Text at `path` below the body, if present and non-empty.
    pub fn field(&self, path: &str) -> Option<String> {
        self.body()
            .ok()?
            .find(path)
            .map(Element::text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Declared document type (`Encabezado/IdDoc/TipoDTE`).
    pub fn document_type(&self) -> Result<DocumentType, StampError> {
        let text = self.field("Encabezado/IdDoc/TipoDTE").ok_or(StampError::MissingRequiredField {
            folio: 0,
            field: "Encabezado/IdDoc/TipoDTE",
        })?;
        DocumentType::parse(&text).map_err(|e| StampError::MalformedDocument(e.to_string()))
    }

    /// Declared folio (`Encabezado/IdDoc/Folio`).
    pub fn folio(&self) -> Result<u64, StampError> {
        let text = self.field("Encabezado/IdDoc/Folio").ok_or(StampError::MissingRequiredField {
            folio: 0,
            field: "Encabezado/IdDoc/Folio",
        })?;
        text.parse()
            .map_err(|_| StampError::MalformedDocument(format!("folio {text:?} is not a number")))
    }

    /// Emitter id as written (`Encabezado/Emisor/RUTEmisor`).
    pub fn emitter(&self) -> Option<String> {
        self.field("Encabezado/Emisor/RUTEmisor")
    }

    /// Receiver id as written (`Encabezado/Receptor/RUTRecep`).
    pub fn receiver(&self) -> Option<String> {
        self.field("Encabezado/Receptor/RUTRecep")
    }

    /// The body's `ID` attribute, if any.
    pub fn reference_id(&self) -> Option<&str> {
        self.body().ok()?.attr("ID")
    }

    /// Whether the body carries a stamp.
    pub fn is_stamped(&self) -> bool {
        self.body()
            .ok()
            .and_then(|b| b.child("TED"))
            .is_some_and(|ted| ted.child("DD").is_some())
    }

    /// Compact serialization with XML declaration.
    pub fn to_xml(&self) -> String {
        self.root.to_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<DTE xmlns="http://www.sii.cl/SiiDte" version="1.0">
      <Documento ID="T33F21">
        <Encabezado>
          <IdDoc><TipoDTE>33</TipoDTE><Folio>21</Folio><FchEmis>2026-03-02</FchEmis></IdDoc>
          <Emisor><RUTEmisor>76192083-9</RUTEmisor></Emisor>
          <Receptor><RUTRecep>60803000-K</RUTRecep></Receptor>
        </Encabezado>
        <TED/>
      </Documento>
    </DTE>"#;

    #[test]
    fn test_header_fields() {
        let doc = Document::from_xml(XML).unwrap();
        assert_eq!(doc.document_type().unwrap(), DocumentType::INVOICE);
        assert_eq!(doc.folio().unwrap(), 21);
        assert_eq!(doc.emitter().as_deref(), Some("76192083-9"));
        assert_eq!(doc.receiver().as_deref(), Some("60803000-K"));
        assert_eq!(doc.reference_id(), Some("T33F21"));
        assert_eq!(doc.body().unwrap().name(), "Documento");
    }

    #[test]
    fn test_placeholder_is_not_a_stamp() {
        let doc = Document::from_xml(XML).unwrap();
        assert!(!doc.is_stamped());
    }

    #[test]
    fn test_wrong_root_or_empty_body() {
        assert!(matches!(
            Document::from_xml("<EnvioDTE/>"),
            Err(StampError::MalformedDocument(_))
        ));
        assert!(matches!(
            Document::from_xml("<DTE version=\"1.0\"/>"),
            Err(StampError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_missing_and_non_numeric_folio() {
        let doc = Document::from_xml(&XML.replace("<Folio>21</Folio>", "")).unwrap();
        assert!(matches!(
            doc.folio(),
            Err(StampError::MissingRequiredField { field: "Encabezado/IdDoc/Folio", .. })
        ));
        let doc = Document::from_xml(&XML.replace("<Folio>21</Folio>", "<Folio>X</Folio>")).unwrap();
        assert!(matches!(doc.folio(), Err(StampError::MalformedDocument(_))));
    }

    #[test]
    fn test_blank_field_is_absent() {
        let doc = Document::from_xml(&XML.replace("60803000-K", "  ")).unwrap();
        assert_eq!(doc.receiver(), None);
    }
}
