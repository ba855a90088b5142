//! # XML Tree Model
//!
//! A small owned element tree, just large enough for tax documents,
//! authorization blocks, envelopes and the authority's wire responses.
//! Parsing is delegated to `quick-xml`; this module only builds the tree.
//!
//! ## Whitespace
//!
//! Whitespace-only text between tags is incidental: it is dropped at parse
//! time, so an indented document and its compact form produce identical
//! trees (and therefore identical canonical bytes). Non-blank text is kept
//! verbatim.
//!
//! ## Names
//!
//! Element and attribute names are stored as written (`ds:Signature`,
//! `xmlns:xsi`). Lookups by path or child name match on the local part.

use std::str::FromStr;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::XmlError;

/// The XML declaration prepended by [`Element::to_document`].
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// A single attribute, namespace declarations included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified attribute name as written.
    pub name: String,
    /// Unescaped attribute value.
    pub value: String,
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data (already unescaped).
    Text(String),
}

/// An XML element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an element holding a single text child.
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(name);
        el.push_text(text);
        el
    }

    /// Builder: add an attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder: append a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.push_child(child);
        self
    }

    /// Qualified name as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its prefix.
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// The element's namespace prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Value of the attribute named exactly `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, replacing any existing value.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    /// All children in document order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Append a child element.
    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append text, merging with a trailing text node. Empty text is a no-op.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(Node::Text(text));
        }
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// First child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.local_name() == local)
    }

    /// Mutable access to the first child element with the given local name.
    pub fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(el) if el.local_name() == local => Some(el),
            _ => None,
        })
    }

    /// Text of the first child with the given local name.
    pub fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).map(Element::text)
    }

    /// Follow a `/`-separated path of local names below this element.
    ///
    /// An empty path resolves to `self`.
    pub fn find(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |el, step| el.child(step))
    }

    /// Mutable variant of [`Element::find`].
    pub fn find_mut(&mut self, path: &str) -> Option<&mut Element> {
        let mut current = self;
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current.child_mut(step)?;
        }
        Some(current)
    }

    /// Like [`Element::find`] but returns `PathNotFound` on a miss.
    pub fn require(&self, path: &str) -> Result<&Element, XmlError> {
        self.find(path)
            .ok_or_else(|| XmlError::PathNotFound(path.to_string()))
    }

    /// Text at `path`, or `PathNotFound`.
    pub fn require_text(&self, path: &str) -> Result<String, XmlError> {
        self.require(path).map(Element::text)
    }

    /// Every element (self included) with the given local name, in document order.
    pub fn descendants(&self, local: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_descendants(local, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, local: &str, out: &mut Vec<&'a Element>) {
        if self.local_name() == local {
            out.push(self);
        }
        for child in self.child_elements() {
            child.collect_descendants(local, out);
        }
    }

    /// The element (self included) whose `ID` attribute equals `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.attr("ID") == Some(id) {
            return Some(self);
        }
        self.child_elements().find_map(|c| c.find_by_id(id))
    }

    /// Mutable access to the parent of the element whose `ID` is `id`.
    pub fn parent_of_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        let direct = self
            .child_elements()
            .any(|c| c.attr("ID") == Some(id));
        if direct {
            return Some(self);
        }
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(el) => el.parent_of_id_mut(id),
            Node::Text(_) => None,
        })
    }

    /// Replace the first child with local name `local`; returns `false` if absent.
    pub fn replace_child(&mut self, local: &str, replacement: Element) -> bool {
        for node in self.children.iter_mut() {
            if let Node::Element(el) = node {
                if el.local_name() == local {
                    *node = Node::Element(replacement);
                    return true;
                }
            }
        }
        false
    }

    /// Remove every direct child element with local name `local`.
    pub fn remove_children(&mut self, local: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|n| match n {
            Node::Element(el) => el.local_name() != local,
            Node::Text(_) => true,
        });
        before - self.children.len()
    }

    /// Compact serialization without an XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Compact serialization with the XML declaration.
    pub fn to_document(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        out.push('\n');
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&escape(attr.value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(el) => el.write_to(out),
                Node::Text(t) => out.push_str(&escape(t.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl FromStr for Element {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Split `prefix:local` into its parts.
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Parse a document into its root element.
///
/// Declarations, processing instructions, comments and doctype are skipped.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| XmlError::Malformed {
            position,
            message: e.to_string(),
        })?;
        match event {
            Event::Start(start) => stack.push(open_element(&start, position)?),
            Event::Empty(start) => {
                let el = open_element(&start, position)?;
                attach(&mut stack, &mut root, el, position)?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| XmlError::Malformed {
                    position,
                    message: "closing tag without matching opening tag".into(),
                })?;
                attach(&mut stack, &mut root, el, position)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| XmlError::Malformed {
                    position,
                    message: e.to_string(),
                })?;
                if !text.trim().is_empty() {
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(text.into_owned()),
                        None => {
                            return Err(XmlError::Malformed {
                                position,
                                message: "text outside the root element".into(),
                            })
                        }
                    }
                }
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                let text = std::str::from_utf8(&raw).map_err(|e| XmlError::Malformed {
                    position,
                    message: e.to_string(),
                })?;
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Malformed {
            position: xml.len() as u64,
            message: format!("element <{}> is never closed", open.name()),
        });
    }
    root.ok_or(XmlError::NoRoot)
}

fn open_element(start: &BytesStart<'_>, position: u64) -> Result<Element, XmlError> {
    let malformed = |message: String| XmlError::Malformed { position, message };
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| malformed(e.to_string()))?
        .to_string();
    let mut el = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| malformed(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?
            .into_owned();
        el.attributes.push(Attribute { name: key, value });
    }
    Ok(el)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
    position: u64,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.push_child(el);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Malformed {
            position,
            message: "more than one root element".into(),
        });
    }
    *root = Some(el);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<DTE xmlns="http://www.sii.cl/SiiDte" version="1.0">
  <!-- comment -->
  <Documento ID="F21T33">
    <Encabezado>
      <IdDoc><TipoDTE>33</TipoDTE><Folio>21</Folio></IdDoc>
      <Receptor><RznSocRecep>Pérez &amp; Cía</RznSocRecep></Receptor>
    </Encabezado>
    <TED/>
  </Documento>
</DTE>"#;

    #[test]
    fn test_parse_drops_incidental_whitespace() {
        let root = parse(SAMPLE).unwrap();
        assert_eq!(root.name(), "DTE");
        let doc = root.child("Documento").unwrap();
        assert_eq!(doc.children().len(), 2);
        assert!(doc.children().iter().all(|n| matches!(n, Node::Element(_))));
    }

    #[test]
    fn test_find_path_and_text_unescaped() {
        let root = parse(SAMPLE).unwrap();
        assert_eq!(root.require_text("Documento/Encabezado/IdDoc/Folio").unwrap(), "21");
        assert_eq!(
            root.find("Documento/Encabezado/Receptor/RznSocRecep").unwrap().text(),
            "Pérez & Cía"
        );
        assert_eq!(
            root.require("Documento/Nope").unwrap_err(),
            XmlError::PathNotFound("Documento/Nope".into())
        );
    }

    #[test]
    fn test_find_by_id_and_parent() {
        let mut root = parse(SAMPLE).unwrap();
        assert_eq!(root.find_by_id("F21T33").unwrap().local_name(), "Documento");
        assert!(root.find_by_id("missing").is_none());
        let parent = root.parent_of_id_mut("F21T33").unwrap();
        assert_eq!(parent.name(), "DTE");
    }

    #[test]
    fn test_replace_placeholder() {
        let mut root = parse(SAMPLE).unwrap();
        let doc = root.find_mut("Documento").unwrap();
        assert!(doc.replace_child("TED", Element::leaf("TED", "stamped")));
        assert!(!doc.replace_child("Missing", Element::new("X")));
        assert_eq!(root.require_text("Documento/TED").unwrap(), "stamped");
    }

    #[test]
    fn test_serialize_roundtrip_preserves_tree() {
        let root = parse(SAMPLE).unwrap();
        let xml = root.to_document();
        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains("P\u{e9}rez &amp; C\u{ed}a"));
        assert_eq!(parse(&xml).unwrap(), root);
    }

    #[test]
    fn test_prefixed_names() {
        let root = parse(r#"<SII:RESPUESTA xmlns:SII="http://www.sii.cl/XMLSchema"><SII:RESP_HDR><ESTADO>00</ESTADO></SII:RESP_HDR></SII:RESPUESTA>"#).unwrap();
        assert_eq!(root.local_name(), "RESPUESTA");
        assert_eq!(root.prefix(), Some("SII"));
        assert_eq!(root.require_text("RESP_HDR/ESTADO").unwrap(), "00");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse("<a><Signature n=\"1\"/><b><Signature n=\"2\"/></b></a>").unwrap();
        let sigs = root.descendants("Signature");
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].attr("n"), Some("1"));
        assert_eq!(sigs[1].attr("n"), Some("2"));
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert!(matches!(parse("<a><b></a>"), Err(XmlError::Malformed { .. })));
        assert!(matches!(parse("<a>"), Err(XmlError::Malformed { .. })));
        assert!(matches!(parse("<a/><b/>"), Err(XmlError::Malformed { .. })));
        assert_eq!(parse(""), Err(XmlError::NoRoot));
    }

    #[test]
    fn test_remove_children() {
        let mut root = parse("<a><s/><b/><s/></a>").unwrap();
        assert_eq!(root.remove_children("s"), 2);
        assert_eq!(root.to_xml(), "<a><b/></a>");
    }
}
