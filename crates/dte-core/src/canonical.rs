//! # Canonical XML — Deterministic Subtree Serialization
//!
//! This module defines `CanonicalBytes`, the sole construction path for
//! bytes that are digested or signed anywhere in the DTE stack.
//!
//! ## Security Invariant
//!
//! `CanonicalBytes` has a private inner field. The only way to obtain one is
//! through the flattening functions below, so every digest and signature
//! computation is guaranteed to run over the same byte form. Two
//! structurally identical subtrees always flatten to identical bytes,
//! whatever their attribute order, quoting style, empty-tag style or
//! indentation.
//!
//! ## Rules
//!
//! The namespaced flavour ([`flatten`], [`flatten_path`], [`flatten_id`])
//! follows exclusive XML canonicalization:
//!
//! 1. No XML declaration; comments and processing instructions dropped.
//! 2. Empty elements are written as a start/end tag pair.
//! 3. Only *visibly utilized* namespace declarations are written, at the
//!    outermost element that uses them, sorted by prefix (default first).
//!    A subtree flattened in place inherits the bindings of its ancestors,
//!    so `Documento` flattens identically inside a standalone `DTE` and
//!    inside an envelope.
//! 4. Attributes are sorted by (namespace URI, local name).
//! 5. Text escapes `&`, `<`, `>` and `\r`; attribute values escape `&`,
//!    `<`, `"`, `\t`, `\n` and `\r`.
//!
//! The bare flavour ([`flatten_bare`], [`flatten_bare_path`]) applies the
//! same rules but writes no namespace declarations at all. It is used for
//! the stamp body and the authorization payload, whose signatures cover the
//! fragment itself, independent of whichever document it is embedded in.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::XmlError;
use crate::xml::{split_qname, Element, Node};

/// Identifier of the canonicalization written into `SignedInfo`.
pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Bytes produced exclusively by canonical flattening.
///
/// # Invariants
///
/// - The only constructors are the `flatten*` functions in this module.
/// - Identical trees yield identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View as UTF-8 text. Canonical output is always valid UTF-8.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Flatten a standalone element (no inherited namespace bindings).
pub fn flatten(element: &Element) -> Result<CanonicalBytes, XmlError> {
    Canonicalizer::namespaced(None).run(&[element])
}

/// Flatten the element at `path` below `root`, inheriting ancestor bindings.
pub fn flatten_path(root: &Element, path: &str) -> Result<CanonicalBytes, XmlError> {
    let chain = chain_to_path(root, path).ok_or_else(|| XmlError::PathNotFound(path.into()))?;
    Canonicalizer::namespaced(None).run(&chain)
}

/// Flatten the element whose `ID` attribute is `id`, inheriting ancestor bindings.
pub fn flatten_id(root: &Element, id: &str) -> Result<CanonicalBytes, XmlError> {
    let chain = chain_to(root, &|el: &Element| el.attr("ID") == Some(id))
        .ok_or_else(|| XmlError::IdNotFound(id.into()))?;
    Canonicalizer::namespaced(None).run(&chain)
}

/// Like [`flatten_id`], but leaves out `excluded` if it lies inside the
/// referenced subtree.
pub fn flatten_id_enveloped(
    root: &Element,
    id: &str,
    excluded: &Element,
) -> Result<CanonicalBytes, XmlError> {
    let chain = chain_to(root, &|el: &Element| el.attr("ID") == Some(id))
        .ok_or_else(|| XmlError::IdNotFound(id.into()))?;
    Canonicalizer::namespaced(Some(excluded)).run(&chain)
}

/// Flatten `root` as a whole while leaving out one descendant element.
///
/// This is the enveloped-signature transform: `excluded` must be a
/// reference into `root`'s own tree (matched by identity, not equality).
pub fn flatten_enveloped(root: &Element, excluded: &Element) -> Result<CanonicalBytes, XmlError> {
    Canonicalizer::namespaced(Some(excluded)).run(&[root])
}

/// Flatten an element inside `chain` (root first, target last).
///
/// Used when a caller already walked the tree, e.g. to reach a
/// `SignedInfo` inside a particular `Signature` block.
pub fn flatten_in_context(chain: &[&Element]) -> Result<CanonicalBytes, XmlError> {
    Canonicalizer::namespaced(None).run(chain)
}

/// Flatten without any namespace declarations.
pub fn flatten_bare(element: &Element) -> CanonicalBytes {
    let mut out = String::new();
    write_bare(element, &mut out);
    CanonicalBytes(out.into_bytes())
}

/// Bare-flatten the element at `path` below `root`.
pub fn flatten_bare_path(root: &Element, path: &str) -> Result<CanonicalBytes, XmlError> {
    root.find(path)
        .map(flatten_bare)
        .ok_or_else(|| XmlError::PathNotFound(path.into()))
}

/// Chain of elements from `root` to the element at `path`.
pub fn chain_to_path<'a>(root: &'a Element, path: &str) -> Option<Vec<&'a Element>> {
    let mut chain = vec![root];
    let mut current = root;
    for step in path.split('/').filter(|s| !s.is_empty()) {
        current = current.child(step)?;
        chain.push(current);
    }
    Some(chain)
}

/// Chain of elements from `root` to the first element (document order)
/// satisfying `pred`.
pub fn chain_to<'a>(
    root: &'a Element,
    pred: &dyn Fn(&Element) -> bool,
) -> Option<Vec<&'a Element>> {
    if pred(root) {
        return Some(vec![root]);
    }
    root.child_elements().find_map(|child| {
        chain_to(child, pred).map(|mut tail| {
            tail.insert(0, root);
            tail
        })
    })
}

// ---------------------------------------------------------------------------
// Namespaced canonicalizer
// ---------------------------------------------------------------------------

type Bindings = BTreeMap<String, String>;

struct Canonicalizer<'x> {
    excluded: Option<&'x Element>,
}

impl<'x> Canonicalizer<'x> {
    fn namespaced(excluded: Option<&'x Element>) -> Self {
        Self { excluded }
    }

    fn run(&self, chain: &[&Element]) -> Result<CanonicalBytes, XmlError> {
        let Some((target, ancestors)) = chain.split_last() else {
            return Ok(CanonicalBytes(Vec::new()));
        };
        let mut scope = Bindings::new();
        for ancestor in ancestors {
            extend_scope(&mut scope, ancestor);
        }
        let mut out = String::new();
        self.write(target, &scope, &Bindings::new(), &mut out)?;
        Ok(CanonicalBytes(out.into_bytes()))
    }

    fn write(
        &self,
        el: &Element,
        parent_scope: &Bindings,
        rendered: &Bindings,
        out: &mut String,
    ) -> Result<(), XmlError> {
        let mut scope = parent_scope.clone();
        extend_scope(&mut scope, el);

        let mut utilized = BTreeSet::new();
        utilized.insert(el.prefix().unwrap_or("").to_string());
        for attr in el.attributes().iter().filter(|a| !is_namespace_decl(&a.name)) {
            if let (Some(prefix), _) = split_qname(&attr.name) {
                if prefix != "xml" {
                    utilized.insert(prefix.to_string());
                }
            }
        }

        let mut now_rendered = rendered.clone();
        let mut decls = Vec::new();
        for prefix in &utilized {
            let uri = match (prefix.as_str(), scope.get(prefix)) {
                ("", bound) => bound.cloned().unwrap_or_default(),
                (_, Some(bound)) => bound.clone(),
                (p, None) => return Err(XmlError::UndeclaredPrefix(p.to_string())),
            };
            let previous = rendered.get(prefix).map(String::as_str).unwrap_or("");
            if previous != uri || (!prefix.is_empty() && !rendered.contains_key(prefix)) {
                decls.push((prefix.clone(), uri.clone()));
                now_rendered.insert(prefix.clone(), uri);
            }
        }

        let mut attrs = Vec::new();
        for attr in el.attributes().iter().filter(|a| !is_namespace_decl(&a.name)) {
            let (prefix, local) = split_qname(&attr.name);
            let ns = match prefix {
                None => String::new(),
                Some("xml") => XML_NAMESPACE.to_string(),
                Some(p) => scope
                    .get(p)
                    .cloned()
                    .ok_or_else(|| XmlError::UndeclaredPrefix(p.to_string()))?,
            };
            attrs.push((ns, local.to_string(), attr));
        }
        attrs.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        out.push('<');
        out.push_str(el.name());
        for (prefix, uri) in &decls {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            escape_attr(uri, out);
            out.push('"');
        }
        for (_, _, attr) in &attrs {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            escape_attr(&attr.value, out);
            out.push('"');
        }
        out.push('>');

        for child in el.children() {
            match child {
                Node::Text(t) => escape_text(t, out),
                Node::Element(c) => {
                    if self.excluded.is_some_and(|ex| std::ptr::eq(ex, c)) {
                        continue;
                    }
                    self.write(c, &scope, &now_rendered, out)?;
                }
            }
        }

        out.push_str("</");
        out.push_str(el.name());
        out.push('>');
        Ok(())
    }
}

fn is_namespace_decl(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

fn extend_scope(scope: &mut Bindings, el: &Element) {
    for attr in el.attributes() {
        if attr.name == "xmlns" {
            scope.insert(String::new(), attr.value.clone());
        } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), attr.value.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Bare flavour
// ---------------------------------------------------------------------------

fn write_bare(el: &Element, out: &mut String) {
    let mut attrs: Vec<_> = el
        .attributes()
        .iter()
        .filter(|a| !is_namespace_decl(&a.name))
        .collect();
    attrs.sort_by(|a, b| a.name.cmp(&b.name));

    out.push('<');
    out.push_str(el.name());
    for attr in attrs {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attr(&attr.value, out);
        out.push('"');
    }
    out.push('>');
    for child in el.children() {
        match child {
            Node::Text(t) => escape_text(t, out),
            Node::Element(c) => write_bare(c, out),
        }
    }
    out.push_str("</");
    out.push_str(el.name());
    out.push('>');
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    fn canon(xml: &str) -> String {
        flatten(&parse(xml).unwrap()).unwrap().as_str().to_string()
    }

    #[test]
    fn test_attribute_order_and_quoting_irrelevant() {
        assert_eq!(canon(r#"<a z="1" b='2'/>"#), r#"<a b="2" z="1"></a>"#);
        assert_eq!(canon(r#"<a b="2" z="1"></a>"#), canon(r#"<a z='1' b="2"/>"#));
    }

    #[test]
    fn test_indentation_irrelevant() {
        let compact = canon("<a><b>x</b><c/></a>");
        let indented = canon("<a>\n  <b>x</b>\n  <c />\n</a>\n");
        assert_eq!(compact, indented);
        assert_eq!(compact, "<a><b>x</b><c></c></a>");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            canon(r#"<a t="x&quot;y&lt;">1 &lt; 2 &amp; 3 &gt; 0</a>"#),
            r#"<a t="x&quot;y&lt;">1 &lt; 2 &amp; 3 &gt; 0</a>"#
        );
    }

    #[test]
    fn test_subtree_inherits_default_namespace() {
        let root = parse(r#"<DTE xmlns="http://www.sii.cl/SiiDte"><Documento ID="D1"><F>1</F></Documento></DTE>"#).unwrap();
        let by_path = flatten_path(&root, "Documento").unwrap();
        let by_id = flatten_id(&root, "D1").unwrap();
        assert_eq!(by_path, by_id);
        assert_eq!(
            by_path.as_str(),
            r#"<Documento xmlns="http://www.sii.cl/SiiDte" ID="D1"><F>1</F></Documento>"#
        );
    }

    #[test]
    fn test_subtree_same_bytes_when_embedded_elsewhere() {
        let standalone = parse(r#"<DTE xmlns="http://www.sii.cl/SiiDte" version="1.0"><Documento ID="D1"><F>1</F></Documento></DTE>"#).unwrap();
        let embedded = parse(r#"<EnvioDTE xmlns="http://www.sii.cl/SiiDte" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="x y"><SetDTE ID="S"><DTE xmlns="http://www.sii.cl/SiiDte" version="1.0"><Documento ID="D1"><F>1</F></Documento></DTE></SetDTE></EnvioDTE>"#).unwrap();
        assert_eq!(
            flatten_id(&standalone, "D1").unwrap(),
            flatten_id(&embedded, "D1").unwrap()
        );
    }

    #[test]
    fn test_redundant_declarations_not_repeated() {
        let out = canon(r#"<a xmlns="urn:x"><b xmlns="urn:x"><c/></b></a>"#);
        assert_eq!(out, r#"<a xmlns="urn:x"><b><c></c></b></a>"#);
    }

    #[test]
    fn test_unused_prefix_dropped_and_used_prefix_kept() {
        let out = canon(r#"<a xmlns:u="urn:unused" xmlns:p="urn:p" p:k="v"><p:b/></a>"#);
        assert_eq!(out, r#"<a xmlns:p="urn:p" p:k="v"><p:b></p:b></a>"#);
    }

    #[test]
    fn test_undeclared_prefix_rejected() {
        let root = parse("<p:a/>").unwrap();
        assert_eq!(flatten(&root), Err(XmlError::UndeclaredPrefix("p".into())));
    }

    #[test]
    fn test_enveloped_excludes_only_target() {
        let root = parse(r#"<a ID="x"><b>1</b><Signature/><Signature n="2"/></a>"#).unwrap();
        let sigs = root.descendants("Signature");
        let out = flatten_enveloped(&root, sigs[0]).unwrap();
        assert_eq!(out.as_str(), r#"<a ID="x"><b>1</b><Signature n="2"></Signature></a>"#);
    }

    #[test]
    fn test_id_enveloped_excludes_nested_signature() {
        let root = parse(r#"<r><a ID="x"><b>1</b><Signature/></a></r>"#).unwrap();
        let sig = root.descendants("Signature")[0];
        let out = flatten_id_enveloped(&root, "x", sig).unwrap();
        assert_eq!(out.as_str(), r#"<a ID="x"><b>1</b></a>"#);
    }

    #[test]
    fn test_bare_drops_namespaces() {
        let root = parse(r#"<DTE xmlns="urn:sii"><TED version="1.0"><DD><RE>1-9</RE></DD></TED></DTE>"#).unwrap();
        let dd = flatten_bare_path(&root, "TED/DD").unwrap();
        assert_eq!(dd.as_str(), "<DD><RE>1-9</RE></DD>");
        assert_eq!(dd, flatten_bare(&parse("<DD>\n <RE>1-9</RE>\n</DD>").unwrap()));
    }

    #[test]
    fn test_missing_path_or_id() {
        let root = parse("<a/>").unwrap();
        assert_eq!(flatten_path(&root, "b"), Err(XmlError::PathNotFound("b".into())));
        assert_eq!(flatten_id(&root, "z"), Err(XmlError::IdNotFound("z".into())));
    }
}
