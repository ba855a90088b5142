//! # Enveloped XML Signatures
//!
//! Produces and checks the `Signature` blocks that make a document or an
//! envelope tamper-evident and attributable.
//!
//! ## Structure
//!
//! ```text
//! <Signature xmlns="http://www.w3.org/2000/09/xmldsig#">
//!   <SignedInfo>
//!     <CanonicalizationMethod Algorithm="…xml-exc-c14n#"/>
//!     <SignatureMethod Algorithm="…rsa-sha1"/>
//!     <Reference URI="#ID">            (URI="" for a whole-document signature,
//!       <Transforms>…</Transforms>      which also lists the enveloped transform)
//!       <DigestMethod Algorithm="…sha1"/>
//!       <DigestValue>base64</DigestValue>
//!     </Reference>
//!   </SignedInfo>
//!   <SignatureValue>base64</SignatureValue>
//!   <KeyInfo>
//!     <KeyValue><RSAKeyValue><Modulus/><Exponent/></RSAKeyValue></KeyValue>
//!     <X509Data><X509Certificate>base64 DER</X509Certificate></X509Data>
//!   </KeyInfo>
//! </Signature>
//! ```
//!
//! A block for `URI="#ID"` is appended to the parent of the referenced
//! element; a block for `URI=""` is appended to the document root.
//!
//! ## Verification
//!
//! Each block is checked against its own referenced subtree, never against
//! "the first signature in the file": an envelope carries one signature per
//! embedded document plus its own. Two independent checks run, in order:
//!
//! 1. the recomputed digest of the referenced content equals `DigestValue`
//!    (else [`SignatureError::DigestMismatch`]);
//! 2. `SignatureValue` verifies over the canonical `SignedInfo` under the
//!    embedded certificate's key (else [`SignatureError::SignatureInvalid`]).
//!
//! A digest mismatch is always fatal.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dte_core::canonical::{self, chain_to};
use dte_core::{digest, ContentDigest, DigestAlgorithm, Element, XmlError};
use thiserror::Error;

use crate::certificate::Certificate;
use crate::error::CryptoError;
use crate::keys::{self, strip_whitespace, SignatureAlgorithm};
use crate::signer::Signer;

/// Namespace of `Signature` blocks.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
/// Enveloped-signature transform identifier.
pub const ENVELOPED_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Failure to produce or to validate a signature block.
#[derive(Error, Debug)]
pub enum SignatureError {
    /// The referenced content changed after signing.
    #[error("reference {reference:?}: digest mismatch, content altered after signing")]
    DigestMismatch {
        /// The `Reference` URI of the failing block.
        reference: String,
    },

    /// The signature value does not verify under the embedded certificate.
    #[error("reference {reference:?}: signature value does not verify")]
    SignatureInvalid {
        /// The `Reference` URI of the failing block.
        reference: String,
    },

    /// The embedded certificate cannot be decoded.
    #[error("reference {reference:?}: embedded certificate is malformed: {reason}")]
    CertificateMalformed {
        /// The `Reference` URI of the failing block.
        reference: String,
        /// Decoder message.
        reason: String,
    },

    /// No block references the requested id.
    #[error("no signature block references {0:?}")]
    ReferenceNotFound(String),

    /// The block's referenced element is absent from the document.
    #[error("signature block references missing element {0:?}")]
    ReferencedContentMissing(String),

    /// No block at the requested position.
    #[error("document has no signature block at position {0}")]
    NoSignatureAt(usize),

    /// The block lacks a required element or attribute.
    #[error("signature block {position} is malformed: {reason}")]
    MalformedBlock {
        /// Position of the block in document order.
        position: usize,
        /// What is missing.
        reason: String,
    },

    /// A method URI names an unsupported algorithm.
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    /// The signer failed.
    #[error("signer failed: {0}")]
    Signer(#[from] CryptoError),

    /// Canonicalization failed.
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),
}

/// What a signature block covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// The element whose `ID` attribute has this value.
    Id(&'a str),
    /// The whole document, minus the signature block itself.
    WholeDocument,
}

impl Reference<'_> {
    /// The `Reference URI` attribute value.
    pub fn uri(&self) -> String {
        match self {
            Self::Id(id) => format!("#{id}"),
            Self::WholeDocument => String::new(),
        }
    }
}

/// A block that passed both checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    /// Position of the block among all blocks in document order.
    pub position: usize,
    /// The `Reference URI` attribute value.
    pub reference: String,
    /// The verified reference digest.
    pub digest: ContentDigest,
    /// Signature method used.
    pub algorithm: SignatureAlgorithm,
    /// Subject of the embedded certificate.
    pub signer_subject: String,
}

/// Outcome for one block in a whole-document check.
#[derive(Debug)]
pub struct SignatureReport {
    /// Position of the block in document order.
    pub position: usize,
    /// The `Reference URI`, when readable.
    pub reference: Option<String>,
    /// The verification outcome.
    pub outcome: Result<VerifiedSignature, SignatureError>,
}

impl SignatureReport {
    /// Whether this block verified.
    pub fn is_valid(&self) -> bool {
        self.outcome.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Sign `reference` inside `doc` and append the block where it belongs.
///
/// The digest is computed over the referenced subtree flattened in place, so
/// it stays valid when the signed element is later embedded elsewhere.
pub fn sign_enveloped(
    doc: &mut Element,
    reference: Reference<'_>,
    signer: &dyn Signer,
    algorithm: SignatureAlgorithm,
) -> Result<(), SignatureError> {
    let digest_algorithm = algorithm.digest_algorithm();
    let referenced = match reference {
        Reference::Id(id) => canonical::flatten_id(doc, id)?,
        Reference::WholeDocument => canonical::flatten(doc)?,
    };
    let content_digest = digest(digest_algorithm, &referenced);

    let mut signature = Element::new("Signature")
        .with_attr("xmlns", XMLDSIG_NS)
        .with_child(signed_info(reference, algorithm, &content_digest));
    let signed_info_bytes = canonical::flatten_path(&signature, "SignedInfo")?;
    let value = signer.sign(algorithm, &signed_info_bytes)?;
    signature.push_child(Element::leaf("SignatureValue", STANDARD.encode(value)));
    signature.push_child(key_info(signer.certificate()));

    match reference {
        Reference::Id(id) => doc
            .parent_of_id_mut(id)
            .ok_or_else(|| XmlError::IdNotFound(id.to_string()))?
            .push_child(signature),
        Reference::WholeDocument => doc.push_child(signature),
    }
    tracing::debug!(
        reference = %reference.uri(),
        digest = %content_digest,
        signer = signer.provider_name(),
        "signature block appended"
    );
    Ok(())
}

fn signed_info(
    reference: Reference<'_>,
    algorithm: SignatureAlgorithm,
    content_digest: &ContentDigest,
) -> Element {
    let mut reference_el = Element::new("Reference").with_attr("URI", reference.uri());
    if reference == Reference::WholeDocument {
        reference_el.push_child(
            Element::new("Transforms")
                .with_child(Element::new("Transform").with_attr("Algorithm", ENVELOPED_TRANSFORM)),
        );
    }
    reference_el.push_child(
        Element::new("DigestMethod").with_attr("Algorithm", content_digest.algorithm.uri()),
    );
    reference_el.push_child(Element::leaf("DigestValue", content_digest.to_base64()));

    Element::new("SignedInfo")
        .with_child(
            Element::new("CanonicalizationMethod")
                .with_attr("Algorithm", canonical::EXCLUSIVE_C14N),
        )
        .with_child(Element::new("SignatureMethod").with_attr("Algorithm", algorithm.uri()))
        .with_child(reference_el)
}

fn key_info(certificate: &Certificate) -> Element {
    let (modulus, exponent) = keys::public_key_components(certificate.public_key());
    Element::new("KeyInfo")
        .with_child(
            Element::new("KeyValue").with_child(
                Element::new("RSAKeyValue")
                    .with_child(Element::leaf("Modulus", modulus))
                    .with_child(Element::leaf("Exponent", exponent)),
            ),
        )
        .with_child(
            Element::new("X509Data")
                .with_child(Element::leaf("X509Certificate", certificate.to_base64())),
        )
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Number of signature blocks in `doc`.
pub fn signature_count(doc: &Element) -> usize {
    signature_chains(doc).len()
}

/// Verify the block whose reference is `#reference_id`, wherever it sits.
pub fn verify(doc: &Element, reference_id: &str) -> Result<VerifiedSignature, SignatureError> {
    let wanted = format!("#{reference_id}");
    let chains = signature_chains(doc);
    let (position, chain) = chains
        .iter()
        .enumerate()
        .find(|(_, chain)| reference_uri(chain_target(chain)).as_deref() == Some(wanted.as_str()))
        .ok_or_else(|| SignatureError::ReferenceNotFound(reference_id.to_string()))?;
    verify_block(doc, chain, position)
}

/// Verify the whole-document block (`URI=""`).
pub fn verify_whole_document(doc: &Element) -> Result<VerifiedSignature, SignatureError> {
    let chains = signature_chains(doc);
    let (position, chain) = chains
        .iter()
        .enumerate()
        .find(|(_, chain)| reference_uri(chain_target(chain)).as_deref() == Some(""))
        .ok_or_else(|| SignatureError::ReferenceNotFound(String::new()))?;
    verify_block(doc, chain, position)
}

/// Verify the block at `position` (document order) against its own reference.
pub fn verify_at(doc: &Element, position: usize) -> Result<VerifiedSignature, SignatureError> {
    let chains = signature_chains(doc);
    let chain = chains
        .get(position)
        .ok_or(SignatureError::NoSignatureAt(position))?;
    verify_block(doc, chain, position)
}

/// Verify every block independently.
pub fn verify_all(doc: &Element) -> Vec<SignatureReport> {
    signature_chains(doc)
        .iter()
        .enumerate()
        .map(|(position, chain)| SignatureReport {
            position,
            reference: reference_uri(chain_target(chain)),
            outcome: verify_block(doc, chain, position),
        })
        .collect()
}

fn chain_target<'a>(chain: &[&'a Element]) -> &'a Element {
    chain[chain.len() - 1]
}

fn reference_uri(signature: &Element) -> Option<String> {
    signature
        .find("SignedInfo/Reference")
        .and_then(|r| r.attr("URI"))
        .map(str::to_string)
}

/// Root-to-block chains for every `Signature` element, in document order.
fn signature_chains(doc: &Element) -> Vec<Vec<&Element>> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    collect_signatures(doc, &mut path, &mut out);
    out
}

fn collect_signatures<'a>(
    el: &'a Element,
    path: &mut Vec<&'a Element>,
    out: &mut Vec<Vec<&'a Element>>,
) {
    path.push(el);
    if el.local_name() == "Signature" {
        out.push(path.clone());
    } else {
        for child in el.child_elements() {
            collect_signatures(child, path, out);
        }
    }
    path.pop();
}

fn verify_block(
    doc: &Element,
    chain: &[&Element],
    position: usize,
) -> Result<VerifiedSignature, SignatureError> {
    let signature = chain_target(chain);
    let malformed = |reason: &str| SignatureError::MalformedBlock {
        position,
        reason: reason.to_string(),
    };

    let signed_info = signature
        .child("SignedInfo")
        .ok_or_else(|| malformed("missing SignedInfo"))?;
    let reference_el = signed_info
        .child("Reference")
        .ok_or_else(|| malformed("missing Reference"))?;
    let reference = reference_el
        .attr("URI")
        .ok_or_else(|| malformed("Reference has no URI"))?
        .to_string();

    let c14n = signed_info
        .find("CanonicalizationMethod")
        .and_then(|m| m.attr("Algorithm"))
        .ok_or_else(|| malformed("missing CanonicalizationMethod"))?;
    if c14n != canonical::EXCLUSIVE_C14N {
        return Err(SignatureError::UnsupportedAlgorithm(c14n.to_string()));
    }
    let method_uri = signed_info
        .find("SignatureMethod")
        .and_then(|m| m.attr("Algorithm"))
        .ok_or_else(|| malformed("missing SignatureMethod"))?;
    let algorithm = SignatureAlgorithm::from_uri(method_uri)
        .map_err(|_| SignatureError::UnsupportedAlgorithm(method_uri.to_string()))?;
    let digest_uri = reference_el
        .find("DigestMethod")
        .and_then(|m| m.attr("Algorithm"))
        .ok_or_else(|| malformed("missing DigestMethod"))?;
    let digest_algorithm = DigestAlgorithm::from_uri(digest_uri)
        .ok_or_else(|| SignatureError::UnsupportedAlgorithm(digest_uri.to_string()))?;

    // Check 1: reference digest.
    let referenced = match reference.strip_prefix('#') {
        Some(id) => canonical::flatten_id_enveloped(doc, id, signature).map_err(|e| match e {
            XmlError::IdNotFound(_) => SignatureError::ReferencedContentMissing(reference.clone()),
            other => SignatureError::Xml(other),
        })?,
        None if reference.is_empty() => canonical::flatten_enveloped(doc, signature)?,
        None => return Err(malformed("Reference URI is neither empty nor a fragment")),
    };
    let computed = digest(digest_algorithm, &referenced);
    let claimed = reference_el
        .child_text("DigestValue")
        .ok_or_else(|| malformed("missing DigestValue"))?;
    let claimed = STANDARD.decode(strip_whitespace(&claimed)).unwrap_or_default();
    if claimed != computed.bytes {
        tracing::warn!(reference = %reference, position, "digest mismatch");
        return Err(SignatureError::DigestMismatch { reference });
    }

    // Check 2: signature value under the embedded certificate.
    let cert_text = signature
        .find("KeyInfo/X509Data/X509Certificate")
        .map(Element::text)
        .ok_or_else(|| SignatureError::CertificateMalformed {
            reference: reference.clone(),
            reason: "no X509Certificate".into(),
        })?;
    let certificate = Certificate::from_base64(&cert_text).map_err(|e| {
        SignatureError::CertificateMalformed {
            reference: reference.clone(),
            reason: e.to_string(),
        }
    })?;

    let mut signed_info_chain = chain.to_vec();
    signed_info_chain.push(signed_info);
    let signed_info_bytes = canonical::flatten_in_context(&signed_info_chain)?;
    let value_text = signature
        .child_text("SignatureValue")
        .ok_or_else(|| malformed("missing SignatureValue"))?;
    let value = STANDARD
        .decode(strip_whitespace(&value_text))
        .map_err(|_| SignatureError::SignatureInvalid {
            reference: reference.clone(),
        })?;
    if keys::verify(certificate.public_key(), algorithm, &signed_info_bytes, &value).is_err() {
        tracing::warn!(reference = %reference, position, "signature value invalid");
        return Err(SignatureError::SignatureInvalid { reference });
    }

    Ok(VerifiedSignature {
        position,
        reference,
        digest: computed,
        algorithm,
        signer_subject: certificate.subject().to_string(),
    })
}

/// Locate the element a `#id` reference points to.
pub fn referenced_element<'a>(doc: &'a Element, id: &str) -> Option<&'a Element> {
    chain_to(doc, &|el: &Element| el.attr("ID") == Some(id)).map(|chain| chain[chain.len() - 1])
}
