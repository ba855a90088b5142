//! # Authority Transport — Three Opaque Exchanges
//!
//! The authority exposes three calls: seed, token, and upload. The protocol
//! logic (status codes, state transitions) lives in [`crate::auth`] and
//! [`crate::dispatch`] and only sees the authority's response documents,
//! so any transport carrying those documents satisfies the contract.
//!
//! [`HttpTransport`] is the production implementation: SOAP over HTTP for
//! seed and token, a multipart form post for upload.

use dte_core::{parse, Element, Rut};
use reqwest::blocking::{multipart, Client};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use url::Url;

use crate::config::SiiConfig;
use crate::error::TransportError;

/// Seed endpoint path.
pub const SEED_PATH: &str = "/DTEWS/CrSeed.jws";
/// Token endpoint path.
pub const TOKEN_PATH: &str = "/DTEWS/GetTokenFromSeed.jws";
/// Upload endpoint path.
pub const UPLOAD_PATH: &str = "/cgi_dte/UPL/DTEUpload";

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
// The upload endpoint rejects requests without a browser-like agent.
const AUTHORITY_USER_AGENT: &str = "Mozilla/4.0 (compatible; PROG 1.0; Windows NT 5.0; YComp 5.0.2.4)";

/// One envelope upload.
#[derive(Clone)]
pub struct Upload<'a> {
    /// `RutEnvia` of the envelope.
    pub sender: Rut,
    /// `RutEmisor` of the envelope.
    pub emitter: Rut,
    /// Session token.
    pub token: &'a str,
    /// File name reported for the envelope.
    pub file_name: String,
    /// Envelope bytes.
    pub content: &'a [u8],
}

impl std::fmt::Debug for Upload<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("sender", &self.sender)
            .field("emitter", &self.emitter)
            .field("token", &"[REDACTED]")
            .field("file_name", &self.file_name)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// The authority's three exchanges. Each returns the authority's response
/// document as XML text.
pub trait AuthorityTransport: Send + Sync {
    /// Ask for a fresh seed.
    fn request_seed(&self) -> Result<String, TransportError>;

    /// Exchange a signed seed request document for a token.
    fn request_token(&self, signed_request: &str) -> Result<String, TransportError>;

    /// Upload an envelope.
    fn upload(&self, upload: &Upload<'_>) -> Result<String, TransportError>;

    /// Human-readable name for logs.
    fn transport_name(&self) -> &str;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    seed_url: Url,
    token_url: Url,
    upload_url: Url,
}

impl HttpTransport {
    /// Build a transport from configuration.
    pub fn new(config: &SiiConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(AUTHORITY_USER_AGENT));
        let http = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self {
            http,
            seed_url: config.endpoint(SEED_PATH)?,
            token_url: config.endpoint(TOKEN_PATH)?,
            upload_url: config.endpoint(UPLOAD_PATH)?,
        })
    }

    fn soap_call(&self, url: &Url, endpoint: &str, operation: Element) -> Result<String, TransportError> {
        let body = Element::new("soapenv:Envelope")
            .with_attr("xmlns:soapenv", SOAP_ENV_NS)
            .with_child(Element::new("soapenv:Body").with_child(operation))
            .to_document();
        tracing::debug!(endpoint, "calling authority");
        let response = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "")
            .body(body)
            .send()
            .map_err(|e| http_error(endpoint, e))?;
        let text = read_body(endpoint, response)?;
        soap_return(endpoint, &text)
    }
}

impl AuthorityTransport for HttpTransport {
    fn request_seed(&self) -> Result<String, TransportError> {
        self.soap_call(&self.seed_url, SEED_PATH, Element::new("getSeed"))
    }

    fn request_token(&self, signed_request: &str) -> Result<String, TransportError> {
        let operation = Element::new("getToken").with_child(Element::leaf("pszXml", signed_request));
        self.soap_call(&self.token_url, TOKEN_PATH, operation)
    }

    fn upload(&self, upload: &Upload<'_>) -> Result<String, TransportError> {
        let archivo = multipart::Part::bytes(upload.content.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str("text/xml")
            .map_err(|e| http_error(UPLOAD_PATH, e))?;
        let form = multipart::Form::new()
            .text("rutSender", upload.sender.number().to_string())
            .text("dvSender", upload.sender.check_digit().to_string())
            .text("rutCompany", upload.emitter.number().to_string())
            .text("dvCompany", upload.emitter.check_digit().to_string())
            .part("archivo", archivo);
        tracing::debug!(endpoint = UPLOAD_PATH, file = %upload.file_name, bytes = upload.content.len(), "uploading envelope");
        let response = self
            .http
            .post(self.upload_url.clone())
            .header(COOKIE, format!("TOKEN={}", upload.token))
            .multipart(form)
            .send()
            .map_err(|e| http_error(UPLOAD_PATH, e))?;
        read_body(UPLOAD_PATH, response)
    }

    fn transport_name(&self) -> &str {
        "http"
    }
}

fn http_error(endpoint: &str, source: reqwest::Error) -> TransportError {
    TransportError::Http {
        endpoint: endpoint.to_string(),
        source,
    }
}

fn read_body(endpoint: &str, response: reqwest::blocking::Response) -> Result<String, TransportError> {
    let status = response.status();
    let body = response.text().map_err(|e| http_error(endpoint, e))?;
    if !status.is_success() {
        return Err(TransportError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Pull the escaped response document out of a SOAP reply's `*Return` element.
pub(crate) fn soap_return(endpoint: &str, soap: &str) -> Result<String, TransportError> {
    let malformed = |reason: String| TransportError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason,
    };
    let envelope = parse(soap).map_err(|e| malformed(e.to_string()))?;
    let body = envelope
        .child("Body")
        .ok_or_else(|| malformed("SOAP envelope has no Body".into()))?;
    if let Some(fault) = body.child("Fault") {
        let reason = fault.child_text("faultstring").unwrap_or_default();
        return Err(malformed(format!("SOAP fault: {reason}")));
    }
    let value = body
        .child_elements()
        .flat_map(Element::child_elements)
        .find(|el| el.local_name().ends_with("Return"))
        .map(Element::text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| malformed("SOAP body carries no return value".into()));
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soap_return_unescapes_payload() {
        let soap = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <ns1:getSeedResponse xmlns:ns1="urn:CrSeed">
      <getSeedReturn>&lt;SII:RESPUESTA xmlns:SII="http://www.sii.cl/XMLSchema"&gt;&lt;SII:RESP_HDR&gt;&lt;ESTADO&gt;00&lt;/ESTADO&gt;&lt;/SII:RESP_HDR&gt;&lt;/SII:RESPUESTA&gt;</getSeedReturn>
    </ns1:getSeedResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;
        let payload = soap_return(SEED_PATH, soap).unwrap();
        assert!(payload.starts_with("<SII:RESPUESTA"));
        assert!(payload.contains("<ESTADO>00</ESTADO>"));
    }

    #[test]
    fn soap_fault_is_malformed_response() {
        let soap = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><soapenv:Fault><faultstring>boom</faultstring></soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;
        let err = soap_return(TOKEN_PATH, soap).unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn upload_debug_redacts_token() {
        let upload = Upload {
            sender: Rut::parse("11111111-1").unwrap(),
            emitter: Rut::parse("76192083-9").unwrap(),
            token: "SECRET-TOKEN",
            file_name: "envio.xml".into(),
            content: b"<EnvioDTE/>",
        };
        let debug = format!("{upload:?}");
        assert!(!debug.contains("SECRET-TOKEN"));
        assert!(debug.contains("[REDACTED]"));
    }
}
