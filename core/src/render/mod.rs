pub mod client;

pub use client::PhantomRenderClient;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::RequestType;
use crate::error::RenderServiceError;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request descriptor handed to the render service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub method: RequestType,
    pub url: String,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub provoke_page_events: bool,
}

impl RenderRequest {
    pub fn new(method: RequestType, url: String, body: Option<String>) -> Self {
        Self {
            method,
            url,
            body,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            provoke_page_events: true,
        }
    }

    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        self.headers = headers.clone();
        self
    }

    pub fn with_cookies(mut self, cookies: &BTreeMap<String, String>) -> Self {
        self.cookies = cookies.clone();
        self
    }

    /// Caller headers plus the form content type every POST carries.
    pub fn effective_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        if self.method == RequestType::Post {
            headers.retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
            headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
        }
        headers
    }

    /// Encodes the request as the form fields the render service reads.
    ///
    /// `url` and `body` are base64-encoded; `headers` and `cookies` are
    /// JSON-encoded, then base64-encoded. Empty optional fields are omitted.
    pub fn to_form_fields(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let mut fields = vec![
            ("method", self.method.to_string()),
            ("url", BASE64.encode(self.url.as_bytes())),
        ];

        if let Some(body) = self.body.as_deref().filter(|b| !b.is_empty()) {
            fields.push(("body", BASE64.encode(body.as_bytes())));
        }

        let headers = self.effective_headers();
        if !headers.is_empty() {
            fields.push(("headers", BASE64.encode(serde_json::to_string(&headers)?)));
        }

        if !self.cookies.is_empty() {
            fields.push(("cookies", BASE64.encode(serde_json::to_string(&self.cookies)?)));
        }

        if self.provoke_page_events {
            fields.push(("provokePageEvents", "true".to_string()));
        }

        Ok(fields)
    }
}

/// Rendered page plus every JS side effect the render service captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    pub errors: Vec<String>,
    pub console_messages: Vec<String>,
    pub alerts: Vec<String>,
    pub confirms: Vec<String>,
    pub prompts: Vec<String>,
}

/// Response body as sent by the render service: every field base64-encoded,
/// list fields additionally JSON-encoded.
#[derive(Debug, Deserialize)]
pub struct RawRenderedPage {
    pub html: String,
    pub errors: String,
    #[serde(rename = "consoleMessages")]
    pub console_messages: String,
    pub alerts: String,
    pub confirms: String,
    pub prompts: String,
}

impl RawRenderedPage {
    pub fn decode(&self) -> Result<RenderedPage, RenderServiceError> {
        Ok(RenderedPage {
            html: decode_html(&self.html)?,
            errors: decode_list("errors", &self.errors)?,
            console_messages: decode_list("consoleMessages", &self.console_messages)?,
            alerts: decode_list("alerts", &self.alerts)?,
            confirms: decode_list("confirms", &self.confirms)?,
            prompts: decode_list("prompts", &self.prompts)?,
        })
    }
}

fn decode_bytes(field: &str, encoded: &str) -> Result<Vec<u8>, RenderServiceError> {
    BASE64
        .decode(encoded.trim())
        .map_err(|e| RenderServiceError::malformed(field, e))
}

/// Falls back to a lossy decode when the page is not valid UTF-8.
fn decode_html(encoded: &str) -> Result<String, RenderServiceError> {
    let bytes = decode_bytes("html", encoded)?;
    match String::from_utf8(bytes) {
        Ok(html) => Ok(html),
        Err(e) => {
            log::debug!("Rendered HTML is not valid UTF-8, decoding lossily: {}", e);
            Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

fn decode_list(field: &str, encoded: &str) -> Result<Vec<String>, RenderServiceError> {
    let bytes = decode_bytes(field, encoded)?;
    let text = String::from_utf8(bytes).map_err(|e| RenderServiceError::malformed(field, e))?;
    serde_json::from_str(&text).map_err(|e| RenderServiceError::malformed(field, e))
}

/// Stateless boundary to the headless-browser backend.
#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderServiceError>;

    /// Liveness check run once before the first render of an assessment.
    async fn ensure_available(&self) -> Result<(), RenderServiceError> {
        Ok(())
    }
}

pub type RenderServiceRef = Arc<dyn RenderService>;

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        BASE64.encode(s.as_bytes())
    }

    fn field<'a>(fields: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        fields.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_get_request_fields() {
        let req = RenderRequest::new(RequestType::Get, "http://site/x?a=1".to_string(), None);
        let fields = req.to_form_fields().unwrap();

        assert_eq!(field(&fields, "method"), Some("GET"));
        assert_eq!(field(&fields, "url"), Some(b64("http://site/x?a=1").as_str()));
        assert_eq!(field(&fields, "provokePageEvents"), Some("true"));
        assert!(field(&fields, "body").is_none());
        assert!(field(&fields, "headers").is_none());
        assert!(field(&fields, "cookies").is_none());
    }

    #[test]
    fn test_post_request_injects_form_content_type() {
        let mut cookies = BTreeMap::new();
        cookies.insert("sess".to_string(), "abc".to_string());
        let req = RenderRequest::new(RequestType::Post, "http://s/f".to_string(), Some("a=1".to_string()))
            .with_cookies(&cookies);
        let fields = req.to_form_fields().unwrap();

        assert_eq!(field(&fields, "body"), Some(b64("a=1").as_str()));
        let headers = BASE64.decode(field(&fields, "headers").unwrap()).unwrap();
        let headers: BTreeMap<String, String> = serde_json::from_slice(&headers).unwrap();
        assert_eq!(headers.get("Content-Type").map(String::as_str), Some(FORM_CONTENT_TYPE));

        let cookies = BASE64.decode(field(&fields, "cookies").unwrap()).unwrap();
        assert_eq!(String::from_utf8(cookies).unwrap(), r#"{"sess":"abc"}"#);
    }

    #[test]
    fn test_post_replaces_caller_content_type_in_any_case() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        headers.insert("X-Api".to_string(), "k".to_string());

        let post = RenderRequest::new(RequestType::Post, "http://s/f".to_string(), Some("a=1".to_string()))
            .with_headers(&headers);
        let effective = post.effective_headers();
        assert_eq!(effective.len(), 2);
        assert!(!effective.contains_key("content-type"));
        assert_eq!(effective.get("Content-Type").map(String::as_str), Some(FORM_CONTENT_TYPE));
        assert_eq!(effective.get("X-Api").map(String::as_str), Some("k"));

        let get = RenderRequest::new(RequestType::Get, "http://s/f".to_string(), None).with_headers(&headers);
        assert_eq!(get.effective_headers(), headers);
    }

    #[test]
    fn test_decode_raw_page() {
        let raw = RawRenderedPage {
            html: b64("<html><body>hi</body></html>"),
            errors: b64(r#"["ReferenceError: x"]"#),
            console_messages: b64("[]"),
            alerts: b64(r#"["123456789"]"#),
            confirms: b64("[]"),
            prompts: b64("[]"),
        };
        let page = raw.decode().unwrap();
        assert!(page.html.contains("hi"));
        assert_eq!(page.errors, vec!["ReferenceError: x".to_string()]);
        assert_eq!(page.alerts, vec!["123456789".to_string()]);
        assert!(page.console_messages.is_empty());
    }

    #[test]
    fn test_decode_html_falls_back_on_invalid_utf8() {
        let raw_html = BASE64.encode([b'<', b'p', b'>', 0xff, b'<', b'/', b'p', b'>']);
        let html = decode_html(&raw_html).unwrap();
        assert!(html.starts_with("<p>"));
        assert!(html.ends_with("</p>"));
    }

    #[test]
    fn test_decode_rejects_bad_list_json() {
        let err = decode_list("errors", &b64("not json")).unwrap_err();
        assert!(matches!(err, RenderServiceError::MalformedResponse { ref field, .. } if field == "errors"));
    }
}
