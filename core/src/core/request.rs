use serde::Serialize;
use std::collections::BTreeSet;

use crate::core::{ContextKind, Delivery, RequestType};
use crate::error::{Result, XssMapError};

/// Characters accepted in a form-url-encoded POST body.
const FORM_ENCODED_CHARS: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~:/?#[]@!$&'()*+,;=`%";

/// A single injectable request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    /// Index in extraction order; drives request reconstruction.
    #[serde(skip)]
    pub position: usize,
    pub name: String,
    pub value: String,
    pub delivery: Delivery,
    #[serde(rename = "reflect_trigger", skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(rename = "reflect_contexts", skip_serializing_if = "BTreeSet::is_empty")]
    pub reflected_contexts: BTreeSet<ContextKind>,
}

impl Parameter {
    pub fn new(position: usize, name: &str, value: &str, delivery: Delivery) -> Self {
        Self {
            position,
            name: name.to_string(),
            value: value.to_string(),
            delivery,
            trigger: None,
            reflected_contexts: BTreeSet::new(),
        }
    }
}

/// The request under assessment plus the two parameter collections.
///
/// A parameter lives in exactly one of `params_other` / `params_reflected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub request_type: RequestType,
    pub root_url: String,
    pub body: Option<String>,
    pub params_other: Vec<Parameter>,
    pub params_reflected: Vec<Parameter>,
}

impl RequestDescriptor {
    pub fn new(request_type: RequestType, root_url: &str, body: Option<&str>) -> Self {
        Self {
            request_type,
            root_url: root_url.to_string(),
            body: body.map(|b| b.to_string()),
            params_other: Vec::new(),
            params_reflected: Vec::new(),
        }
    }

    pub fn param_count(&self) -> usize {
        self.params_other.len() + self.params_reflected.len()
    }

    /// All known parameters, reflected or not, in original request order.
    pub fn params_in_order(&self) -> Vec<&Parameter> {
        let mut all: Vec<&Parameter> = self
            .params_other
            .iter()
            .chain(self.params_reflected.iter())
            .collect();
        all.sort_by_key(|p| p.position);
        all
    }

    /// Moves every parameter into `params_reflected` with the wildcard
    /// `general` context, for scanning without a reflection check.
    pub fn into_wildcard(self) -> Self {
        let mut params: Vec<Parameter> = self
            .params_other
            .into_iter()
            .chain(self.params_reflected)
            .collect();
        params.sort_by_key(|p| p.position);
        for param in &mut params {
            param.reflected_contexts = BTreeSet::from([ContextKind::General]);
        }
        Self {
            request_type: self.request_type,
            root_url: self.root_url,
            body: self.body,
            params_other: Vec::new(),
            params_reflected: params,
        }
    }

    /// Rebuilds the request URL and body, asking `value_for` for each
    /// parameter's value.
    ///
    /// GET requests carry every parameter in the query string. POST requests
    /// split parameters by delivery; the query string is only opened when a
    /// url-delivered parameter exists and an empty body yields `None`.
    pub fn reconstruct<F>(&self, value_for: F) -> (String, Option<String>)
    where
        F: Fn(&Parameter) -> String,
    {
        let params = self.params_in_order();

        let (url_params, body_params): (Vec<&Parameter>, Vec<&Parameter>) = match self.request_type {
            RequestType::Get => (params, Vec::new()),
            RequestType::Post => params.into_iter().partition(|p| p.delivery == Delivery::Url),
        };

        let mut url = self.root_url.clone();
        let query = join_pairs(&url_params, &value_for);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let body = join_pairs(&body_params, &value_for);
        let body = if body.is_empty() { None } else { Some(body) };

        (url, body)
    }
}

fn join_pairs<F>(params: &[&Parameter], value_for: &F) -> String
where
    F: Fn(&Parameter) -> String,
{
    let mut out = String::new();
    for param in params {
        out.push_str(&param.name);
        out.push('=');
        out.push_str(&value_for(param));
        out.push('&');
    }
    while out.ends_with('&') {
        out.pop();
    }
    out
}

/// Checks a target before any network activity.
pub fn validate_request(request_type: RequestType, url: &str, body: Option<&str>) -> Result<()> {
    // "http://" alone is 7 chars
    if url.len() < 7 {
        return Err(XssMapError::Validation(format!(
            "The provided {} request URL is too short: {}",
            request_type, url
        )));
    }

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(XssMapError::Validation(format!(
            "The provided {} request URL must start with http:// or https://: {}",
            request_type, url
        )));
    }

    if request_type == RequestType::Post {
        let body = body.unwrap_or("");
        if let Some(bad) = body.chars().find(|c| !FORM_ENCODED_CHARS.contains(*c)) {
            return Err(XssMapError::Validation(format!(
                "The provided POST body is not form-url-encoded (found {:?}):\n\tURL: {}\n\tBody: {}",
                bad, url, body
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_descriptor() -> RequestDescriptor {
        let mut d = RequestDescriptor::new(RequestType::Post, "http://s/f", Some("user=joe&pass=x"));
        d.params_other = vec![
            Parameter::new(0, "q", "1", Delivery::Url),
            Parameter::new(1, "user", "joe", Delivery::Body),
            Parameter::new(2, "pass", "x", Delivery::Body),
        ];
        d
    }

    #[test]
    fn test_validate_accepts_http_and_https() {
        assert!(validate_request(RequestType::Get, "http://site/x?a=1", None).is_ok());
        assert!(validate_request(RequestType::Get, "https://site/x", None).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_or_schemeless_urls() {
        assert!(matches!(
            validate_request(RequestType::Get, "http:/", None),
            Err(XssMapError::Validation(_))
        ));
        assert!(matches!(
            validate_request(RequestType::Get, "ftp://site/file", None),
            Err(XssMapError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_form_encoded_body() {
        assert!(validate_request(RequestType::Post, "http://s/f", Some("a=1&b=%20x")).is_ok());
        assert!(matches!(
            validate_request(RequestType::Post, "http://s/f", Some("{\"a\": 1}")),
            Err(XssMapError::Validation(_))
        ));
    }

    #[test]
    fn test_reconstruct_post_splits_by_delivery() {
        let d = post_descriptor();
        let (url, body) = d.reconstruct(|p| p.value.clone());
        assert_eq!(url, "http://s/f?q=1");
        assert_eq!(body.as_deref(), Some("user=joe&pass=x"));
    }

    #[test]
    fn test_reconstruct_post_without_url_params_has_no_question_mark() {
        let mut d = post_descriptor();
        d.params_other.remove(0);
        let (url, body) = d.reconstruct(|p| p.value.clone());
        assert_eq!(url, "http://s/f");
        assert_eq!(body.as_deref(), Some("user=joe&pass=x"));
    }

    #[test]
    fn test_reconstruct_preserves_order_across_collections() {
        let mut d = RequestDescriptor::new(RequestType::Get, "http://site/x", None);
        let a = Parameter::new(0, "a", "1", Delivery::Url);
        let b = Parameter::new(1, "b", "2", Delivery::Url);
        let c = Parameter::new(2, "c", "3", Delivery::Url);
        d.params_reflected = vec![b];
        d.params_other = vec![a, c];

        let (url, body) = d.reconstruct(|p| p.value.clone());
        assert_eq!(url, "http://site/x?a=1&b=2&c=3");
        assert!(body.is_none());
    }

    #[test]
    fn test_reconstruct_without_params_leaves_root_untouched() {
        let d = RequestDescriptor::new(RequestType::Get, "http://site/x", None);
        let (url, body) = d.reconstruct(|p| p.value.clone());
        assert_eq!(url, "http://site/x");
        assert!(body.is_none());
    }

    #[test]
    fn test_into_wildcard_moves_everything_to_general() {
        let d = post_descriptor().into_wildcard();
        assert!(d.params_other.is_empty());
        assert_eq!(d.params_reflected.len(), 3);
        for p in &d.params_reflected {
            assert_eq!(p.reflected_contexts, BTreeSet::from([ContextKind::General]));
        }
    }

    #[test]
    fn test_parameter_serializes_with_reflection_keys() {
        let mut p = Parameter::new(0, "a", "1", Delivery::Url);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!({"name": "a", "value": "1", "delivery": "url"}));

        p.trigger = Some("abcdefghi".to_string());
        p.reflected_contexts.insert(ContextKind::Text);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["reflect_trigger"], "abcdefghi");
        assert_eq!(json["reflect_contexts"], serde_json::json!(["text"]));
    }
}
