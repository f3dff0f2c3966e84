use crate::core::request::{Parameter, RequestDescriptor};
use crate::core::{Delivery, RequestType};

/// Splits a request into its injectable parameters.
///
/// URL parameters come first, then (for POST) body parameters, each in
/// source order. Values are taken verbatim; nothing is decoded or re-encoded.
pub fn probe_request(request_type: RequestType, url: &str, body: Option<&str>) -> RequestDescriptor {
    match request_type {
        RequestType::Get => probe_get_request(url),
        RequestType::Post => probe_post_request(url, body.unwrap_or("")),
    }
}

pub fn probe_get_request(url: &str) -> RequestDescriptor {
    let mut descriptor = RequestDescriptor::new(RequestType::Get, root_of(url), None);
    if let Some(query) = query_of(url) {
        descriptor.params_other = split_params(query, Delivery::Url, 0);
    }
    descriptor
}

/// A POST may still carry parameters in its query string.
pub fn probe_post_request(url: &str, body: &str) -> RequestDescriptor {
    let mut descriptor = RequestDescriptor::new(RequestType::Post, root_of(url), Some(body));

    let mut params = match query_of(url) {
        Some(query) => split_params(query, Delivery::Url, 0),
        None => Vec::new(),
    };
    let body_params = split_params(body, Delivery::Body, params.len());
    params.extend(body_params);

    descriptor.params_other = params;
    descriptor
}

fn root_of(url: &str) -> &str {
    url.split_once('?').map(|(root, _)| root).unwrap_or(url)
}

fn query_of(url: &str) -> Option<&str> {
    url.split_once('?').map(|(_, query)| query)
}

/// Splits `a=1&b=2` on `&`, then on the first `=`.
///
/// Empty segments are dropped; a segment without `=` becomes a parameter
/// with an empty value.
fn split_params(raw: &str, delivery: Delivery, first_position: usize) -> Vec<Parameter> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .enumerate()
        .map(|(offset, pair)| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Parameter::new(first_position + offset, name, value, delivery)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_get_extracts_params_in_order() {
        let d = probe_get_request("http://site/x?a=1&b=2&c=3");
        assert_eq!(d.request_type, RequestType::Get);
        assert_eq!(d.root_url, "http://site/x");
        let names: Vec<&str> = d.params_other.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(d.params_other.iter().all(|p| p.delivery == Delivery::Url));
        assert!(d.params_reflected.is_empty());
    }

    #[test]
    fn test_probe_get_splits_on_first_equals_only() {
        let d = probe_get_request("http://site/x?token=abc==&q=a=b");
        assert_eq!(d.params_other[0].value, "abc==");
        assert_eq!(d.params_other[1].name, "q");
        assert_eq!(d.params_other[1].value, "a=b");
    }

    #[test]
    fn test_probe_get_without_query_has_no_params() {
        let d = probe_get_request("http://site/x");
        assert_eq!(d.root_url, "http://site/x");
        assert!(d.params_other.is_empty());
    }

    #[test]
    fn test_probe_post_merges_url_then_body_params() {
        let d = probe_post_request("http://s/f?lang=en", "user=joe&pass=x");
        assert_eq!(d.root_url, "http://s/f");
        assert_eq!(d.body.as_deref(), Some("user=joe&pass=x"));

        let summary: Vec<(&str, Delivery, usize)> = d
            .params_other
            .iter()
            .map(|p| (p.name.as_str(), p.delivery, p.position))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("lang", Delivery::Url, 0),
                ("user", Delivery::Body, 1),
                ("pass", Delivery::Body, 2),
            ]
        );
    }

    #[test]
    fn test_probe_post_body_is_not_decoded() {
        let d = probe_post_request("http://s/f", "q=a%20b+c");
        assert_eq!(d.params_other[0].value, "a%20b+c");
    }

    #[test]
    fn test_probe_request_dispatches_on_type() {
        let d = probe_request(RequestType::Post, "http://s/f", Some("a=1"));
        assert_eq!(d.params_other.len(), 1);
        assert_eq!(d.params_other[0].delivery, Delivery::Body);

        let d = probe_request(RequestType::Get, "http://s/f?a=1", Some("ignored=1"));
        assert_eq!(d.params_other.len(), 1);
        assert_eq!(d.params_other[0].delivery, Delivery::Url);
    }

    #[test]
    fn test_probe_round_trips_through_reconstruct() {
        let url = "http://site/x?a=1&b=2";
        let d = probe_get_request(url);
        let (rebuilt, _) = d.reconstruct(|p| p.value.clone());
        assert_eq!(rebuilt, url);
    }

    #[test]
    fn test_split_tolerates_trailing_and_double_ampersands() {
        let d = probe_get_request("http://site/x?a=1&&b=2&");
        let names: Vec<&str> = d.params_other.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(d.params_other[1].position, 1);
    }
}
