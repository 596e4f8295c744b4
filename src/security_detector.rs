use crate::host::Headers;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Swagger security definition for a header-borne API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScheme {
    /// Always `apiKey` for detected schemes
    #[serde(rename = "type")]
    pub scheme_type: String,
    /// Lowercased header name
    pub name: String,
    /// Always `header` for detected schemes
    #[serde(rename = "in")]
    pub location: String,
}

impl SecurityScheme {
    pub fn api_key_header(name: &str) -> Self {
        Self {
            scheme_type: "apiKey".to_string(),
            name: name.to_ascii_lowercase(),
            location: "header".to_string(),
        }
    }
}

/// Security schemes found on one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// Scheme names carried by this request, in header order
    pub schemes: Vec<String>,
    /// Schemes not present in the known definitions yet
    pub new_schemes: Vec<(String, SecurityScheme)>,
}

/// Whether a header name follows a security convention
/// (`Authorization*` or any `X-*` header).
pub fn is_security_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("authorization") || name.starts_with("x-")
}

/// Classifies request headers into convention-based `apiKey` schemes.
pub fn detect(headers: &Headers, known: &BTreeMap<String, SecurityScheme>) -> Detection {
    let mut detection = Detection::default();

    for name in headers.keys().filter(|name| is_security_header(name)) {
        let scheme_name = name.to_ascii_lowercase();
        if detection.schemes.contains(&scheme_name) {
            continue;
        }
        if !known.contains_key(&scheme_name) {
            detection
                .new_schemes
                .push((scheme_name.clone(), SecurityScheme::api_key_header(&scheme_name)));
        }
        detection.schemes.push(scheme_name);
    }

    detection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_detects_authorization_and_custom_headers() {
        let detection = detect(
            &headers(&[
                ("Authorization", "Bearer X"),
                ("X-Header", "Y"),
                ("Accept", "*/*"),
                ("Content-Type", "application/json"),
            ]),
            &BTreeMap::new(),
        );

        assert_eq!(detection.schemes, vec!["authorization", "x-header"]);
        assert_eq!(detection.new_schemes.len(), 2);
        assert_eq!(
            detection.new_schemes[1].1,
            SecurityScheme {
                scheme_type: "apiKey".to_string(),
                name: "x-header".to_string(),
                location: "header".to_string(),
            }
        );
    }

    #[test]
    fn test_known_schemes_are_not_new() {
        let mut known = BTreeMap::new();
        known.insert(
            "authorization".to_string(),
            SecurityScheme::api_key_header("authorization"),
        );

        let detection = detect(&headers(&[("authorization", "Bearer X")]), &known);
        assert_eq!(detection.schemes, vec!["authorization"]);
        assert!(detection.new_schemes.is_empty());
    }

    #[test]
    fn test_case_variants_are_deduplicated() {
        let detection = detect(
            &headers(&[("Authorization", "a"), ("authorization", "b")]),
            &BTreeMap::new(),
        );
        assert_eq!(detection.schemes, vec!["authorization"]);
        assert_eq!(detection.new_schemes.len(), 1);
    }

    #[test]
    fn test_no_security_headers() {
        let detection = detect(&headers(&[("host", "localhost")]), &BTreeMap::new());
        assert_eq!(detection, Detection::default());
    }

    #[test]
    fn test_is_security_header() {
        assert!(is_security_header("AUTHORIZATION"));
        assert!(is_security_header("Authorization-Token"));
        assert!(is_security_header("x-api-key"));
        assert!(!is_security_header("proxy-authorization"));
        assert!(!is_security_header("xylophone"));
    }
}
