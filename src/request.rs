//! Read view of the current HTTP request.
//!
//! Assembled by the host once routing has matched a mock definition, then
//! handed read-only to expression evaluators and executing scripts.

use serde::Serialize;
use std::collections::HashMap;

/// Immutable request facts exposed to evaluators and scripts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Path parameters extracted by the host's route matching
    pub path_params: HashMap<String, String>,
    /// Query parameters
    pub query_params: HashMap<String, String>,
    /// Request body (as string, if text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestContext {
    /// Look up a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a query parameter value.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Look up a path parameter value.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut request = RequestContext::default();
        request
            .headers
            .insert("X-Correlation-ID".to_string(), "abc123".to_string());

        assert_eq!(request.header("x-correlation-id"), Some("abc123"));
        assert_eq!(request.header("X-CORRELATION-ID"), Some("abc123"));
        assert_eq!(request.header("X-Other"), None);
    }

    #[test]
    fn test_param_lookup() {
        let mut request = RequestContext::default();
        request
            .path_params
            .insert("id".to_string(), "42".to_string());
        request
            .query_params
            .insert("page".to_string(), "1".to_string());

        assert_eq!(request.path_param("id"), Some("42"));
        assert_eq!(request.query_param("page"), Some("1"));
        assert_eq!(request.query_param("missing"), None);
    }
}
