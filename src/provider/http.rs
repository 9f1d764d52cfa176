//! Shared HTTP client and auth header helpers.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::QuillError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No request timeout is set here: streamed responses are open-ended and
/// timeouts are left to the caller.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Build Anthropic-style headers (`x-api-key` + `anthropic-version`).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Map a non-2xx HTTP status into a structured error carrying status+body.
pub fn status_to_error(status: u16, body: &str) -> QuillError {
    match status {
        401 | 403 => QuillError::Authentication(body.to_string()),
        _ => QuillError::api(status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_headers_carry_key_and_version() {
        let headers = anthropic_headers("sk-test", "2023-06-01");
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-test");
        assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
    }

    #[test]
    fn bearer_headers_prefix_token() {
        let headers = bearer_headers("sk-test");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
    }

    #[test]
    fn auth_statuses_map_to_authentication() {
        assert!(matches!(
            status_to_error(401, "nope"),
            QuillError::Authentication(_)
        ));
        assert!(matches!(
            status_to_error(500, "boom"),
            QuillError::Api { status: 500, .. }
        ));
    }
}
