//! Outbound request and response shapes

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::cache::CacheKey;
use crate::domain::DomainError;

/// HTTP method for an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Request options for an outbound REST/RPC call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestRequest {
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            body: Some(body),
        }
    }

    /// Builds a JSON-RPC 2.0 call
    pub fn json_rpc(method: &str, params: Value) -> Self {
        Self::post(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Identity of the outbound call used for in-flight sharing
    ///
    /// A body-less GET without headers is identified by its URL alone; calls
    /// with a body also carry the canonical body so distinct RPC calls to one
    /// node never merge. Headers are folded in as a digest, keeping credentials
    /// out of the key.
    pub fn flight_key(&self, url: &str) -> Result<String, DomainError> {
        let base = match (&self.method, &self.body) {
            (HttpMethod::Get, None) => url.to_string(),
            (method, body) => {
                let key = CacheKey::new("body", body)?;
                format!("{} {} {}", method, url, key)
            }
        };

        if self.headers.is_empty() {
            return Ok(base);
        }

        let mut hasher = Sha256::new();
        for (name, value) in &self.headers {
            hasher.update(name.to_ascii_lowercase().as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }

        Ok(format!("{} headers:{}", base, hex::encode(hasher.finalize())))
    }
}

/// Raw response from the transport: status plus body text
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_flight_key_is_url() {
        let key = RestRequest::get().flight_key("http://node/status").unwrap();
        assert_eq!(key, "http://node/status");
    }

    #[test]
    fn test_rpc_flight_keys_differ_by_body() {
        let a = RestRequest::json_rpc("status", json!([]))
            .flight_key("http://node")
            .unwrap();
        let b = RestRequest::json_rpc("block", json!({"height": "10"}))
            .flight_key("http://node")
            .unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with("POST http://node "));
    }

    #[test]
    fn test_rpc_flight_key_ignores_member_order() {
        let a = RestRequest::post(json!({"a": 1, "b": 2}))
            .flight_key("http://node")
            .unwrap();
        let b = RestRequest::post(json!({"b": 2, "a": 1}))
            .flight_key("http://node")
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_flight_keys_differ_by_headers() {
        let url = "http://indexer/v1/balances";
        let alice = RestRequest::get()
            .with_header("Authorization", "Bearer alice")
            .flight_key(url)
            .unwrap();
        let bob = RestRequest::get()
            .with_header("Authorization", "Bearer bob")
            .flight_key(url)
            .unwrap();
        let again = RestRequest::get()
            .with_header("Authorization", "Bearer alice")
            .flight_key(url)
            .unwrap();

        assert_ne!(alice, bob);
        assert_eq!(alice, again);
        assert_ne!(alice, RestRequest::get().flight_key(url).unwrap());
        assert!(!alice.contains("alice"));
    }

    #[test]
    fn test_response_status_classes() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(502, "").is_success());
        assert!(HttpResponse::new(429, "").is_rate_limited());
    }
}
