use async_trait::async_trait;
use std::time::Duration;

use crate::domain::DomainError;
use crate::domain::fetch::{HttpMethod, HttpResponse, RestRequest};

/// Trait for HTTP client operations (for mocking)
///
/// Any response that arrives is returned with its status, including 429 and
/// 5xx; only transport-level failures are errors.
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn send(&self, url: &str, request: &RestRequest) -> Result<HttpResponse, DomainError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn send(&self, url: &str, request: &RestRequest) -> Result<HttpResponse, DomainError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DomainError::upstream(url, format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DomainError::upstream(url, format!("Failed to read body: {}", e)))?;

        Ok(HttpResponse::new(status, body))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"height": 42})))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let response = client
            .send(&format!("{}/status", server.uri()), &RestRequest::get())
            .await
            .unwrap();

        assert!(response.is_success());
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["height"], 42);
    }

    #[tokio::test]
    async fn test_post_sends_json_body_and_headers() {
        let server = MockServer::start().await;
        let request = RestRequest::json_rpc("status", json!([])).with_header("x-api-key", "k");

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-api-key", "k"))
            .and(body_json(request.body.clone().unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let response = HttpClient::new()
            .send(&format!("{}/", server.uri()), &request)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_rate_limit_is_a_status_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let response = HttpClient::new()
            .send(&server.uri(), &RestRequest::get())
            .await
            .unwrap();

        assert!(response.is_rate_limited());
        assert!(!response.is_success());
        assert_eq!(response.body, "slow down");
    }

    #[tokio::test]
    async fn test_server_error_is_a_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let response = HttpClient::new()
            .send(&server.uri(), &RestRequest::get())
            .await
            .unwrap();

        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_connection_failure_is_upstream_error() {
        let client = HttpClient::with_timeout(Duration::from_secs(1)).unwrap();
        let result = client
            .send("http://127.0.0.1:1/status", &RestRequest::get())
            .await;

        assert!(matches!(result, Err(DomainError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpClient::with_timeout(Duration::from_millis(50)).unwrap();
        let result = client.send(&server.uri(), &RestRequest::get()).await;

        assert!(matches!(result, Err(DomainError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_mock_replays_script_then_repeats_last() {
        let client = mock::MockHttpClient::new()
            .with_status("http://node", 503)
            .with_json("http://node", json!({"ok": true}));

        let first = client.send("http://node", &RestRequest::get()).await.unwrap();
        let second = client.send("http://node", &RestRequest::get()).await.unwrap();
        let third = client.send("http://node", &RestRequest::get()).await.unwrap();

        assert_eq!(first.status, 503);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(client.calls_to("http://node"), 3);
        assert!(client.send("http://other", &RestRequest::get()).await.is_err());
    }
}
