//! Edge HTTP Adapter
//!
//! Implements the `L3Client` port against an edge/CDN object API:
//!
//! - `GET|PUT|DELETE {endpoint}/objects/{key}`
//! - `POST {endpoint}/purge` with `{"pattern": "..."}`
//! - `GET {endpoint}/health`
//!
//! Requests carry `Authorization: Bearer <api_key>` when a key is configured.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::config::L3Config;
use crate::domain::ports::L3Client;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct PurgeRequest<'a> {
    pattern: &'a str,
}

#[derive(Debug, Deserialize)]
struct PurgeResponse {
    #[serde(default)]
    purged: u64,
}

/// HTTP client for the edge object API
pub struct EdgeHttpClient {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl EdgeHttpClient {
    /// Create a new edge client
    pub fn new(config: &L3Config) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::Config("L3 endpoint is empty".into()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    /// URL of one object
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.endpoint, urlencoding::encode(key))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(AUTHORIZATION, format!("Bearer {}", key)),
            None => request,
        }
    }
}

fn status_error(operation: &'static str, status: StatusCode) -> Error {
    Error::EdgeStatus {
        operation,
        status: status.as_u16(),
    }
}

#[async_trait]
impl L3Client for EdgeHttpClient {
    fn name(&self) -> &'static str {
        "edge-http"
    }

    #[instrument(skip(self))]
    async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.endpoint);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(Error::EdgeRequest)?;
        Ok(response.status().is_success())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let response = self
            .authorized(self.client.get(self.object_url(key)))
            .send()
            .await
            .map_err(Error::EdgeRequest)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await.map_err(Error::EdgeRequest)?;
                Ok(Some(body))
            }
            status => Err(status_error("get", status)),
        }
    }

    #[instrument(skip(self, value), fields(size = value.len()))]
    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let response = self
            .authorized(self.client.put(self.object_url(key)))
            .header(CACHE_CONTROL, format!("public, max-age={}", ttl.as_secs()))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(value)
            .send()
            .await
            .map_err(Error::EdgeRequest)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error("put", status))
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<bool> {
        let response = self
            .authorized(self.client.delete(self.object_url(key)))
            .send()
            .await
            .map_err(Error::EdgeRequest)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(status_error("delete", status)),
        }
    }

    #[instrument(skip(self))]
    async fn purge(&self, pattern: &str) -> Result<u64> {
        let url = format!("{}/purge", self.endpoint);
        let response = self
            .authorized(self.client.post(&url))
            .json(&PurgeRequest { pattern })
            .send()
            .await
            .map_err(Error::EdgeRequest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("purge", status));
        }

        let body = response.bytes().await.map_err(Error::EdgeRequest)?;
        let purged = if body.is_empty() {
            0
        } else {
            serde_json::from_slice::<PurgeResponse>(&body)?.purged
        };
        debug!(pattern, purged, "Edge purge complete");
        Ok(purged)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(endpoint: &str) -> L3Config {
        L3Config {
            enabled: true,
            endpoint: endpoint.to_string(),
            api_key: Some("token-123".into()),
            ..Default::default()
        }
    }

    /// Serve one canned response per connection; reports each request head
    async fn spawn_responder(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut raw = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&chunk[..n]);
                    if let Some(head_end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8_lossy(&raw[..head_end]).to_lowercase();
                        let content_length = head
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if raw.len() >= head_end + 4 + content_length {
                            break;
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
                let response = format!(
                    "{}\r\ncontent-length: {}\r\ncontent-type: application/json\r\nconnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (addr, rx)
    }

    #[test]
    fn test_object_url_encodes_key() {
        let client = EdgeHttpClient::new(&config("https://edge.example.com/")).unwrap();
        assert_eq!(
            client.object_url("static_asset:ab/c d"),
            "https://edge.example.com/objects/static_asset%3Aab%2Fc%20d"
        );
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(EdgeHttpClient::new(&config("  ")).is_err());
    }

    #[tokio::test]
    async fn test_get_hit_and_auth_header() {
        let (addr, mut requests) = spawn_responder("HTTP/1.1 200 OK", "payload").await;
        let client = EdgeHttpClient::new(&config(&addr)).unwrap();

        let value = client.get("model_artifact:abc").await.unwrap();
        assert_eq!(value, Some(Bytes::from_static(b"payload")));

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("GET /objects/model_artifact%3Aabc"));
        assert!(request.to_lowercase().contains("authorization: bearer token-123"));
    }

    #[tokio::test]
    async fn test_get_not_found_is_miss() {
        let (addr, _requests) = spawn_responder("HTTP/1.1 404 Not Found", "").await;
        let client = EdgeHttpClient::new(&config(&addr)).unwrap();
        assert_eq!(client.get("static_asset:x").await.unwrap(), None);
        assert!(!client.delete("static_asset:x").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_sets_cache_control() {
        let (addr, mut requests) = spawn_responder("HTTP/1.1 201 Created", "").await;
        let client = EdgeHttpClient::new(&config(&addr)).unwrap();

        client
            .put("static_asset:logo", Bytes::from_static(b"png"), Duration::from_secs(3600))
            .await
            .unwrap();

        let request = requests.recv().await.unwrap().to_lowercase();
        assert!(request.starts_with("put /objects/static_asset%3alogo"));
        assert!(request.contains("cache-control: public, max-age=3600"));
    }

    #[tokio::test]
    async fn test_purge_reports_count() {
        let (addr, mut requests) = spawn_responder("HTTP/1.1 200 OK", r#"{"purged": 12}"#).await;
        let client = EdgeHttpClient::new(&config(&addr)).unwrap();

        assert_eq!(client.purge("static_asset:*").await.unwrap(), 12);
        let request = requests.recv().await.unwrap();
        assert!(request.contains(r#"{"pattern":"static_asset:*"}"#));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let (addr, _requests) = spawn_responder("HTTP/1.1 503 Service Unavailable", "").await;
        let client = EdgeHttpClient::new(&config(&addr)).unwrap();

        assert!(!client.health().await.unwrap());
        let err = client.get("static_asset:x").await.unwrap_err();
        assert!(matches!(err, Error::EdgeStatus { operation: "get", status: 503 }));
    }
}
