//! The HTTP transport (C9): the three network calls the List Service
//! protocol needs, abstracted behind a trait so the engine and resolver are
//! testable without a network.

use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use patrol_core::PatrolConfig;

use crate::error::TransportError;

/// Response from a `downloads`/`gethash` POST.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The three network operations in §6, mirrored 1:1. A plain trait, not a
/// trait object: exactly one implementation is selected at construction.
pub trait Transport: Send + Sync {
    fn post_downloads(&self, body: Vec<u8>) -> impl std::future::Future<Output = Result<TransportResponse, TransportError>> + Send;
    fn get_redirect(&self, url: &str) -> impl std::future::Future<Output = Result<Bytes, TransportError>> + Send;
    fn post_gethash(&self, body: Vec<u8>) -> impl std::future::Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// `reqwest`-backed reference implementation. TLS certificate verification
/// is never disabled; the timeout and `User-Agent` come from configuration.
pub struct HttpTransport {
    client: reqwest::Client,
    downloads_url: String,
    gethash_url: String,
}

impl HttpTransport {
    pub fn new(config: &PatrolConfig, client_name: &str, client_version: &str) -> Result<Self, TransportError> {
        let user_agent = config.user_agent_or_default(client_name, client_version);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let server = config.server.trim_end_matches('/');
        let query = format!("client=api&key={}&appver={}&pver={}", config.key, client_version, config.version);
        Ok(Self {
            client,
            downloads_url: format!("{server}/downloads?{query}"),
            gethash_url: format!("{server}/gethash?{query}"),
        })
    }
}

impl Transport for HttpTransport {
    async fn post_downloads(&self, body: Vec<u8>) -> Result<TransportResponse, TransportError> {
        post(&self.client, &self.downloads_url, body).await
    }

    async fn get_redirect(&self, url: &str) -> Result<Bytes, TransportError> {
        let full_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };
        let resp = self
            .client
            .get(&full_url)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        resp.bytes().await.map_err(map_reqwest_err)
    }

    async fn post_gethash(&self, body: Vec<u8>) -> Result<TransportResponse, TransportError> {
        post(&self.client, &self.gethash_url, body).await
    }
}

async fn post(client: &reqwest::Client, url: &str, body: Vec<u8>) -> Result<TransportResponse, TransportError> {
    let resp = client.post(url).body(body).send().await.map_err(map_reqwest_err)?;
    let status = resp.status().as_u16();
    let body = resp.bytes().await.map_err(map_reqwest_err)?;
    Ok(TransportResponse { status, body })
}

fn map_reqwest_err(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

/// An in-memory transport that replays canned responses, for tests. Each
/// call consumes the next queued response for that operation; an exhausted
/// queue returns `Err`, which surfaces test setup mistakes immediately
/// rather than producing a confusing downstream failure.
pub struct CannedTransport {
    downloads: Mutex<Vec<TransportResponse>>,
    redirects: Mutex<Vec<(String, Bytes)>>,
    gethash: Mutex<Vec<TransportResponse>>,
}

impl CannedTransport {
    pub fn new() -> Self {
        Self {
            downloads: Mutex::new(Vec::new()),
            redirects: Mutex::new(Vec::new()),
            gethash: Mutex::new(Vec::new()),
        }
    }

    pub fn push_downloads(&self, status: u16, body: impl Into<Bytes>) {
        self.downloads.lock().unwrap().push(TransportResponse { status, body: body.into() });
    }

    pub fn push_redirect(&self, url: &str, body: impl Into<Bytes>) {
        self.redirects.lock().unwrap().push((url.to_string(), body.into()));
    }

    pub fn push_gethash(&self, status: u16, body: impl Into<Bytes>) {
        self.gethash.lock().unwrap().push(TransportResponse { status, body: body.into() });
    }
}

impl Default for CannedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for CannedTransport {
    async fn post_downloads(&self, _body: Vec<u8>) -> Result<TransportResponse, TransportError> {
        self.downloads
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| TransportError::Request("no canned downloads response queued".to_string()))
    }

    async fn get_redirect(&self, url: &str) -> Result<Bytes, TransportError> {
        let mut redirects = self.redirects.lock().unwrap();
        let idx = redirects
            .iter()
            .position(|(u, _)| u == url)
            .ok_or_else(|| TransportError::Request(format!("no canned redirect for {url:?}")))?;
        Ok(redirects.remove(idx).1)
    }

    async fn post_gethash(&self, _body: Vec<u8>) -> Result<TransportResponse, TransportError> {
        self.gethash
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| TransportError::Request("no canned gethash response queued".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canned_transport_replays_queued_downloads() {
        let transport = CannedTransport::new();
        transport.push_downloads(200, Bytes::from_static(b"n:30\n"));
        let resp = transport.post_downloads(Vec::new()).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.body, Bytes::from_static(b"n:30\n"));
    }

    #[tokio::test]
    async fn canned_transport_matches_redirect_by_url() {
        let transport = CannedTransport::new();
        transport.push_redirect("cache.example/chunks", Bytes::from_static(b"\x01\x02"));
        let body = transport.get_redirect("cache.example/chunks").await.unwrap();
        assert_eq!(body, Bytes::from_static(b"\x01\x02"));
    }
}
