//! HTTP relay client for the `http.v1` rendezvous transport.
//!
//! The relay exposes each rendezvous as a single resource with an `ETag`:
//!
//! | request  | success            | meaning of other statuses          |
//! |----------|--------------------|------------------------------------|
//! | `POST`   | `201` + `Location` |                                    |
//! | `PUT`    | `202`              | `412` concurrent write             |
//! | `GET`    | `200`              | `304` nothing new, poll again      |
//! | `DELETE` | `204`              |                                    |
//!
//! `404` and `410` on any request mean the rendezvous expired.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH, LOCATION};
use reqwest::StatusCode;
use url::Url;

use super::RendezvousTransport;
use crate::{RendezvousConfig, RendezvousError, Result};

/// Reqwest-backed `http.v1` transport.
pub struct HttpRendezvousTransport {
    client: reqwest::Client,
    poll_interval: Duration,
    request_timeout: Duration,
    etags: Mutex<HashMap<Url, String>>,
}

impl HttpRendezvousTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: &RendezvousConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RendezvousError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            poll_interval: config.poll_interval(),
            request_timeout: config.request_timeout(),
            etags: Mutex::new(HashMap::new()),
        })
    }

    fn etags(&self) -> MutexGuard<'_, HashMap<Url, String>> {
        self.etags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn known_etag(&self, uri: &Url) -> Option<String> {
        self.etags().get(uri).cloned()
    }

    fn remember_etag(&self, uri: &Url, headers: &HeaderMap) {
        if let Some(etag) = headers.get(ETAG).and_then(|v| v.to_str().ok()) {
            self.etags().insert(uri.clone(), etag.to_string());
        }
    }

    fn map_reqwest_error(&self, operation: &str, uri: &Url, err: reqwest::Error) -> RendezvousError {
        if err.is_timeout() {
            RendezvousError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else if err.is_connect() {
            RendezvousError::ConnectionFailed {
                target: uri.to_string(),
                reason: err.to_string(),
            }
        } else {
            RendezvousError::transport(err)
        }
    }

    fn map_status_error(&self, operation: &str, uri: &Url, status: StatusCode) -> RendezvousError {
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => RendezvousError::Expired(uri.to_string()),
            StatusCode::PRECONDITION_FAILED => RendezvousError::Conflict(uri.to_string()),
            _ => RendezvousError::Transport(format!(
                "{} {} returned unexpected status {}",
                operation, uri, status
            )),
        }
    }
}

#[async_trait]
impl RendezvousTransport for HttpRendezvousTransport {
    #[tracing::instrument(skip(self, body), fields(body_len = body.len()))]
    async fn create(&self, relay_base: &Url, body: Vec<u8>) -> Result<Url> {
        let response = self
            .client
            .post(relay_base.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error("create", relay_base, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.map_status_error("POST", relay_base, status));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RendezvousError::invalid_data("Location", "missing from create response"))?;
        let uri = relay_base
            .join(location)
            .map_err(|e| RendezvousError::invalid_data("Location", e.to_string()))?;

        self.remember_etag(&uri, response.headers());
        tracing::debug!(%uri, "created rendezvous");
        Ok(uri)
    }

    #[tracing::instrument(skip(self, body), fields(body_len = body.len()))]
    async fn put(&self, uri: &Url, body: Vec<u8>) -> Result<()> {
        let mut request = self
            .client
            .put(uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(etag) = self.known_etag(uri) {
            request = request.header(IF_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_reqwest_error("put", uri, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.map_status_error("PUT", uri, status));
        }
        self.remember_etag(uri, response.headers());
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, uri: &Url) -> Result<Vec<u8>> {
        loop {
            let mut request = self.client.get(uri.clone());
            if let Some(etag) = self.known_etag(uri) {
                request = request.header(IF_NONE_MATCH, etag);
            }

            let response = request
                .send()
                .await
                .map_err(|e| self.map_reqwest_error("get", uri, e))?;

            let status = response.status();
            if status == StatusCode::NOT_MODIFIED {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            if !status.is_success() {
                return Err(self.map_status_error("GET", uri, status));
            }

            self.remember_etag(uri, response.headers());
            let body = response
                .bytes()
                .await
                .map_err(|e| self.map_reqwest_error("get", uri, e))?;

            // A freshly created resource may still be empty.
            if body.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            return Ok(body.to_vec());
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, uri: &Url) -> Result<()> {
        self.etags().remove(uri);

        let response = self
            .client
            .delete(uri.clone())
            .send()
            .await
            .map_err(|e| self.map_reqwest_error("delete", uri, e))?;

        let status = response.status();
        if status.is_success() || matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            Ok(())
        } else {
            Err(self.map_status_error("DELETE", uri, status))
        }
    }
}
