//! keyseries HTTP client
//!
//! Thin reqwest wrapper over the REST API. Implements [`SeriesSource`] so
//! cursors can page a remote store exactly like a local one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::api::dto::{HealthResponse, KeyDto, KeysResponse, SeriesResponse, WriteResponse};
use crate::api::error::ErrorResponse;
use crate::cursor::{CursorError, SeriesSource};
use crate::storage::{Entry, Envelope, KeyPath};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server (e.g., "http://localhost:8082")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Attempts for writes rejected as unavailable
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            request_timeout_ms: 5000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Server unreachable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Unavailable | ClientError::Timeout => true,
            ClientError::Api { status, .. } => *status == 503,
            ClientError::Request(_) => false,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_connect() {
            ClientError::Unavailable
        } else {
            ClientError::Request(e)
        }
    }
}

/// REST client for a keyseries server
pub struct RemoteClient {
    client: Client,
    config: ClientConfig,
}

impl RemoteClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    /// Client with default settings for `base_url`
    pub fn connect(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(ClientConfig {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.config.base_url, route)
    }

    /// Apply one envelope, retrying while the store reports itself unavailable
    pub async fn write(&self, envelope: &Envelope) -> Result<WriteResponse, ClientError> {
        let url = self.url("/api/v1/write");
        let mut attempt = 0;

        loop {
            let result = match self.client.post(&url).json(envelope).send().await {
                Ok(response) => decode(response).await,
                Err(e) => Err(ClientError::from_reqwest(e)),
            };

            match result {
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_retries => {
                    attempt += 1;
                    // 1s, 4s, 9s...
                    let delay = Duration::from_secs(u64::from(attempt).pow(2));
                    tracing::warn!(error = %e, attempt, "Write failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Direct children of `path`
    pub async fn keys(&self, path: &KeyPath) -> Result<Vec<KeyDto>, ClientError> {
        let response: KeysResponse = self
            .get("/api/v1/keys", &[("path", path.to_string())])
            .await?;
        Ok(response.keys)
    }

    pub async fn series_between(
        &self,
        path: &KeyPath,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Entry>, ClientError> {
        let response: SeriesResponse = self
            .get(
                "/api/v1/series",
                &[
                    ("path", path.to_string()),
                    ("start", start.to_rfc3339()),
                    ("end", end.to_rfc3339()),
                ],
            )
            .await?;
        Ok(response.entries)
    }

    pub async fn series_at(
        &self,
        path: &KeyPath,
        start: u64,
        end: u64,
    ) -> Result<Vec<Entry>, ClientError> {
        let response: SeriesResponse = self
            .get(
                "/api/v1/series/index",
                &[
                    ("path", path.to_string()),
                    ("start", start.to_string()),
                    ("end", end.to_string()),
                ],
            )
            .await?;
        Ok(response.entries)
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get("/health", &[]).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .get(self.url(route))
            .query(query)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => (body.error.code, body.error.message),
        Err(_) => (String::new(), text),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

#[async_trait]
impl SeriesSource for RemoteClient {
    async fn entries_between(
        &self,
        path: &KeyPath,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Entry>, CursorError> {
        self.series_between(path, start, end)
            .await
            .map_err(|e| CursorError::Remote(e.to_string()))
    }

    async fn entries_at(
        &self,
        path: &KeyPath,
        start: u64,
        end: u64,
    ) -> Result<Vec<Entry>, CursorError> {
        self.series_at(path, start, end)
            .await
            .map_err(|e| CursorError::Remote(e.to_string()))
    }
}
