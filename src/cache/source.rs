//! Backing content source for the cache.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::CacheError;

/// Result of a successful round trip to the content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResponse {
    /// Status OK with the raw JSON body
    Content(String),
    /// Status No Content; nothing to replace the cache with
    NoContent,
}

/// Where cached collections are fetched from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, endpoint: &str) -> Result<FetchResponse, CacheError>;
}

/// Fetches collections from the site backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpContentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch(&self, endpoint: &str) -> Result<FetchResponse, CacheError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                CacheError::Transport(format!("request to {} timed out", url))
            } else {
                CacheError::Transport(e.to_string())
            }
        })?;

        match resp.status() {
            StatusCode::OK => {
                let body = resp
                    .text()
                    .await
                    .map_err(|e| CacheError::Transport(e.to_string()))?;
                Ok(FetchResponse::Content(body))
            }
            StatusCode::NO_CONTENT => Ok(FetchResponse::NoContent),
            status => Err(CacheError::Transport(format!(
                "{} answered with status {}",
                url, status
            ))),
        }
    }
}
