//! Upstream JSON API client.

use std::time::Instant;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::UpstreamSettings;

use super::error::InfraError;

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream responded with status {status}")]
    Status { status: StatusCode, body: String },
    #[error("upstream body is not json: {0}")]
    InvalidBody(#[source] serde_json::Error),
}

impl UpstreamError {
    /// Upstream statuses that are the client's fault and pass through as-is.
    pub fn client_status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } if status.is_client_error() => Some(*status),
            _ => None,
        }
    }
}

/// The data source behind the cached routes.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch one resource. Only 2xx JSON responses are `Ok`.
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

pub struct HttpUpstream {
    client: Client,
    base: Url,
}

impl HttpUpstream {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            base: settings.base_url.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("cachegate/", env!("CARGO_PKG_VERSION"))
    }

    /// Append the request path to the base URL, keeping any base path prefix.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> Result<Url, UpstreamError> {
        let base = self.base.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{path}"))?;
        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(&request.path, request.query.as_deref())?;
        let started = Instant::now();

        let mut builder = self.client.request(request.method, url.clone());
        if !request.body.is_empty() {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let elapsed = started.elapsed();
        debug!(
            target = "cachegate::upstream",
            url = %url,
            status = status.as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "upstream responded"
        );

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let body = serde_json::from_slice(&bytes).map_err(UpstreamError::InvalidBody)?;
        Ok(UpstreamResponse { status, body })
    }
}
