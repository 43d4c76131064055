//! Authenticated JSON-over-HTTP client shared by the HubSpot and Notion adapters.
//!
//! Calls are never retried: a transport error or a non-success status is
//! surfaced to the caller as a [`RemoteError`] on the first attempt.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

pub const CRATE_NAME: &str = "dealsync-http";

/// Longest response body excerpt kept on an HTTP status error.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub max_in_flight: usize,
    pub default_headers: Vec<(String, String)>,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
            timeout: Some(Duration::from_secs(30)),
            user_agent: None,
            max_in_flight: 16,
            default_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {method} {url}: {body}")]
    HttpStatus {
        status: u16,
        method: String,
        url: String,
        body: String,
    },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("http client closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    in_flight: Arc<Semaphore>,
}

impl ApiClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.bearer_token))
            .context("bearer token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name {name}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        self.send::<(), T>(Method::GET, path, query, None).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn patch_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        self.send(Method::PATCH, path, &[], Some(body)).await
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, RemoteError> {
        let url = self.url_for(path);
        let span = info_span!("http_call", %method, url = %url);

        async {
            let _permit = self
                .in_flight
                .acquire()
                .await
                .map_err(|_| RemoteError::Closed)?;

            let mut request = self.client.request(method.clone(), &url);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let resp = request.send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            let bytes = resp.bytes().await?;
            debug!(status = status.as_u16(), bytes = bytes.len(), "response received");

            if !status.is_success() {
                let mut body = String::from_utf8_lossy(&bytes).into_owned();
                if body.len() > ERROR_BODY_LIMIT {
                    let mut cut = ERROR_BODY_LIMIT;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                return Err(RemoteError::HttpStatus {
                    status: status.as_u16(),
                    method: method.to_string(),
                    url: final_url,
                    body,
                });
            }

            serde_json::from_slice(&bytes).map_err(|source| RemoteError::Decode {
                url: final_url,
                source,
            })
        }
        .instrument(span)
        .await
    }
}
