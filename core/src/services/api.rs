//! Authenticated HTTP access to the model platform API

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ApiConfig;
use crate::error::{AgentError, Result};

/// Thin wrapper around `reqwest::Client` carrying host and credentials.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn has_credentials(&self) -> bool {
        self.config.token.is_some() || self.config.api_key.is_some()
    }

    /// `{host}/api/v1/<segments...>`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url: Url = format!("{}/api/v1", self.config.host.trim_end_matches('/'))
            .parse()
            .map_err(|e| AgentError::config(format!("invalid API host {}: {}", self.config.host, e)))?;
        url.path_segments_mut()
            .map_err(|_| AgentError::config(format!("API host {} cannot be a base URL", self.config.host)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        match &self.config.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    pub(crate) fn get(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    pub(crate) fn post(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http.post(url))
    }

    /// Sends `request`, mapping transport failures to `RemoteUnavailable`.
    pub(crate) async fn send(&self, service: &'static str, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(AgentError::unavailable(service))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, service: &'static str, url: Url) -> Result<T> {
        tracing::debug!("GET {}", url);
        let resp = self.send(service, self.get(url)).await?;
        let resp = reject_unless(service, resp, |s| s.is_success()).await?;
        resp.json().await.map_err(AgentError::unavailable(service))
    }

    pub(crate) async fn post_json<B, T>(&self, service: &'static str, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {}", url);
        let resp = self.send(service, self.post(url).json(body)).await?;
        let resp = reject_unless(service, resp, |s| s.is_success()).await?;
        resp.json().await.map_err(AgentError::unavailable(service))
    }

    /// Downloads raw bytes from an arbitrary (possibly pre-signed) URL,
    /// without API credentials.
    pub(crate) async fn download(&self, service: &'static str, url: &str) -> Result<Vec<u8>> {
        let resp = self.send(service, self.http.get(url)).await?;
        let resp = reject_unless(service, resp, |s| s.is_success()).await?;
        let bytes = resp.bytes().await.map_err(AgentError::unavailable(service))?;
        Ok(bytes.to_vec())
    }
}

/// Turns a response whose status fails `accept` into `RemoteRejected`,
/// keeping the body for diagnostics.
pub(crate) async fn reject_unless(
    service: &'static str,
    resp: Response,
    accept: impl FnOnce(reqwest::StatusCode) -> bool,
) -> Result<Response> {
    let status = resp.status();
    tracing::info!("{} response status: {}", service, status);
    if accept(status) {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!("{} response body: {}", service, body);
    Err(AgentError::RemoteRejected {
        service,
        status: status.as_u16(),
        body,
    })
}
