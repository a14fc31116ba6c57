//! Outbound client for the MAL v2 API.

use crate::{config::ProxyConfig, error::ProxyError, APP_USER_AGENT};
use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, instrument};
use url::Url;

pub const CLIENT_ID_HEADER: &str = "X-MAL-CLIENT-ID";
const NSFW_PARAM: &str = "nsfw";
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// How a forwarded call authenticates; a session token is always preferred by callers.
pub enum Credential {
    Bearer(SecretString),
    ClientId(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::ClientId(id) => f.debug_tuple("ClientId").field(id).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: Client,
    base_url: Url,
}

impl UpstreamClient {
    /// Build the shared client; the timeout applies to every outbound call.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.upstream_timeout())
            .connect_timeout(config.upstream_timeout().min(Duration::from_secs(5)))
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api_base_url().clone(),
        })
    }

    /// The underlying HTTP client, shared with the token exchange.
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Resolve an API path (e.g. `/anime/42`) against the configured base URL.
    ///
    /// # Errors
    /// Returns an error if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let url = format!("{base}/{}", path.trim_start_matches('/'));
        Url::parse(&url).with_context(|| format!("Invalid upstream URL: {url}"))
    }

    /// GET `path` with `query` (plus `nsfw=true` unless set) and relay the result verbatim.
    ///
    /// # Errors
    /// `UpstreamRequest` on network or timeout failures; upstream error statuses are relayed,
    /// not treated as errors.
    #[instrument(skip(self, query, credential))]
    pub async fn get(
        &self,
        path: &str,
        query: &BTreeMap<String, String>,
        credential: &Credential,
    ) -> Result<UpstreamResponse, ProxyError> {
        let mut url = self.endpoint(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in with_nsfw(query) {
                pairs.append_pair(&key, &value);
            }
        }

        let request = self.http.get(url.clone()).header(ACCEPT, DEFAULT_CONTENT_TYPE);
        let request = match credential {
            Credential::Bearer(token) => {
                request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()))
            }
            Credential::ClientId(id) => request.header(CLIENT_ID_HEADER, id),
        };

        let response = request.send().await?;
        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        debug!(url = %url.path(), status = status.as_u16(), bytes = body.len(), "Upstream responded");

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

fn with_nsfw(query: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut query = query.clone();
    query
        .entry(NSFW_PARAM.to_string())
        .or_insert_with(|| "true".to_string());
    query
}

/// Upstream status, content type and body, relayed to the browser unchanged.
#[derive(Debug)]
pub struct UpstreamResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

impl UpstreamResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[cfg(test)]
    fn body(&self) -> &[u8] {
        &self.body
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let content_type = self
            .content_type
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        (
            self.status,
            [(CONTENT_TYPE, content_type)],
            Body::from(self.body),
        )
            .into_response()
    }
}
