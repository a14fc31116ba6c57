use crate::{
    config::ProxyConfig,
    error::ProxyError,
    session::{
        cookies,
        pkce::{self, AuthRedirect, CallbackParams},
        RequestOrigin,
    },
    upstream::UpstreamClient,
};
use axum::{
    extract::{rejection::QueryRejection, Query},
    http::HeaderMap,
    Extension,
};
use std::sync::Arc;
use tracing::warn;

/// `GET /auth/start`: redirect the browser to the provider's consent page.
pub async fn start(
    headers: HeaderMap,
    config: Extension<Arc<ProxyConfig>>,
) -> Result<AuthRedirect, ProxyError> {
    pkce::start_authorization(&config, &RequestOrigin::from_headers(&headers))
}

/// `GET /auth/callback`: exchange the code and store the session in cookies.
pub async fn callback(
    headers: HeaderMap,
    query: Result<Query<CallbackParams>, QueryRejection>,
    config: Extension<Arc<ProxyConfig>>,
    upstream: Extension<UpstreamClient>,
) -> Result<AuthRedirect, ProxyError> {
    let params = parse_callback_params(query)?;
    let cookies = cookies::from_headers(&headers);

    pkce::complete_authorization(
        &config,
        upstream.http(),
        &RequestOrigin::from_headers(&headers),
        &params,
        &cookies,
    )
    .await
}

// Repeated or malformed keys count as a missing code/state.
fn parse_callback_params(
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<CallbackParams, ProxyError> {
    match query {
        Ok(Query(params)) => Ok(params),
        Err(rejection) => {
            warn!("Failed to parse callback query: {rejection}");
            Err(ProxyError::MissingParameter)
        }
    }
}
