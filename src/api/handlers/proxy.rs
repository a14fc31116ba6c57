use crate::{
    api::routes::{self, Dispatch, ProxyRequest},
    config::ProxyConfig,
    error::ProxyError,
    session::{cookies, pkce},
    upstream::UpstreamClient,
};
use anyhow::anyhow;
use axum::{
    http::{HeaderMap, Uri},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Fallback handler: everything that is not an auth or health route lands here.
pub async fn dispatch(
    uri: Uri,
    headers: HeaderMap,
    config: Extension<Arc<ProxyConfig>>,
    upstream: Extension<UpstreamClient>,
) -> Result<Response, ProxyError> {
    let request = ProxyRequest::from_parts(&uri, &headers);

    match routes::dispatch(&request, &config)? {
        Dispatch::Logout => logout(),
        Dispatch::Forward(call) => {
            debug!(path = request.path(), upstream = %call.path, "Forwarding request");
            let response = upstream.get(&call.path, &call.query, &call.credential).await?;
            Ok(response.into_response())
        }
    }
}

fn logout() -> Result<Response, ProxyError> {
    let mut headers = HeaderMap::new();
    cookies::append_all(&mut headers, &pkce::logout())
        .map_err(|err| ProxyError::Unexpected(anyhow!("invalid Set-Cookie value: {err}")))?;

    Ok((headers, Json(json!({ "ok": true }))).into_response())
}
