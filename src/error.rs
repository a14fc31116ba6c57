//! Request-path error taxonomy.
//!
//! Every failure a handler can hit maps to exactly one status code. Nothing is
//! retried; the error is turned into a response and returned to the browser.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing MAL_CLIENT_ID")]
    Configuration,
    #[error("Missing code/state")]
    MissingParameter,
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("State mismatch")]
    StateMismatch,
    #[error("Missing PKCE verifier")]
    MissingVerifier,
    #[error("Token error: {body}")]
    TokenExchangeFailed { status: StatusCode, body: String },
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream request failed: {0}")]
    UpstreamRequest(#[from] reqwest::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration | Self::UpstreamRequest(_) | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::MissingParameter
            | Self::AuthorizationDenied(_)
            | Self::StateMismatch
            | Self::MissingVerifier => StatusCode::BAD_REQUEST,
            Self::TokenExchangeFailed { status, .. } => *status,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {self:?}");
        } else {
            warn!(status = status.as_u16(), "Request rejected: {self}");
        }

        match self {
            Self::Unauthenticated => {
                (status, Json(json!({ "error": "unauthenticated" }))).into_response()
            }
            Self::NotFound(path) => {
                (status, Json(json!({ "error": "not_found", "path": path }))).into_response()
            }
            // Internal details stay in the log.
            Self::UpstreamRequest(_) => (
                status,
                Json(json!({ "error": "proxy_error", "message": "upstream request failed" })),
            )
                .into_response(),
            Self::Unexpected(_) => (
                status,
                Json(json!({ "error": "proxy_error", "message": "unexpected error" })),
            )
                .into_response(),
            other => (status, other.to_string()).into_response(),
        }
    }
}
