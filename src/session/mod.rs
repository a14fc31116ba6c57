//! Browser-held session state.
//!
//! Nothing here is stored server-side: the session and the pending authorization are rebuilt
//! from the inbound cookie map on every request and written back as `Set-Cookie` directives.

pub mod cookies;
pub mod pkce;

use axum::http::{header::HOST, HeaderMap};
use secrecy::SecretString;

use self::cookies::CookieMap;

pub const ACCESS_COOKIE: &str = "mal_access";
pub const REFRESH_COOKIE: &str = "mal_refresh";
pub const VERIFIER_COOKIE: &str = "pkce_verifier";
pub const STATE_COOKIE: &str = "oauth_state";

/// Tokens carried by the browser after a successful code exchange.
pub struct Session {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
}

impl Session {
    /// Resolve the session from inbound cookies; `None` when no access cookie is present.
    #[must_use]
    pub fn from_cookies(cookies: &CookieMap) -> Option<Self> {
        let access = cookies.get(ACCESS_COOKIE).filter(|v| !v.is_empty())?;
        let refresh = cookies
            .get(REFRESH_COOKIE)
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::from(v.clone()));

        Some(Self {
            access_token: SecretString::from(access.clone()),
            refresh_token: refresh,
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[cfg(test)]
    fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    #[must_use]
    pub fn into_access_token(self) -> SecretString {
        self.access_token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Scheme and host the browser used to reach us, honoring reverse-proxy headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    proto: String,
    host: String,
}

impl RequestOrigin {
    #[must_use]
    pub fn new(proto: &str, host: &str) -> Self {
        Self {
            proto: proto.to_string(),
            host: host.to_string(),
        }
    }

    /// `X-Forwarded-Host` wins over `Host`; the scheme defaults to `https`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let host = first_value(headers, "x-forwarded-host")
            .or_else(|| first_value(headers, HOST.as_str()))
            .unwrap_or_else(|| "localhost".to_string());
        let proto = first_value(headers, "x-forwarded-proto").unwrap_or_else(|| "https".to_string());

        Self { proto, host }
    }

    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}://{}", self.proto, self.host)
    }

    /// Redirect URI for the OAuth callback; must be identical at start and at exchange.
    #[must_use]
    pub fn redirect_uri(&self, callback_path: &str) -> String {
        format!("{}{callback_path}", self.origin())
    }
}

fn first_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
