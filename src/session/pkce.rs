//! OAuth2 authorization-code flow with PKCE.
//!
//! Unauthenticated -> AuthorizationPending (`start_authorization`) -> Authenticated
//! (`complete_authorization`). The pending `state` and verifier travel in short-lived cookies,
//! so the manager itself keeps no state between the two legs.

use super::{
    cookies::{self, CookieMap, SetCookie},
    RequestOrigin, ACCESS_COOKIE, REFRESH_COOKIE, STATE_COOKIE, VERIFIER_COOKIE,
};
use crate::{config::ProxyConfig, error::ProxyError};
use anyhow::{anyhow, Context};
use axum::{
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, instrument};

pub const PENDING_TTL_SECONDS: i64 = 600;
pub const REFRESH_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;
pub const DEFAULT_EXPIRES_IN: i64 = 3600;
const EXPIRY_MARGIN_SECONDS: i64 = 60;
const MIN_ACCESS_MAX_AGE: i64 = 60;
const VERIFIER_BYTES: usize = 64;
const STATE_BYTES: usize = 32;

/// How the code challenge is derived from the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PkceMethod {
    /// Challenge is the verifier itself (the only method MAL accepts).
    #[default]
    Plain,
    /// Challenge is `base64url(sha256(verifier))`.
    S256,
}

impl PkceMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }

    #[must_use]
    pub fn challenge(self, verifier: &str) -> String {
        match self {
            Self::Plain => verifier.to_string(),
            Self::S256 => Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes())),
        }
    }
}

impl FromStr for PkceMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "s256" => Ok(Self::S256),
            _ => Err(format!("invalid PKCE method: {value} (expected plain or s256)")),
        }
    }
}

/// The `state` and verifier issued at the start of an authorization.
pub struct PendingAuthorization {
    state: String,
    code_verifier: SecretString,
}

impl PendingAuthorization {
    /// Generate a fresh state and verifier from OS randomness.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> anyhow::Result<Self> {
        Ok(Self {
            state: random_token(STATE_BYTES).context("failed to generate OAuth state")?,
            code_verifier: SecretString::from(
                random_token(VERIFIER_BYTES).context("failed to generate PKCE verifier")?,
            ),
        })
    }

    /// Validate the callback `state` against the cookies and recover the verifier.
    ///
    /// # Errors
    /// `StateMismatch` when the state cookie is absent or differs, `MissingVerifier` when the
    /// verifier cookie is gone.
    pub fn from_cookies(cookies: &CookieMap, state: &str) -> Result<Self, ProxyError> {
        match cookies.get(STATE_COOKIE) {
            Some(expected) if !expected.is_empty() && expected == state => {}
            _ => return Err(ProxyError::StateMismatch),
        }

        let verifier = cookies
            .get(VERIFIER_COOKIE)
            .filter(|v| !v.is_empty())
            .ok_or(ProxyError::MissingVerifier)?;

        Ok(Self {
            state: state.to_string(),
            code_verifier: SecretString::from(verifier.clone()),
        })
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    #[must_use]
    pub fn code_verifier(&self) -> &SecretString {
        &self.code_verifier
    }

    fn cookies(&self) -> Vec<SetCookie> {
        vec![
            SetCookie::new(
                VERIFIER_COOKIE,
                self.code_verifier.expose_secret(),
                PENDING_TTL_SECONDS,
            ),
            SetCookie::new(STATE_COOKIE, &self.state, PENDING_TTL_SECONDS),
        ]
    }
}

impl fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("state", &self.state)
            .field("code_verifier", &"***")
            .finish()
    }
}

fn random_token(len: usize) -> anyhow::Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// A `302 Found` that also writes cookies.
#[derive(Debug)]
pub struct AuthRedirect {
    location: String,
    cookies: Vec<SetCookie>,
}

impl AuthRedirect {
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn cookies(&self) -> &[SetCookie] {
        &self.cookies
    }
}

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();

        match HeaderValue::from_str(&self.location) {
            Ok(location) => {
                headers.insert(LOCATION, location);
            }
            Err(err) => {
                return ProxyError::Unexpected(anyhow!("invalid redirect location: {err}"))
                    .into_response()
            }
        }

        if let Err(err) = cookies::append_all(&mut headers, &self.cookies) {
            return ProxyError::Unexpected(anyhow!("invalid Set-Cookie value: {err}"))
                .into_response();
        }

        (StatusCode::FOUND, headers).into_response()
    }
}

/// Query string of the provider's redirect back to us.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Tokens issued by a successful code exchange.
pub struct TokenSet {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_in: i64,
    expires_at: Option<SystemTime>,
}

impl TokenSet {
    fn from_response(response: TokenResponse) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let ttl = Duration::from_secs(u64::try_from(expires_in).unwrap_or(0));

        Self {
            access_token: SecretString::from(response.access_token),
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            expires_in,
            expires_at: SystemTime::now().checked_add(ttl),
        }
    }

    #[must_use]
    pub fn expires_in(&self) -> i64 {
        self.expires_in
    }

    /// `None` when `expires_in` is too large to represent as a point in time.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Access cookie (with safety margin) and, when issued, the refresh cookie.
    #[must_use]
    pub fn session_cookies(&self) -> Vec<SetCookie> {
        let mut cookies = vec![SetCookie::new(
            ACCESS_COOKIE,
            self.access_token.expose_secret(),
            access_cookie_max_age(self.expires_in),
        )];
        if let Some(refresh) = &self.refresh_token {
            cookies.push(SetCookie::new(
                REFRESH_COOKIE,
                refresh.expose_secret(),
                REFRESH_TTL_SECONDS,
            ));
        }
        cookies
    }
}

/// Max-Age for the access cookie: expire a minute before the token does, never below a minute.
#[must_use]
pub fn access_cookie_max_age(expires_in: i64) -> i64 {
    expires_in
        .saturating_sub(EXPIRY_MARGIN_SECONDS)
        .max(MIN_ACCESS_MAX_AGE)
}

/// Begin the flow: redirect to the provider and remember state and verifier in cookies.
///
/// # Errors
/// `Configuration` when no client id is set, `Unexpected` if randomness is unavailable.
#[instrument(skip(config))]
pub fn start_authorization(
    config: &ProxyConfig,
    origin: &RequestOrigin,
) -> Result<AuthRedirect, ProxyError> {
    let client_id = config.client_id().ok_or(ProxyError::Configuration)?;
    let pending = PendingAuthorization::generate()?;
    let redirect_uri = origin.redirect_uri(config.callback_path());
    let method = config.pkce_method();

    let mut url = config.authorize_url().clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair(
            "code_challenge",
            &method.challenge(pending.code_verifier().expose_secret()),
        )
        .append_pair("code_challenge_method", method.as_str())
        .append_pair("state", pending.state())
        .append_pair("redirect_uri", &redirect_uri);

    debug!(redirect_uri, method = method.as_str(), "Starting authorization");

    Ok(AuthRedirect {
        location: url.to_string(),
        cookies: pending.cookies(),
    })
}

/// Finish the flow: validate the callback, exchange the code, and set the session cookies.
///
/// Nothing is written on failure, so the pending cookies survive for a retry.
///
/// # Errors
/// See [`ProxyError`]; every validation failure happens before the token endpoint is called.
#[instrument(skip(config, http, params, cookies))]
pub async fn complete_authorization(
    config: &ProxyConfig,
    http: &Client,
    origin: &RequestOrigin,
    params: &CallbackParams,
    cookies: &CookieMap,
) -> Result<AuthRedirect, ProxyError> {
    let client_id = config.client_id().ok_or(ProxyError::Configuration)?;

    if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
        let reason = match params.error_description.as_deref() {
            Some(description) if !description.is_empty() => format!("{error}: {description}"),
            _ => error.to_string(),
        };
        return Err(ProxyError::AuthorizationDenied(reason));
    }

    let (Some(code), Some(state)) = (
        non_empty(params.code.as_deref()),
        non_empty(params.state.as_deref()),
    ) else {
        return Err(ProxyError::MissingParameter);
    };

    let pending = PendingAuthorization::from_cookies(cookies, state)?;
    let redirect_uri = origin.redirect_uri(config.callback_path());

    let tokens = exchange_code(
        config,
        http,
        client_id,
        code,
        &redirect_uri,
        pending.code_verifier(),
    )
    .await?;

    info!(
        expires_in = tokens.expires_in(),
        expires_at = tokens
            .expires_at()
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs()),
        refresh_token = tokens.refresh_token.is_some(),
        "Authorization completed"
    );

    let mut cookies = tokens.session_cookies();
    cookies.push(SetCookie::expired(VERIFIER_COOKIE));
    cookies.push(SetCookie::expired(STATE_COOKIE));

    Ok(AuthRedirect {
        location: "/".to_string(),
        cookies,
    })
}

/// Cookies that end the session, whether or not one existed.
#[must_use]
pub fn logout() -> Vec<SetCookie> {
    vec![
        SetCookie::expired(ACCESS_COOKIE),
        SetCookie::expired(REFRESH_COOKIE),
    ]
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

async fn exchange_code(
    config: &ProxyConfig,
    http: &Client,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
    verifier: &SecretString,
) -> Result<TokenSet, ProxyError> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("client_id", client_id),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("code_verifier", verifier.expose_secret()),
    ];
    if let Some(secret) = config.client_secret() {
        form.push(("client_secret", secret.expose_secret()));
    }

    let response = http
        .post(config.token_url().clone())
        .timeout(config.upstream_timeout())
        .form(&form)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        return Err(ProxyError::TokenExchangeFailed { status, body });
    }

    let token: TokenResponse = response.json().await?;

    Ok(TokenSet::from_response(token))
}
