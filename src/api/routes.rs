//! Route table for the proxied data endpoints.
//!
//! Pure functions only: a [`ProxyRequest`] goes in, a [`Dispatch`] (or an error) comes out.
//! Nothing here touches the network, which keeps routing and credential choice testable.

use crate::{
    config::ProxyConfig,
    error::ProxyError,
    session::{
        cookies::{self, CookieMap},
        Session,
    },
    upstream::Credential,
};
use axum::http::{HeaderMap, Uri};
use regex::Regex;
use std::collections::BTreeMap;

const FUNCTIONS_PREFIX: &str = "/.netlify/functions/";
const API_PREFIX: &str = "/api";
const DEFAULT_RANKING_TYPE: &str = "bypopularity";
const DEFAULT_RANKING_LIMIT: &str = "100";

/// Normalized inbound request.
#[derive(Debug)]
pub struct ProxyRequest {
    path: String,
    query: BTreeMap<String, String>,
    cookies: CookieMap,
}

impl ProxyRequest {
    #[must_use]
    pub fn new(path: &str, query: BTreeMap<String, String>, cookies: CookieMap) -> Self {
        Self {
            path: normalize_path(path),
            query,
            cookies,
        }
    }

    #[must_use]
    pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Self {
        let query = url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
            .into_owned()
            .collect();

        Self::new(uri.path(), query, cookies::from_headers(headers))
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieMap {
        &self.cookies
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AnimeList,
    Anime(u64),
    AnimeRanking,
    Logout,
}

impl Route {
    /// Match a normalized path against the fixed route table.
    #[must_use]
    pub fn resolve(path: &str) -> Option<Self> {
        match path {
            "/animelist" => Some(Self::AnimeList),
            "/anime-ranking" => Some(Self::AnimeRanking),
            "/logout" => Some(Self::Logout),
            _ => anime_id(path).map(Self::Anime),
        }
    }
}

fn anime_id(path: &str) -> Option<u64> {
    let re = Regex::new(r"^/anime/(\d+)$").ok()?;
    let captures = re.captures(path)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Strip deployment prefixes so `/api/x` and `/.netlify/functions/<fn>/x` both become `/x`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut normalized = match path.strip_prefix(FUNCTIONS_PREFIX) {
        Some(after) => after
            .find('/')
            .map_or_else(|| "/".to_string(), |idx| after[idx..].to_string()),
        None => path.to_string(),
    };

    if normalized == API_PREFIX {
        normalized = "/".to_string();
    } else if normalized.starts_with("/api/") {
        normalized = normalized[API_PREFIX.len()..].to_string();
    }

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.truncate(normalized.trim_end_matches('/').len().max(1));
    }

    if normalized.is_empty() {
        normalized.push('/');
    }

    normalized
}

/// A fully prepared upstream call.
#[derive(Debug)]
pub struct UpstreamCall {
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub credential: Credential,
}

#[derive(Debug)]
pub enum Dispatch {
    Forward(UpstreamCall),
    Logout,
}

/// Decide what to do with a request: route it, pick credentials, and apply query defaults.
///
/// # Errors
/// `NotFound` for unknown paths, `Unauthenticated` when the list is requested without a session,
/// `Configuration` when a public read has neither a session nor a client id.
pub fn dispatch(request: &ProxyRequest, config: &ProxyConfig) -> Result<Dispatch, ProxyError> {
    let route =
        Route::resolve(request.path()).ok_or_else(|| ProxyError::NotFound(request.path().to_string()))?;
    let session = Session::from_cookies(request.cookies());
    let mut query = request.query().clone();

    let (path, credential) = match route {
        Route::Logout => return Ok(Dispatch::Logout),
        Route::AnimeList => {
            let session = session.ok_or(ProxyError::Unauthenticated)?;
            if !query.contains_key("fields") {
                query.insert("fields".to_string(), config.list_fields().to_string());
            }
            (
                "/users/@me/animelist".to_string(),
                Credential::Bearer(session.into_access_token()),
            )
        }
        Route::Anime(id) => (format!("/anime/{id}"), public_credential(session, config)?),
        Route::AnimeRanking => {
            query
                .entry("ranking_type".to_string())
                .or_insert_with(|| DEFAULT_RANKING_TYPE.to_string());
            query
                .entry("limit".to_string())
                .or_insert_with(|| DEFAULT_RANKING_LIMIT.to_string());
            ("/anime/ranking".to_string(), public_credential(session, config)?)
        }
    };

    Ok(Dispatch::Forward(UpstreamCall {
        path,
        query,
        credential,
    }))
}

fn public_credential(session: Option<Session>, config: &ProxyConfig) -> Result<Credential, ProxyError> {
    if let Some(session) = session {
        return Ok(Credential::Bearer(session.into_access_token()));
    }
    config
        .client_id()
        .map(|id| Credential::ClientId(id.to_string()))
        .ok_or(ProxyError::Configuration)
}
