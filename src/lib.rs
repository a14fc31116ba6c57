//! # malproxy
//!
//! `malproxy` lets a browser application sign in to MyAnimeList with OAuth2 + PKCE
//! and then read from the MAL v2 API without ever holding a token in script.
//!
//! ## Sessions live in cookies
//!
//! The proxy keeps no server-side state. The pending authorization (`state` and
//! PKCE verifier) and the resulting session (access and refresh tokens) are
//! round-tripped through `HttpOnly; Secure; SameSite=Lax` cookies, so any number
//! of instances can serve the same browser.
//!
//! ## Credential injection
//!
//! Data routes are forwarded to the upstream API with a bearer token when a
//! session cookie is present, falling back to the configured `X-MAL-CLIENT-ID`
//! for public reads. `nsfw=true` is always added unless the caller set it.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod upstream;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
