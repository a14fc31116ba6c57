use crate::{
    cli::{
        actions::{server, Action},
        commands::{mal, ARG_PORT},
    },
    session::pkce::PkceMethod,
};
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

const RESERVED_PATHS: [&str; 3] = ["/health", "/auth/start", "/.netlify/functions/auth-start"];

/// Turn parsed arguments into the action to run.
///
/// # Errors
/// Returns an error if a required value is missing or the callback path cannot be routed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let url = |name: &str| -> Result<Url> {
        matches
            .get_one::<Url>(name)
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument: --{name}"))
    };
    let string = |name: &str| matches.get_one::<String>(name).cloned();

    let callback_path = validate_callback_path(
        string(mal::ARG_CALLBACK_PATH)
            .as_deref()
            .unwrap_or(crate::config::DEFAULT_CALLBACK_PATH),
    )?;

    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080),
        client_id: string(mal::ARG_CLIENT_ID).filter(|id| !id.trim().is_empty()),
        client_secret: string(mal::ARG_CLIENT_SECRET)
            .filter(|secret| !secret.is_empty())
            .map(SecretString::from),
        api_base_url: url(mal::ARG_API_BASE_URL)?,
        authorize_url: url(mal::ARG_AUTHORIZE_URL)?,
        token_url: url(mal::ARG_TOKEN_URL)?,
        callback_path,
        pkce_method: matches
            .get_one::<PkceMethod>(mal::ARG_PKCE_METHOD)
            .copied()
            .unwrap_or_default(),
        upstream_timeout: Duration::from_secs(
            matches
                .get_one::<u64>(mal::ARG_UPSTREAM_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
        ),
        list_fields: string(mal::ARG_LIST_FIELDS)
            .unwrap_or_else(|| crate::config::DEFAULT_LIST_FIELDS.to_string()),
    }))
}

/// The callback path becomes a literal route, so it may not carry router syntax or shadow
/// another fixed route.
fn validate_callback_path(path: &str) -> Result<String> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    if path.len() < 2 || path.contains([':', '*', '{', '}', '?', '#']) {
        return Err(anyhow!("invalid callback path: {path}"));
    }
    if RESERVED_PATHS.contains(&path.as_str()) {
        return Err(anyhow!("callback path {path} collides with a built-in route"));
    }

    Ok(path)
}
