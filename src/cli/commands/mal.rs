use crate::{config, session::pkce::PkceMethod};
use clap::{builder::ValueParser, Arg, Command};
use url::Url;

pub const ARG_CLIENT_ID: &str = "client-id";
pub const ARG_CLIENT_SECRET: &str = "client-secret";
pub const ARG_API_BASE_URL: &str = "api-base-url";
pub const ARG_AUTHORIZE_URL: &str = "authorize-url";
pub const ARG_TOKEN_URL: &str = "token-url";
pub const ARG_CALLBACK_PATH: &str = "callback-path";
pub const ARG_PKCE_METHOD: &str = "pkce-method";
pub const ARG_UPSTREAM_TIMEOUT_SECONDS: &str = "upstream-timeout-seconds";
pub const ARG_LIST_FIELDS: &str = "list-fields";

fn validator_url() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<Url, String> {
        let url = Url::parse(value).map_err(|e| format!("invalid URL {value}: {e}"))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(format!("unsupported URL scheme: {scheme}")),
        }
    })
}

fn validator_pkce_method() -> ValueParser {
    ValueParser::from(move |value: &str| value.parse::<PkceMethod>())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_credential_args(command);
    let command = with_endpoint_args(command);
    with_behavior_args(command)
}

fn with_credential_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("MyAnimeList application client id")
                .long_help(
                    "MyAnimeList application client id. Required for sign-in; public reads fall back to it when no session cookie is present.",
                )
                .env("MAL_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_CLIENT_SECRET)
                .long(ARG_CLIENT_SECRET)
                .help("MyAnimeList client secret, sent only on the token exchange")
                .env("MAL_CLIENT_SECRET")
                .hide_env_values(true),
        )
}

fn with_endpoint_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_BASE_URL)
                .long(ARG_API_BASE_URL)
                .help("Upstream API base URL")
                .env("MALPROXY_API_BASE_URL")
                .default_value(config::DEFAULT_API_BASE_URL)
                .value_parser(validator_url()),
        )
        .arg(
            Arg::new(ARG_AUTHORIZE_URL)
                .long(ARG_AUTHORIZE_URL)
                .help("OAuth2 authorization endpoint")
                .env("MALPROXY_AUTHORIZE_URL")
                .default_value(config::DEFAULT_AUTHORIZE_URL)
                .value_parser(validator_url()),
        )
        .arg(
            Arg::new(ARG_TOKEN_URL)
                .long(ARG_TOKEN_URL)
                .help("OAuth2 token endpoint")
                .env("MALPROXY_TOKEN_URL")
                .default_value(config::DEFAULT_TOKEN_URL)
                .value_parser(validator_url()),
        )
}

fn with_behavior_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CALLBACK_PATH)
                .long(ARG_CALLBACK_PATH)
                .help("Path the provider redirects back to; must match the registered redirect URI")
                .env("MALPROXY_CALLBACK_PATH")
                .default_value(config::DEFAULT_CALLBACK_PATH),
        )
        .arg(
            Arg::new(ARG_PKCE_METHOD)
                .long(ARG_PKCE_METHOD)
                .help("PKCE challenge method: plain or s256")
                .env("MALPROXY_PKCE_METHOD")
                .default_value("plain")
                .value_parser(validator_pkce_method()),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_TIMEOUT_SECONDS)
                .long(ARG_UPSTREAM_TIMEOUT_SECONDS)
                .help("Timeout for upstream API and token calls, in seconds")
                .env("MALPROXY_UPSTREAM_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_LIST_FIELDS)
                .long(ARG_LIST_FIELDS)
                .help("Default `fields` for the list route when the caller sends none")
                .env("MALPROXY_LIST_FIELDS")
                .default_value(config::DEFAULT_LIST_FIELDS),
        )
}
