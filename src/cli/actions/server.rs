use crate::{api, cli::telemetry, config::ProxyConfig, session::pkce::PkceMethod};
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub api_base_url: Url,
    pub authorize_url: Url,
    pub token_url: Url,
    pub callback_path: String,
    pub pkce_method: PkceMethod,
    pub upstream_timeout: Duration,
    pub list_fields: String,
}

impl Args {
    /// Build the shared proxy configuration.
    ///
    /// # Errors
    /// Returns an error if the built-in endpoint defaults fail to parse.
    pub fn into_config(self) -> Result<ProxyConfig> {
        Ok(ProxyConfig::new(self.client_id)?
            .with_client_secret(self.client_secret)
            .with_api_base_url(self.api_base_url)
            .with_authorize_url(self.authorize_url)
            .with_token_url(self.token_url)
            .with_callback_path(self.callback_path)
            .with_pkce_method(self.pkce_method)
            .with_upstream_timeout(self.upstream_timeout)
            .with_list_fields(self.list_fields))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let port = args.port;
    let config = args.into_config()?;

    log_startup_config(port, &config);

    let result = api::new(port, config).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_config(port: u16, config: &ProxyConfig) {
    if config.client_id().is_none() {
        warn!("MAL_CLIENT_ID is not set: sign-in and anonymous reads will fail");
    }

    info!(
        port,
        api_base_url = %config.api_base_url(),
        authorize_url = %config.authorize_url(),
        token_url = %config.token_url(),
        callback_path = config.callback_path(),
        pkce_method = config.pkce_method().as_str(),
        client_secret_set = config.client_secret().is_some(),
        upstream_timeout_seconds = config.upstream_timeout().as_secs(),
        "Startup configuration"
    );
}
