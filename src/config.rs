//! Process-wide proxy configuration.
//!
//! Built once from the CLI/environment and shared read-only with every handler.

use crate::session::pkce::PkceMethod;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://api.myanimelist.net/v2";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://myanimelist.net/v1/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://myanimelist.net/v1/oauth2/token";
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";
pub const DEFAULT_LIST_FIELDS: &str =
    "list_status,num_episodes,media_type,status,mean,main_picture";
const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone)]
pub struct ProxyConfig {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    api_base_url: Url,
    authorize_url: Url,
    token_url: Url,
    callback_path: String,
    pkce_method: PkceMethod,
    upstream_timeout: Duration,
    list_fields: String,
}

impl ProxyConfig {
    /// Configuration pointing at the public MAL endpoints.
    ///
    /// # Errors
    /// Returns an error if one of the built-in endpoint URLs fails to parse.
    pub fn new(client_id: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client_id: client_id.filter(|id| !id.trim().is_empty()),
            client_secret: None,
            api_base_url: Url::parse(DEFAULT_API_BASE_URL)?,
            authorize_url: Url::parse(DEFAULT_AUTHORIZE_URL)?,
            token_url: Url::parse(DEFAULT_TOKEN_URL)?,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            pkce_method: PkceMethod::Plain,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECONDS),
            list_fields: DEFAULT_LIST_FIELDS.to_string(),
        })
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: Option<SecretString>) -> Self {
        self.client_secret = secret;
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = url;
        self
    }

    #[must_use]
    pub fn with_authorize_url(mut self, url: Url) -> Self {
        self.authorize_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_callback_path(mut self, path: String) -> Self {
        self.callback_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    #[must_use]
    pub fn with_pkce_method(mut self, method: PkceMethod) -> Self {
        self.pkce_method = method;
        self
    }

    #[must_use]
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_list_fields(mut self, fields: String) -> Self {
        self.list_fields = fields;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    #[must_use]
    pub fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    #[must_use]
    pub fn pkce_method(&self) -> PkceMethod {
        self.pkce_method
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }

    #[must_use]
    pub fn list_fields(&self) -> &str {
        &self.list_fields
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("api_base_url", &self.api_base_url.as_str())
            .field("authorize_url", &self.authorize_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("callback_path", &self.callback_path)
            .field("pkce_method", &self.pkce_method)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("list_fields", &self.list_fields)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::new(Some("client".to_string())).unwrap();
        assert_eq!(config.client_id(), Some("client"));
        assert!(config.client_secret().is_none());
        assert_eq!(config.api_base_url().as_str(), DEFAULT_API_BASE_URL);
        assert_eq!(config.callback_path(), "/auth/callback");
        assert_eq!(config.pkce_method(), PkceMethod::Plain);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_blank_client_id_is_missing() {
        let config = ProxyConfig::new(Some("  ".to_string())).unwrap();
        assert!(config.client_id().is_none());
    }

    #[test]
    fn test_callback_path_gets_leading_slash() {
        let config = ProxyConfig::new(None)
            .unwrap()
            .with_callback_path(".netlify/functions/auth-callback".to_string());
        assert_eq!(config.callback_path(), "/.netlify/functions/auth-callback");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProxyConfig::new(Some("client".to_string()))
            .unwrap()
            .with_client_secret(Some(SecretString::from("hunter2".to_string())));
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }
}
