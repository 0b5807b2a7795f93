//! Process-level authentication settings.
//!
//! Settings are loaded once, typically at test suite start, from environment
//! variables and optionally from a YAML document (`yaml` feature). When both
//! are used, environment values override the document field by field:
//!
//! ```rust,ignore
//! use authspec_core::AuthSettings;
//!
//! let file = AuthSettings::from_yaml(include_str!("auth.yml"))?;
//! let settings = file.merge(AuthSettings::from_env()?);
//! let service = authspec_core::TokenService::from_settings(&settings)?;
//! ```
//!
//! | Environment variable          | Field                | Default               |
//! |-------------------------------|----------------------|-----------------------|
//! | `AUTHSPEC_BASE_URL`           | `base_url`           | required              |
//! | `AUTHSPEC_TOKEN_ENDPOINT`     | `token_endpoint`     | `/as/token.oauth2`    |
//! | `AUTHSPEC_CLIENT_ID`          | `client_id`          | required at first use |
//! | `AUTHSPEC_CLIENT_SECRET`      | `client_secret`      | required at first use |
//! | `AUTHSPEC_GRANT_TYPE`         | `grant_type`         | `client_credentials`  |
//! | `AUTHSPEC_API_BASE_URL`       | `api_base_url`       | none                  |
//! | `AUTHSPEC_TIMEOUT_MS`         | `request_timeout_ms` | `30000`               |
//! | `AUTHSPEC_CONNECT_TIMEOUT_MS` | `connect_timeout_ms` | `10000`               |

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::AuthConfigurationError;
use crate::identity::CredentialIdentity;
use crate::provider::HttpCredentialProvider;
use crate::secure::SecureString;

/// Default timeout for a whole token request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for establishing the connection to the token endpoint.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const ENV_PREFIX: &str = "AUTHSPEC_";

/// Authentication settings for a test process.
///
/// Every field is optional so that partial layers can be merged; validation
/// happens in [`AuthSettings::identity`] and, for client credentials, when a
/// token is first requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSettings {
    /// Identity provider base URL.
    pub base_url: Option<String>,
    /// Token endpoint path, relative to the base URL.
    pub token_endpoint: Option<String>,
    /// OAuth2 client id.
    pub client_id: Option<String>,
    /// OAuth2 client secret.
    pub client_secret: Option<SecureString>,
    /// OAuth2 grant type.
    pub grant_type: Option<String>,
    /// Base URL of the API under test.
    pub api_base_url: Option<String>,
    /// Token request timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Token endpoint connection timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

impl AuthSettings {
    /// Reads settings from `AUTHSPEC_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout variable is not a number of milliseconds.
    pub fn from_env() -> Result<Self, AuthConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, called with each `AUTHSPEC_*` variable name.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout variable is not a number of milliseconds.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let millis = |name: &str| -> Result<Option<u64>, AuthConfigurationError> {
            var(name)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|err| AuthConfigurationError::InvalidSetting {
                            name: format!("{ENV_PREFIX}{name}"),
                            value: value.clone(),
                            reason: err.to_string(),
                        })
                })
                .transpose()
        };

        let settings = Self {
            base_url: var("BASE_URL"),
            token_endpoint: var("TOKEN_ENDPOINT"),
            client_id: var("CLIENT_ID"),
            client_secret: var("CLIENT_SECRET").map(SecureString::from),
            grant_type: var("GRANT_TYPE"),
            api_base_url: var("API_BASE_URL"),
            request_timeout_ms: millis("TIMEOUT_MS")?,
            connect_timeout_ms: millis("CONNECT_TIMEOUT_MS")?,
        };
        debug!(?settings, "authentication settings read from environment");
        Ok(settings)
    }

    /// Parses settings from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML or has unknown fields.
    #[cfg(feature = "yaml")]
    pub fn from_yaml(yaml: &str) -> Result<Self, AuthConfigurationError> {
        serde_saphyr::from_str(yaml).map_err(|err| AuthConfigurationError::InvalidYaml {
            reason: err.to_string(),
        })
    }

    /// Layers `overrides` on top of `self`: each field set in `overrides` wins.
    #[must_use]
    pub fn merge(self, overrides: Self) -> Self {
        Self {
            base_url: overrides.base_url.or(self.base_url),
            token_endpoint: overrides.token_endpoint.or(self.token_endpoint),
            client_id: overrides.client_id.or(self.client_id),
            client_secret: overrides.client_secret.or(self.client_secret),
            grant_type: overrides.grant_type.or(self.grant_type),
            api_base_url: overrides.api_base_url.or(self.api_base_url),
            request_timeout_ms: overrides.request_timeout_ms.or(self.request_timeout_ms),
            connect_timeout_ms: overrides.connect_timeout_ms.or(self.connect_timeout_ms),
        }
    }

    /// Token request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_ms
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis)
    }

    /// Token endpoint connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_ms
            .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis)
    }

    /// Builds the credential identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or invalid. Missing client
    /// credentials are accepted here and reported when a token is requested.
    pub fn identity(&self) -> Result<CredentialIdentity, AuthConfigurationError> {
        let base_url = self
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(AuthConfigurationError::MissingBaseUrl)?;

        let mut builder = CredentialIdentity::builder(base_url)?;
        if let Some(path) = &self.token_endpoint {
            builder = builder.with_token_endpoint(path.clone());
        }
        if let Some(client_id) = &self.client_id {
            builder = builder.with_client_id(client_id.clone());
        }
        if let Some(secret) = &self.client_secret {
            builder = builder.with_client_secret(secret.clone());
        }
        if let Some(grant_type) = &self.grant_type {
            builder = builder.with_grant_type(grant_type.clone());
        }
        builder.build()
    }

    /// Parses the base URL of the API under test, if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured value is not an absolute URL.
    pub fn api_base_url(&self) -> Result<Option<Url>, AuthConfigurationError> {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| {
                Url::parse(url).map_err(|err| AuthConfigurationError::InvalidSetting {
                    name: "api_base_url".to_string(),
                    value: url.to_string(),
                    reason: err.to_string(),
                })
            })
            .transpose()
    }

    /// Builds the HTTP credential provider with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be created.
    pub fn provider(&self) -> Result<HttpCredentialProvider, AuthConfigurationError> {
        HttpCredentialProvider::with_timeouts(self.request_timeout(), self.connect_timeout())
    }
}
