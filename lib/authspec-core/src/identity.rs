//! Static client-credentials identity and its builder.

use std::fmt;

use url::Url;

use crate::error::AuthConfigurationError;
use crate::secure::SecureString;

/// Token endpoint path used when none is configured.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "/as/token.oauth2";

/// Grant type used when none is configured.
pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";

/// The client identity used for every token exchange.
///
/// Client id and secret are optional here: their absence is reported as an
/// [`AuthConfigurationError`] by [`CredentialIdentity::credentials`], which the
/// token service calls each time a token is requested.
///
/// Use [`CredentialIdentityBuilder`] to create instances.
#[derive(Clone)]
pub struct CredentialIdentity {
    base_url: Url,
    token_endpoint_path: String,
    token_url: Url,
    client_id: Option<String>,
    client_secret: Option<SecureString>,
    grant_type: String,
}

impl CredentialIdentity {
    /// Creates a builder for the identity provider at `base_url`.
    pub fn builder(
        base_url: impl AsRef<str>,
    ) -> Result<CredentialIdentityBuilder, AuthConfigurationError> {
        CredentialIdentityBuilder::new(base_url)
    }

    /// The identity provider base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The token endpoint path, relative to the base URL.
    pub fn token_endpoint_path(&self) -> &str {
        &self.token_endpoint_path
    }

    /// The full token endpoint URL.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// The configured client id, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// The grant type sent as `grant_type`.
    pub fn grant_type(&self) -> &str {
        &self.grant_type
    }

    /// Returns the complete credentials for a token request.
    ///
    /// # Errors
    ///
    /// Returns an error if the client id or the client secret is missing or empty.
    pub fn credentials(&self) -> Result<ClientCredentials<'_>, AuthConfigurationError> {
        let client_id = self
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AuthConfigurationError::MissingClientId)?;
        let client_secret = self
            .client_secret
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .ok_or(AuthConfigurationError::MissingClientSecret)?;

        Ok(ClientCredentials {
            token_url: &self.token_url,
            client_id,
            client_secret,
            grant_type: &self.grant_type,
        })
    }
}

impl fmt::Debug for CredentialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIdentity")
            .field("base_url", &self.base_url.as_str())
            .field("token_endpoint_path", &self.token_endpoint_path)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("grant_type", &self.grant_type)
            .finish()
    }
}

/// Validated credentials borrowed from a [`CredentialIdentity`].
#[derive(Clone, Copy)]
pub struct ClientCredentials<'a> {
    /// Full token endpoint URL.
    pub token_url: &'a Url,
    /// Client id sent as `client_id`.
    pub client_id: &'a str,
    /// Client secret sent as `client_secret`.
    pub client_secret: &'a SecureString,
    /// Grant type sent as `grant_type`.
    pub grant_type: &'a str,
}

impl fmt::Debug for ClientCredentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("grant_type", &self.grant_type)
            .finish()
    }
}

/// Builder for [`CredentialIdentity`].
#[derive(Clone)]
pub struct CredentialIdentityBuilder {
    base_url: Url,
    token_endpoint_path: String,
    client_id: Option<String>,
    client_secret: Option<SecureString>,
    grant_type: String,
}

impl CredentialIdentityBuilder {
    /// Creates a new builder with the default endpoint path and grant type.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, AuthConfigurationError> {
        let base_url =
            Url::parse(base_url.as_ref()).map_err(|err| AuthConfigurationError::InvalidBaseUrl {
                url: base_url.as_ref().to_string(),
                reason: err.to_string(),
            })?;

        Ok(Self {
            base_url,
            token_endpoint_path: DEFAULT_TOKEN_ENDPOINT.to_string(),
            client_id: None,
            client_secret: None,
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
        })
    }

    /// Sets the token endpoint path.
    #[must_use]
    pub fn with_token_endpoint(mut self, path: impl Into<String>) -> Self {
        self.token_endpoint_path = path.into();
        self
    }

    /// Sets the client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<SecureString>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the grant type.
    #[must_use]
    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = grant_type.into();
        self
    }

    /// Builds the identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint path does not form a valid URL with the base URL.
    /// Missing client credentials are not checked here.
    pub fn build(self) -> Result<CredentialIdentity, AuthConfigurationError> {
        let token_url = join_endpoint(&self.base_url, &self.token_endpoint_path)?;

        Ok(CredentialIdentity {
            base_url: self.base_url,
            token_endpoint_path: self.token_endpoint_path,
            token_url,
            client_id: self.client_id,
            client_secret: self.client_secret,
            grant_type: self.grant_type,
        })
    }
}

impl fmt::Debug for CredentialIdentityBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIdentityBuilder")
            .field("base_url", &self.base_url.as_str())
            .field("token_endpoint_path", &self.token_endpoint_path)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

// The endpoint path is appended to the base URL path, it does not replace it
fn join_endpoint(base_url: &Url, path: &str) -> Result<Url, AuthConfigurationError> {
    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = format!("{base}/{path}");

    let url = Url::parse(&joined).map_err(|err| AuthConfigurationError::InvalidTokenEndpoint {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(AuthConfigurationError::InvalidTokenEndpoint {
            path: path.to_string(),
            reason: format!("base URL '{base_url}' cannot have a path"),
        });
    }
    Ok(url)
}
