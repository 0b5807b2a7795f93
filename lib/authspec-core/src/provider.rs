//! Credential providers performing the client-credentials token exchange.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use http::StatusCode;
use http::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{AuthConfigurationError, TokenExchangeError};
use crate::identity::ClientCredentials;
use crate::secure::SecureString;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An access token freshly issued by the token endpoint.
#[derive(Clone)]
pub struct IssuedToken {
    access_token: SecureString,
    expires_in: Option<Duration>,
}

impl IssuedToken {
    /// Creates a token with no reported lifetime.
    pub fn new(access_token: impl Into<SecureString>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in: None,
        }
    }

    /// Sets the lifetime reported by the token endpoint (`expires_in`).
    #[must_use]
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// The access token value.
    pub fn access_token(&self) -> &SecureString {
        &self.access_token
    }

    /// The lifetime reported by the token endpoint, if any.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    /// Consumes the issued token and returns the access token.
    pub fn into_access_token(self) -> SecureString {
        self.access_token
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Performs the OAuth2 client-credentials exchange.
///
/// This is the boundary between the token service and the network. The crate
/// ships [`HttpCredentialProvider`]; tests usually plug an in-memory double.
///
/// # Example
///
/// ```rust
/// use authspec_core::{ClientCredentials, CredentialProvider, IssuedToken, TokenExchangeError};
///
/// struct FixedProvider;
///
/// impl CredentialProvider for FixedProvider {
///     async fn exchange(
///         &self,
///         _credentials: &ClientCredentials<'_>,
///         _scope: Option<&str>,
///     ) -> Result<IssuedToken, TokenExchangeError> {
///         Ok(IssuedToken::new("fixed-token"))
///     }
/// }
/// ```
pub trait CredentialProvider: Send + Sync {
    /// Exchanges the client credentials for an access token.
    ///
    /// `scope` is the space-separated scope list, `None` when no scope is requested
    /// (the `scope` parameter is then omitted).
    fn exchange(
        &self,
        credentials: &ClientCredentials<'_>,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<IssuedToken, TokenExchangeError>> + Send;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    expires_in: Option<u64>,
}

// `expires_in` is advisory: some providers send it as a string or a float,
// anything that is not a non-negative number of seconds is ignored
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(seconds_from_value))
}

fn seconds_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().and_then(whole_seconds)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(whole_seconds))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_seconds(seconds: f64) -> Option<u64> {
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.trunc() as u64)
}

/// Credential provider posting a form-encoded client-credentials request.
///
/// Success is `200 OK` with a JSON body holding a non-empty `access_token`;
/// an optional `expires_in` (seconds) is reported to the caller when usable.
#[derive(Debug, Clone)]
pub struct HttpCredentialProvider {
    client: reqwest::Client,
}

impl HttpCredentialProvider {
    /// Uses an existing HTTP client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds an HTTP client with the given request and connect timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeouts(
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, AuthConfigurationError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|err| AuthConfigurationError::HttpClient {
                reason: err.to_string(),
            })?;
        Ok(Self::new(client))
    }

    fn encode_request(
        credentials: &ClientCredentials<'_>,
        scope: Option<&str>,
    ) -> Result<String, TokenExchangeError> {
        let request = TokenRequest {
            grant_type: credentials.grant_type,
            client_id: credentials.client_id,
            client_secret: credentials.client_secret.as_str(),
            scope,
        };
        serde_urlencoded::to_string(&request).map_err(|err| TokenExchangeError::InvalidRequest {
            reason: err.to_string(),
        })
    }

    fn parse_response(status: StatusCode, body: String) -> Result<IssuedToken, TokenExchangeError> {
        if status != StatusCode::OK {
            return Err(TokenExchangeError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let response = serde_json::from_str::<TokenResponse>(&body).map_err(|err| {
            TokenExchangeError::InvalidResponse {
                reason: err.to_string(),
                body: body.clone(),
            }
        })?;

        let access_token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(TokenExchangeError::MissingAccessToken)?;

        let mut token = IssuedToken::new(access_token);
        if let Some(seconds) = response.expires_in {
            token = token.with_expires_in(Duration::from_secs(seconds));
        }
        Ok(token)
    }
}

impl CredentialProvider for HttpCredentialProvider {
    async fn exchange(
        &self,
        credentials: &ClientCredentials<'_>,
        scope: Option<&str>,
    ) -> Result<IssuedToken, TokenExchangeError> {
        let url = credentials.token_url.clone();
        let body = Self::encode_request(credentials, scope)?;
        debug!(%url, client_id = credentials.client_id, ?scope, "requesting access token");

        let transport_error = |err: reqwest::Error| TokenExchangeError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        };

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(%status, "token endpoint responded");

        Self::parse_response(status, body)
    }
}
