/// Invalid or incomplete credential configuration.
///
/// These errors are fatal: the token service never retries them. Missing
/// client credentials are only reported when a token is first requested, so a
/// suite that never authenticates can run without them.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum AuthConfigurationError {
    /// No client id configured.
    #[display(
        "OAuth2 client id must be configured (set AUTHSPEC_CLIENT_ID or `client_id` in settings)"
    )]
    MissingClientId,

    /// No client secret configured.
    #[display(
        "OAuth2 client secret must be configured (set AUTHSPEC_CLIENT_SECRET or `client_secret` in settings)"
    )]
    MissingClientSecret,

    /// No identity provider base URL configured.
    #[display("OAuth2 base URL must be configured (set AUTHSPEC_BASE_URL or `base_url` in settings)")]
    MissingBaseUrl,

    /// The base URL cannot be parsed.
    #[display("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The invalid URL that was provided.
        url: String,
        /// Description of why the URL is invalid.
        reason: String,
    },

    /// The token endpoint path does not form a valid URL with the base URL.
    #[display("Invalid token endpoint '{path}': {reason}")]
    InvalidTokenEndpoint {
        /// The endpoint path that was provided.
        path: String,
        /// Description of why the endpoint is invalid.
        reason: String,
    },

    /// A setting has a value that cannot be used.
    #[display("Invalid value '{value}' for setting {name}: {reason}")]
    InvalidSetting {
        /// Setting name.
        name: String,
        /// The rejected value.
        value: String,
        /// Description of why the value is rejected.
        reason: String,
    },

    /// The HTTP client for the token endpoint could not be built.
    #[display("Cannot build HTTP client for the token endpoint: {reason}")]
    HttpClient {
        /// Description of the failure.
        reason: String,
    },

    /// The settings document cannot be parsed.
    #[cfg(feature = "yaml")]
    #[display("Invalid YAML settings: {reason}")]
    InvalidYaml {
        /// Description of the parsing failure.
        reason: String,
    },
}

/// Failure of the client-credentials exchange with the token endpoint.
///
/// Nothing is cached when an exchange fails, and the core never retries.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum TokenExchangeError {
    /// The token endpoint answered with a status other than `200 OK`.
    #[display("Token endpoint returned status {status}: {body}")]
    UnexpectedStatus {
        /// The HTTP status code received.
        status: u16,
        /// The response body for debugging.
        body: String,
    },

    /// The `200 OK` body is not the expected JSON document.
    #[display("Token endpoint response cannot be parsed: {reason}\n{body}")]
    InvalidResponse {
        /// Description of the parsing failure.
        reason: String,
        /// The response body that failed to parse.
        body: String,
    },

    /// The `200 OK` body has no usable `access_token`.
    #[display("Access token not found in token endpoint response")]
    MissingAccessToken,

    /// The token request could not be encoded.
    #[display("Cannot encode token request: {reason}")]
    InvalidRequest {
        /// Description of the encoding failure.
        reason: String,
    },

    /// The request did not complete (connection refused, timeout, ...).
    #[display("Token request to {url} failed: {reason}")]
    Transport {
        /// The token endpoint URL.
        url: String,
        /// Description of the network error.
        reason: String,
    },
}

/// Errors returned by the token service and the test harness integration.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum TokenError {
    /// Credential configuration is missing or invalid.
    #[display("Authentication configuration error: {_0}")]
    Configuration(AuthConfigurationError),

    /// The token endpoint did not issue a usable token.
    #[display("Failed to retrieve access token: {_0}")]
    Exchange(TokenExchangeError),

    /// The issued token cannot be used as an HTTP header value.
    #[display("Bearer token contains invalid characters: {message}")]
    #[from(skip)]
    InvalidBearerToken {
        /// Description of the invalid characters.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_unexpected_status() {
        let error = TokenExchangeError::UnexpectedStatus {
            status: 401,
            body: r#"{"error":"invalid_client"}"#.to_string(),
        };
        insta::assert_snapshot!(error, @r#"Token endpoint returned status 401: {"error":"invalid_client"}"#);
    }

    #[test]
    fn should_display_wrapped_configuration_error() {
        let error = TokenError::from(AuthConfigurationError::MissingClientSecret);
        insta::assert_snapshot!(error, @"Authentication configuration error: OAuth2 client secret must be configured (set AUTHSPEC_CLIENT_SECRET or `client_secret` in settings)");
    }

    #[test]
    fn should_display_wrapped_exchange_error() {
        let error = TokenError::from(TokenExchangeError::MissingAccessToken);
        assert_eq!(
            error.to_string(),
            "Failed to retrieve access token: Access token not found in token endpoint response"
        );
    }

    #[test]
    fn should_expose_source() {
        use std::error::Error as _;

        let error = TokenError::from(TokenExchangeError::MissingAccessToken);
        assert!(error.source().is_some());
    }

    #[test]
    fn test_token_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TokenError>();
        assert_sync::<TokenError>();
    }
}
