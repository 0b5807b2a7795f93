//! Test harness integration: one bearer token per test.

use std::fmt;

use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::error::{AuthConfigurationError, TokenError};
use crate::provider::{CredentialProvider, HttpCredentialProvider};
use crate::resolver::SuiteAuth;
use crate::secure::SecureString;
use crate::service::TokenService;
use crate::settings::AuthSettings;

/// Authenticates the tests of a suite.
///
/// Resolves the declarations of a test, then asks the shared [`TokenService`]
/// for a token matching them.
///
/// ```rust,no_run
/// use authspec_core::{AuthDeclaration, AuthSettings, SuiteAuth, TestAuthenticator, TokenService};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = TokenService::from_settings(&AuthSettings::from_env()?)?;
/// let suite = SuiteAuth::new()
///     .with_scopes(["orders:read"])
///     .with_test("cancel_order", AuthDeclaration::new().with_scopes(["orders:write"]));
/// let authenticator = TestAuthenticator::new(service, suite);
///
/// let (name, value) = authenticator.authorize("cancel_order").await?.to_header()?;
/// # let _ = (name, value);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TestAuthenticator<P = HttpCredentialProvider> {
    service: TokenService<P>,
    suite: SuiteAuth,
    api_base_url: Option<Url>,
}

impl TestAuthenticator<HttpCredentialProvider> {
    /// Creates the token service and the API base URL from `settings`.
    ///
    /// # Errors
    ///
    /// See [`TokenService::from_settings`] and [`AuthSettings::api_base_url()`].
    pub fn from_settings(
        settings: &AuthSettings,
        suite: SuiteAuth,
    ) -> Result<Self, AuthConfigurationError> {
        let service = TokenService::from_settings(settings)?;
        let mut authenticator = Self::new(service, suite);
        authenticator.api_base_url = settings.api_base_url()?;
        Ok(authenticator)
    }
}

impl<P> TestAuthenticator<P>
where
    P: CredentialProvider,
{
    /// Pairs a token service with the declarations of a suite.
    pub fn new(service: TokenService<P>, suite: SuiteAuth) -> Self {
        Self {
            service,
            suite,
            api_base_url: None,
        }
    }

    /// Sets the base URL of the API under test.
    #[must_use]
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = Some(url);
        self
    }

    /// The base URL of the API under test, if configured.
    pub fn api_base_url(&self) -> Option<&Url> {
        self.api_base_url.as_ref()
    }

    /// The shared token service.
    pub fn service(&self) -> &TokenService<P> {
        &self.service
    }

    /// The suite declarations.
    pub fn suite(&self) -> &SuiteAuth {
        &self.suite
    }

    /// Returns the bearer token to use for `test_id`.
    ///
    /// # Errors
    ///
    /// See [`TokenService::get_token`].
    pub async fn authorize(&self, test_id: &str) -> Result<BearerToken, TokenError> {
        let config = self.suite.resolve(test_id);
        let token = self.service.token_for_test(&config).await?;
        debug!(test_id, "test authorized");
        Ok(BearerToken(token))
    }
}

/// An access token ready to be sent as `Authorization: Bearer <token>`.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(SecureString);

impl BearerToken {
    /// The raw access token.
    pub fn token(&self) -> &SecureString {
        &self.0
    }

    /// Converts the token into an `Authorization` header.
    ///
    /// The header value is marked sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidBearerToken`] if the token contains
    /// characters not allowed in a header value.
    pub fn to_header(&self) -> Result<(HeaderName, HeaderValue), TokenError> {
        let header_value = format!("Bearer {}", self.0.as_str());
        let mut value =
            HeaderValue::from_str(&header_value).map_err(|err| TokenError::InvalidBearerToken {
                message: err.to_string(),
            })?;
        value.set_sensitive(true);
        Ok((AUTHORIZATION, value))
    }
}

impl From<SecureString> for BearerToken {
    fn from(token: SecureString) -> Self {
        Self(token)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerToken").field(&"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::TokenExchangeError;
    use crate::identity::{ClientCredentials, CredentialIdentity};
    use crate::provider::IssuedToken;
    use crate::resolver::AuthDeclaration;

    #[derive(Default)]
    struct RecordingProvider {
        requests: Mutex<Vec<Option<String>>>,
    }

    impl CredentialProvider for RecordingProvider {
        async fn exchange(
            &self,
            _credentials: &ClientCredentials<'_>,
            scope: Option<&str>,
        ) -> Result<IssuedToken, TokenExchangeError> {
            let mut requests = self.requests.lock().expect("requests lock");
            requests.push(scope.map(str::to_string));
            Ok(IssuedToken::new(format!("T{}", requests.len())))
        }
    }

    fn authenticator(suite: SuiteAuth) -> TestAuthenticator<RecordingProvider> {
        let identity = CredentialIdentity::builder("https://idp.example")
            .expect("Should create builder")
            .with_client_id("client-id")
            .with_client_secret("client-secret")
            .build()
            .expect("Should build identity");
        let service = TokenService::builder(identity, RecordingProvider::default()).build();
        TestAuthenticator::new(service, suite)
    }

    fn requests(authenticator: &TestAuthenticator<RecordingProvider>) -> Vec<Option<String>> {
        authenticator
            .service()
            .provider()
            .requests
            .lock()
            .expect("requests lock")
            .clone()
    }

    #[tokio::test]
    async fn should_authorize_with_resolved_scopes() {
        let authenticator = authenticator(
            SuiteAuth::new()
                .with_scopes(["read", "write"])
                .with_test("admin", AuthDeclaration::new().with_scopes(["admin"])),
        );

        let plain = authenticator.authorize("plain").await.expect("Should authorize");
        let admin = authenticator.authorize("admin").await.expect("Should authorize");
        let again = authenticator.authorize("other").await.expect("Should authorize");

        assert_eq!(plain.token().as_str(), "T1");
        assert_eq!(admin.token().as_str(), "T2");
        assert_eq!(again, plain);
        assert_eq!(
            requests(&authenticator),
            vec![Some("read write".to_string()), Some("admin".to_string())]
        );
    }

    #[tokio::test]
    async fn should_fetch_fresh_token_for_bypassing_test() {
        let authenticator = authenticator(
            SuiteAuth::new().with_test("fresh", AuthDeclaration::new().bypass_cache()),
        );

        let first = authenticator.authorize("fresh").await.expect("Should authorize");
        let second = authenticator.authorize("fresh").await.expect("Should authorize");
        let cached = authenticator.authorize("cached").await.expect("Should authorize");

        assert_eq!(first.token().as_str(), "T1");
        assert_eq!(second.token().as_str(), "T2");
        assert_eq!(cached.token().as_str(), "T2");
        assert_eq!(requests(&authenticator), vec![None, None]);
    }

    #[tokio::test]
    async fn should_report_missing_credentials() {
        let identity = CredentialIdentity::builder("https://idp.example")
            .expect("Should create builder")
            .build()
            .expect("Should build identity");
        let service = TokenService::builder(identity, RecordingProvider::default()).build();
        let authenticator = TestAuthenticator::new(service, SuiteAuth::new());

        let err = authenticator.authorize("any").await.expect_err("Should fail");
        assert_eq!(
            err,
            TokenError::Configuration(AuthConfigurationError::MissingClientId)
        );
    }

    #[test]
    fn should_expose_api_base_url() {
        let authenticator = authenticator(SuiteAuth::new());
        assert!(authenticator.api_base_url().is_none());

        let url = Url::parse("https://api.example/v1/").expect("valid url");
        let authenticator = authenticator.with_api_base_url(url.clone());
        assert_eq!(authenticator.api_base_url(), Some(&url));
    }

    #[tokio::test]
    async fn should_read_api_base_url_from_settings() {
        let settings = AuthSettings {
            base_url: Some("https://idp.example".to_string()),
            api_base_url: Some("https://api.example/v1/".to_string()),
            ..AuthSettings::default()
        };

        let authenticator =
            TestAuthenticator::from_settings(&settings, SuiteAuth::new()).expect("Should build");

        assert_eq!(
            authenticator.api_base_url().map(Url::as_str),
            Some("https://api.example/v1/")
        );
        assert_eq!(
            authenticator.service().identity().token_url().as_str(),
            "https://idp.example/as/token.oauth2"
        );
    }

    #[tokio::test]
    async fn should_reject_invalid_api_base_url_in_settings() {
        let settings = AuthSettings {
            base_url: Some("https://idp.example".to_string()),
            api_base_url: Some("not a url".to_string()),
            ..AuthSettings::default()
        };

        let err = TestAuthenticator::from_settings(&settings, SuiteAuth::new())
            .expect_err("Should fail");
        assert!(matches!(err, AuthConfigurationError::InvalidSetting { .. }));
    }

    #[test]
    fn should_build_sensitive_authorization_header() {
        let bearer = BearerToken::from(SecureString::from("abc.def.ghi"));

        let (name, value) = bearer.to_header().expect("Should build header");
        assert_eq!(name, AUTHORIZATION);
        assert_eq!(value.to_str().expect("ascii header"), "Bearer abc.def.ghi");
        assert!(value.is_sensitive());
    }

    #[test]
    fn should_reject_token_with_invalid_characters() {
        let bearer = BearerToken::from(SecureString::from("line\nbreak"));

        let err = bearer.to_header().expect_err("Should fail");
        assert!(matches!(err, TokenError::InvalidBearerToken { .. }));
    }

    #[test]
    fn should_redact_bearer_debug() {
        let bearer = BearerToken::from(SecureString::from("secret-token"));
        insta::assert_snapshot!(format!("{bearer:?}"), @r#"BearerToken("[REDACTED]")"#);
    }
}
