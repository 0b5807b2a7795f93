//! # Authspec Core
//!
//! OAuth2 client-credentials tokens for API test suites, cached per scope set.
//!
//! Tests of an API protected by OAuth2 usually need a bearer token, often with
//! different scopes from one test to another. Fetching a token for every test
//! is slow and hammers the identity provider; this crate fetches each distinct
//! scope set once and reuses the token while it is fresh.
//!
//! - **[`TokenService`]** - fetches and caches tokens, keyed by [`ScopeKey`]
//! - **[`SuiteAuth`]** - suite-level and test-level scope / bypass declarations
//! - **[`TestAuthenticator`]** - resolves a test's declarations into a [`BearerToken`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use authspec_core::{AuthDeclaration, AuthSettings, SuiteAuth, TestAuthenticator, TokenService};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // AUTHSPEC_BASE_URL, AUTHSPEC_CLIENT_ID, AUTHSPEC_CLIENT_SECRET, ...
//! let settings = AuthSettings::from_env()?;
//! let service = TokenService::from_settings(&settings)?;
//!
//! let suite = SuiteAuth::new()
//!     .with_scopes(["orders:read"])
//!     .with_test("create_order", AuthDeclaration::new().with_scopes(["orders:write"]))
//!     .with_test("token_rotation", AuthDeclaration::new().bypass_cache());
//! let authenticator = TestAuthenticator::new(service, suite);
//!
//! let (name, value) = authenticator.authorize("create_order").await?.to_header()?;
//! # let _ = (name, value);
//! # Ok(())
//! # }
//! ```
//!
//! ## Caching
//!
//! - The cache key is the sorted, de-duplicated scope set: `["b", "a"]` and
//!   `["a", "b"]` share one token. The `scope` request parameter keeps the
//!   caller's order.
//! - A token is served for [`DEFAULT_CACHE_WINDOW`] (55 minutes), or less when
//!   the token endpoint reports a shorter `expires_in`.
//! - Concurrent misses for the same scope set trigger a single exchange.
//! - Failed exchanges are never cached.
//! - [`TokenService::invalidate`] and [`TokenService::invalidate_all`] drop
//!   cached tokens explicitly.
//!
//! ## Custom providers
//!
//! [`HttpCredentialProvider`] posts the standard form-encoded request. Any
//! other exchange mechanism (or an in-memory double) implements
//! [`CredentialProvider`].
//!
//! ## Logging
//!
//! The crate logs with [`tracing`] and never logs secrets. Install a
//! subscriber to see cache hits, misses and exchanges.
//!
//! ## Features
//!
//! - `yaml`: [`AuthSettings::from_yaml`] loads settings from a YAML document.

mod cache;
mod error;
mod harness;
mod identity;
mod provider;
mod resolver;
mod scope;
mod secure;
mod service;
mod settings;

pub use self::cache::{CacheEntry, MAX_ENTRY_LIFETIME, TokenCache};
pub use self::error::{AuthConfigurationError, TokenError, TokenExchangeError};
pub use self::harness::{BearerToken, TestAuthenticator};
pub use self::identity::{
    ClientCredentials, CredentialIdentity, CredentialIdentityBuilder, DEFAULT_GRANT_TYPE,
    DEFAULT_TOKEN_ENDPOINT,
};
pub use self::provider::{CredentialProvider, HttpCredentialProvider, IssuedToken};
pub use self::resolver::{AuthDeclaration, EffectiveTestConfig, SuiteAuth, resolve_declarations};
pub use self::scope::{ScopeKey, ScopeSet, canonicalize, canonicalize_optional};
pub use self::secure::SecureString;
pub use self::service::{
    DEFAULT_CACHE_WINDOW, DEFAULT_EXPIRY_SKEW, TokenService, TokenServiceBuilder,
};
pub use self::settings::{AuthSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
