//! Token service: cached client-credentials tokens keyed by scope set.
//!
//! # Example
//!
//! ```rust,no_run
//! use authspec_core::{CredentialIdentity, HttpCredentialProvider, TokenService};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = CredentialIdentity::builder("https://idp.example")?
//!     .with_client_id("client-id")
//!     .with_client_secret("client-secret")
//!     .build()?;
//! let provider = HttpCredentialProvider::new(reqwest::Client::new());
//! let service = TokenService::builder(identity, provider).build();
//!
//! // First call hits the token endpoint, the second one is served from the cache
//! let token = service.get_token(["read", "write"], false).await?;
//! let again = service.get_token(["write", "read"], false).await?;
//! assert_eq!(token, again);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::cache::{CacheEntry, TokenCache};
use crate::error::{AuthConfigurationError, TokenError};
use crate::identity::{ClientCredentials, CredentialIdentity};
use crate::provider::{CredentialProvider, HttpCredentialProvider};
use crate::resolver::EffectiveTestConfig;
use crate::scope::{ScopeKey, ScopeSet};
use crate::secure::SecureString;
use crate::settings::AuthSettings;

/// Default time a fetched token is served from the cache (55 minutes).
///
/// Shorter than the usual one hour token lifetime, so that a cached token does
/// not expire in the middle of a test.
pub const DEFAULT_CACHE_WINDOW: Duration = Duration::from_secs(55 * 60);

/// Default margin subtracted from a reported `expires_in`.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Obtains access tokens and caches them per [`ScopeKey`].
///
/// The service is explicitly constructed and cheap to clone: clones share the
/// same cache. It is safe to call from many tasks at once. Concurrent cache
/// misses for the same scope key are coalesced into a single exchange.
pub struct TokenService<P = HttpCredentialProvider> {
    inner: Arc<ServiceInner<P>>,
}

struct ServiceInner<P> {
    identity: CredentialIdentity,
    provider: P,
    cache: TokenCache,
    cache_window: Duration,
    expiry_skew: Duration,
    flights: Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>,
}

impl<P> Clone for TokenService<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for TokenService<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("identity", &self.inner.identity)
            .field("cache", &self.inner.cache)
            .field("cache_window", &self.inner.cache_window)
            .field("expiry_skew", &self.inner.expiry_skew)
            .finish_non_exhaustive()
    }
}

impl TokenService<HttpCredentialProvider> {
    /// Creates a service talking HTTP to the token endpoint described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or endpoint is missing or invalid, or if
    /// the HTTP client cannot be built. Missing client credentials are reported
    /// later, when a token is requested.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthConfigurationError> {
        let identity = settings.identity()?;
        let provider = settings.provider()?;
        Ok(Self::builder(identity, provider).build())
    }
}

impl<P> TokenService<P>
where
    P: CredentialProvider,
{
    /// Creates a builder for a service using `provider` for exchanges.
    pub fn builder(identity: CredentialIdentity, provider: P) -> TokenServiceBuilder<P> {
        TokenServiceBuilder::new(identity, provider)
    }

    /// The identity used for exchanges.
    pub fn identity(&self) -> &CredentialIdentity {
        &self.inner.identity
    }

    /// The provider performing exchanges.
    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// The underlying cache.
    pub fn cache(&self) -> &TokenCache {
        &self.inner.cache
    }

    /// Returns a token for `scopes`.
    ///
    /// Unless `bypass_cache` is set, a valid cached token for the same scope set
    /// (in any order) is returned without a network call. Otherwise, or on a
    /// miss, a new token is exchanged and stored, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Configuration`] if the client id or secret is
    /// missing, [`TokenError::Exchange`] if the token endpoint fails. Nothing is
    /// cached on failure.
    pub async fn get_token<I>(&self, scopes: I, bypass_cache: bool) -> Result<SecureString, TokenError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let scopes = scopes.into_iter().collect::<ScopeSet>();
        self.token_for(&scopes, bypass_cache).await
    }

    /// Returns a token for a resolved test configuration.
    ///
    /// # Errors
    ///
    /// See [`TokenService::get_token`].
    pub async fn token_for_test(&self, config: &EffectiveTestConfig) -> Result<SecureString, TokenError> {
        self.token_for(&config.scopes, config.bypass_cache).await
    }

    /// Returns a token for a scope set.
    ///
    /// # Errors
    ///
    /// See [`TokenService::get_token`].
    pub async fn token_for(&self, scopes: &ScopeSet, bypass_cache: bool) -> Result<SecureString, TokenError> {
        let credentials = self.inner.identity.credentials()?;
        let key = scopes.key();

        if bypass_cache {
            debug!(%scopes, "bypassing token cache as requested");
        } else if let Some(token) = self.cached(&key, scopes).await {
            return Ok(token);
        }

        let flight = self.flight(&key).await;
        let result = {
            let _in_flight = flight.lock().await;
            self.fetch_in_flight(&key, scopes, &credentials, bypass_cache).await
        };
        self.release_flight(&key, flight).await;
        result
    }

    async fn fetch_in_flight(
        &self,
        key: &ScopeKey,
        scopes: &ScopeSet,
        credentials: &ClientCredentials<'_>,
        bypass_cache: bool,
    ) -> Result<SecureString, TokenError> {
        // Another caller may have stored a token while we were waiting
        if !bypass_cache
            && let Some(entry) = self.inner.cache.get(key).await
            && entry.is_valid()
        {
            debug!(%scopes, "using token fetched by a concurrent caller");
            return Ok(entry.token().clone());
        }

        info!(%scopes, "fetching new access token");
        let issued = self
            .inner
            .provider
            .exchange(credentials, scopes.to_scope_param().as_deref())
            .await
            .inspect_err(|error| error!(%scopes, %error, "failed to retrieve access token"))?;

        let window = self.cache_window_for(issued.expires_in());
        let entry = CacheEntry::expiring_in(issued.into_access_token(), window);
        let token = entry.token().clone();
        self.inner.cache.put(key.clone(), entry).await;

        info!(%scopes, ?window, "access token retrieved and cached");
        Ok(token)
    }

    /// Drops the cached token for `scopes`, returns whether one was cached.
    pub async fn invalidate<I>(&self, scopes: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let scopes = scopes.into_iter().collect::<ScopeSet>();
        let removed = self.inner.cache.remove(&scopes.key()).await;
        if removed {
            info!(%scopes, "invalidated cached access token");
        }
        removed
    }

    /// Drops every cached token, returns how many were cached.
    pub async fn invalidate_all(&self) -> usize {
        let count = self.inner.cache.clear().await;
        self.inner
            .flights
            .lock()
            .await
            .retain(|_, flight| Arc::strong_count(flight) > 1);
        info!(count, "invalidated all cached access tokens");
        count
    }

    async fn cached(&self, key: &ScopeKey, scopes: &ScopeSet) -> Option<SecureString> {
        let entry = self.inner.cache.get(key).await?;
        let now = Instant::now();
        if entry.is_valid_at(now) {
            debug!(%scopes, "using cached access token");
            return Some(entry.token().clone());
        }

        debug!(%scopes, "cached access token expired, fetching a new one");
        self.inner.cache.remove_expired(key, now).await;
        None
    }

    async fn flight(&self, key: &ScopeKey) -> Arc<Mutex<()>> {
        let mut flights = self.inner.flights.lock().await;
        Arc::clone(flights.entry(key.clone()).or_default())
    }

    // Guards are only cloned under the `flights` lock, so a count of two
    // (the map and `flight`) means no other caller is waiting on this key
    async fn release_flight(&self, key: &ScopeKey, flight: Arc<Mutex<()>>) {
        let mut flights = self.inner.flights.lock().await;
        if Arc::strong_count(&flight) == 2 {
            flights.remove(key);
        }
    }

    #[cfg(test)]
    async fn flight_count(&self) -> usize {
        self.inner.flights.lock().await.len()
    }

    // The fixed window is an upper bound: a shorter reported lifetime wins
    fn cache_window_for(&self, expires_in: Option<Duration>) -> Duration {
        match expires_in {
            Some(lifetime) => self
                .inner
                .cache_window
                .min(lifetime.saturating_sub(self.inner.expiry_skew)),
            None => self.inner.cache_window,
        }
    }
}

/// Builder for [`TokenService`].
pub struct TokenServiceBuilder<P> {
    identity: CredentialIdentity,
    provider: P,
    cache: TokenCache,
    cache_window: Duration,
    expiry_skew: Duration,
}

impl<P> TokenServiceBuilder<P>
where
    P: CredentialProvider,
{
    fn new(identity: CredentialIdentity, provider: P) -> Self {
        Self {
            identity,
            provider,
            cache: TokenCache::new(),
            cache_window: DEFAULT_CACHE_WINDOW,
            expiry_skew: DEFAULT_EXPIRY_SKEW,
        }
    }

    /// Sets how long a fetched token is served from the cache.
    #[must_use]
    pub fn with_cache_window(mut self, window: Duration) -> Self {
        self.cache_window = window;
        self
    }

    /// Sets the margin subtracted from a lifetime reported by the token endpoint.
    #[must_use]
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    /// Uses an existing cache instead of a new empty one.
    #[must_use]
    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        self.cache = cache;
        self
    }

    /// Builds the service.
    pub fn build(self) -> TokenService<P> {
        let inner = ServiceInner {
            identity: self.identity,
            provider: self.provider,
            cache: self.cache,
            cache_window: self.cache_window,
            expiry_skew: self.expiry_skew,
            flights: Mutex::default(),
        };
        TokenService {
            inner: Arc::new(inner),
        }
    }
}

impl<P> fmt::Debug for TokenServiceBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenServiceBuilder")
            .field("identity", &self.identity)
            .field("cache_window", &self.cache_window)
            .field("expiry_skew", &self.expiry_skew)
            .finish_non_exhaustive()
    }
}
