//! Scope-keyed access token cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::scope::ScopeKey;
use crate::secure::SecureString;

/// Longest time an entry can stay valid, about a hundred years.
pub const MAX_ENTRY_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A cached access token with its absolute expiry instant.
///
/// Entries are immutable once created; a refetch replaces the whole entry.
#[derive(Clone)]
pub struct CacheEntry {
    token: SecureString,
    expires_at: Instant,
}

impl CacheEntry {
    /// Creates an entry expiring at the given instant.
    pub fn new(token: impl Into<SecureString>, expires_at: Instant) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Creates an entry expiring `window` from now.
    ///
    /// Windows beyond [`MAX_ENTRY_LIFETIME`] (such as `Duration::MAX`) are
    /// capped to it.
    pub fn expiring_in(token: impl Into<SecureString>, window: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(window.min(MAX_ENTRY_LIFETIME))
            .unwrap_or(now);
        Self::new(token, expires_at)
    }

    /// The cached access token.
    pub fn token(&self) -> &SecureString {
        &self.token
    }

    /// When the entry stops being served.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the entry may be served at `now` (strictly before expiry).
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Whether the entry may be served right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    /// Remaining validity, `None` once expired.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let now = Instant::now();
        self.is_valid_at(now).then(|| self.expires_at - now)
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Thread-safe mapping from [`ScopeKey`] to [`CacheEntry`].
///
/// Cloning the cache yields another handle on the same entries. Operations
/// never fail: a missing key is a miss. Validity is not maintained by the
/// cache, callers check [`CacheEntry::is_valid_at`] when they read.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    entries: Arc<RwLock<HashMap<ScopeKey, Arc<CacheEntry>>>>,
}

impl TokenCache {
    /// Creates a new empty token cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry stored for `key`, expired or not.
    pub async fn get(&self, key: &ScopeKey) -> Option<Arc<CacheEntry>> {
        let guard = self.entries.read().await;
        guard.get(key).cloned()
    }

    /// Stores `entry` for `key`, replacing any previous entry.
    pub async fn put(&self, key: ScopeKey, entry: CacheEntry) {
        let mut guard = self.entries.write().await;
        guard.insert(key, Arc::new(entry));
    }

    /// Removes the entry for `key`, returns whether one was present.
    pub async fn remove(&self, key: &ScopeKey) -> bool {
        let mut guard = self.entries.write().await;
        guard.remove(key).is_some()
    }

    /// Removes the entry for `key` only if it is still expired at `now`.
    ///
    /// An entry stored by a concurrent refetch in the meantime is kept.
    pub async fn remove_expired(&self, key: &ScopeKey, now: Instant) -> bool {
        let mut guard = self.entries.write().await;
        let expired = guard.get(key).is_some_and(|entry| !entry.is_valid_at(now));
        if expired {
            guard.remove(key);
        }
        expired
    }

    /// Removes every entry, returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut guard = self.entries.write().await;
        let count = guard.len();
        guard.clear();
        count
    }

    /// Number of stored entries, including expired ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
