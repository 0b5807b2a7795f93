//! Secret values (client secrets, access tokens).
//!
//! Secrets end up in logs, error messages and assertion failures far more
//! often than in requests, so formatting never prints them.

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

const PREVIEW_CHARS: usize = 4;

/// A secret string, wiped from memory when dropped.
///
/// `Debug` prints `SecureString("[REDACTED]")`. `Display` prints a preview
/// made of the first and last four characters, or `***` for secrets too
/// short to hide anything.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Takes ownership of a secret.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// The secret in clear, for the request that needs it.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty, which counts as not configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn preview(value: &str) -> String {
        let count = value.chars().count();
        if count <= 2 * PREVIEW_CHARS {
            return "***".to_string();
        }
        let head = value.chars().take(PREVIEW_CHARS).collect::<String>();
        let tail = value
            .chars()
            .skip(count - PREVIEW_CHARS)
            .collect::<String>();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecureString").field(&"[REDACTED]").finish()
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::preview(&self.0))
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}
