//! OAuth scope sets and their canonical cache keys.
//!
//! A [`ScopeSet`] is what a test asks for; a [`ScopeKey`] is how the token
//! cache indexes it. Two requests for the same scopes in a different order,
//! or with repeated entries, share one key and therefore one cached token.
//!
//! ```rust
//! use authspec_core::{ScopeSet, canonicalize};
//!
//! let requested = ScopeSet::from_iter(["write", "read", "write"]);
//! assert_eq!(requested.to_scope_param().as_deref(), Some("write read"));
//! assert_eq!(requested.key(), canonicalize(["read", "write"]));
//! assert_eq!(canonicalize(["read", "write"]).as_str(), "read write");
//! ```

use std::collections::BTreeSet;
use std::fmt;

/// Canonical, order-independent cache key for a set of scopes.
///
/// The key is the de-duplicated scopes sorted lexicographically and joined
/// with a single space. The empty set maps to the empty string. Keys are
/// only used to index the token cache, they are never sent over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// The key of the empty scope set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the key of the empty scope set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ScopeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes the canonical [`ScopeKey`] of a scope collection.
///
/// The input is only borrowed; duplicates and ordering do not affect the result.
pub fn canonicalize<I>(scopes: I) -> ScopeKey
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let sorted = scopes
        .into_iter()
        .map(|scope| scope.as_ref().to_owned())
        .collect::<BTreeSet<_>>();
    let key = sorted.into_iter().collect::<Vec<_>>().join(" ");
    ScopeKey(key)
}

/// Same as [`canonicalize`], treating an absent collection as empty.
pub fn canonicalize_optional<I>(scopes: Option<I>) -> ScopeKey
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    scopes.map_or_else(ScopeKey::empty, canonicalize)
}

/// A set of OAuth scopes as requested by a caller.
///
/// Scopes are case-sensitive. The set keeps the first-seen order of the
/// caller (used for the `scope` request parameter) and silently drops
/// duplicates. Equality ignores ordering.
#[derive(Debug, Clone, Default)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Creates an empty scope set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scope if it is not already present.
    pub fn insert(&mut self, scope: impl AsRef<str>) -> bool {
        let scope = scope.as_ref();
        if self.0.iter().any(|existing| existing == scope) {
            return false;
        }
        self.0.push(scope.to_owned());
        true
    }

    /// Returns `true` if the set holds no scope.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct scopes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the scopes in request order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The cache key of this set.
    pub fn key(&self) -> ScopeKey {
        canonicalize(&self.0)
    }

    /// The value of the `scope` token request parameter.
    ///
    /// Scopes are joined with a single space in request order; `None` for an
    /// empty set, in which case the parameter must be omitted.
    pub fn to_scope_param(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.join(" "))
    }
}

impl PartialEq for ScopeSet {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScopeSet {}

impl<S> FromIterator<S> for ScopeSet
where
    S: AsRef<str>,
{
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut result = Self::new();
        for scope in iter {
            result.insert(scope);
        }
        result
    }
}

impl<'a> IntoIterator for &'a ScopeSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&self.0.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::ordered(&["a", "b", "c"])]
    #[case::reversed(&["c", "b", "a"])]
    #[case::shuffled(&["b", "c", "a"])]
    #[case::duplicated(&["c", "a", "b", "a", "c"])]
    fn should_produce_same_key_for_any_permutation(#[case] scopes: &[&str]) {
        assert_eq!(canonicalize(scopes).as_str(), "a b c");
    }

    #[test]
    fn should_map_empty_and_absent_scopes_to_empty_key() {
        let empty: [&str; 0] = [];
        assert_eq!(canonicalize(empty).as_str(), "");
        assert_eq!(canonicalize_optional(None::<Vec<String>>).as_str(), "");
        assert!(canonicalize_optional(Some(Vec::<String>::new())).is_empty());
    }

    #[test]
    fn should_not_mutate_input() {
        let scopes = vec!["write".to_string(), "read".to_string()];
        let key = canonicalize(&scopes);

        assert_eq!(key.as_str(), "read write");
        assert_eq!(scopes, vec!["write", "read"]);
    }

    #[test]
    fn should_keep_scopes_case_sensitive() {
        assert_ne!(canonicalize(["Read"]), canonicalize(["read"]));
        assert_eq!(canonicalize(["b", "B", "a"]).as_str(), "B a b");
    }

    #[test]
    fn should_keep_request_order_without_duplicates() {
        let scopes = ScopeSet::from_iter(["write", "read", "write"]);

        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes.iter().collect::<Vec<_>>(), vec!["write", "read"]);
        assert_eq!(scopes.to_scope_param().as_deref(), Some("write read"));
        assert_eq!(scopes.key().as_str(), "read write");
    }

    #[test]
    fn should_omit_scope_param_for_empty_set() {
        assert_eq!(ScopeSet::new().to_scope_param(), None);
    }

    #[test]
    fn should_compare_scope_sets_regardless_of_order() {
        assert_eq!(
            ScopeSet::from_iter(["read", "write"]),
            ScopeSet::from_iter(["write", "read"])
        );
        assert_ne!(ScopeSet::from_iter(["read"]), ScopeSet::new());
    }

    #[test]
    fn should_display_scope_set() {
        insta::assert_snapshot!(ScopeSet::from_iter(["read", "write"]), @"read, write");
        insta::assert_snapshot!(ScopeSet::new(), @"none");
    }
}
