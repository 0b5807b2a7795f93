//! Per-test resolution of OAuth scopes and cache bypass.
//!
//! Authentication requirements are declared as plain data at two levels:
//! once for the whole suite, and optionally per test. The test level wins
//! for scopes when it declares at least one scope; a bypass directive at
//! either level forces a fresh token.
//!
//! ```rust
//! use authspec_core::{AuthDeclaration, SuiteAuth};
//!
//! let suite = SuiteAuth::new()
//!     .with_scopes(["read", "write"])
//!     .with_test("admin_can_delete", AuthDeclaration::new().with_scopes(["admin"]))
//!     .with_test("fresh_token", AuthDeclaration::new().bypass_cache());
//!
//! let admin = suite.resolve("admin_can_delete");
//! assert_eq!(admin.scopes.to_scope_param().as_deref(), Some("admin"));
//! assert!(!admin.bypass_cache);
//!
//! let fresh = suite.resolve("fresh_token");
//! assert_eq!(fresh.scopes.to_scope_param().as_deref(), Some("read write"));
//! assert!(fresh.bypass_cache);
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::scope::ScopeSet;

/// Authentication requirements declared at one attachment point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthDeclaration {
    scopes: Vec<String>,
    bypass_cache: bool,
}

impl AuthDeclaration {
    /// A declaration with no scope and no bypass directive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds scopes to the declaration.
    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Adds the bypass-cache directive.
    #[must_use]
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// The declared scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Whether the bypass-cache directive is present.
    pub fn bypasses_cache(&self) -> bool {
        self.bypass_cache
    }
}

/// The authentication settings that apply to one test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveTestConfig {
    /// Scopes to request.
    pub scopes: ScopeSet,
    /// Whether a fresh token must be fetched.
    pub bypass_cache: bool,
}

/// Applies the test-overrides-suite precedence to two declarations.
///
/// Scopes and bypass are decided independently:
/// - non-empty test-level scopes replace the suite-level ones (no merge),
///   otherwise the suite-level scopes apply, otherwise no scope;
/// - bypass is `true` if declared at either level.
pub fn resolve_declarations(
    suite: Option<&AuthDeclaration>,
    test: Option<&AuthDeclaration>,
) -> EffectiveTestConfig {
    let scopes = [test, suite]
        .into_iter()
        .flatten()
        .map(AuthDeclaration::scopes)
        .find(|scopes| !scopes.is_empty())
        .map(|scopes| scopes.iter().collect::<ScopeSet>())
        .unwrap_or_default();

    let bypass_cache = [test, suite]
        .into_iter()
        .flatten()
        .any(AuthDeclaration::bypasses_cache);

    EffectiveTestConfig {
        scopes,
        bypass_cache,
    }
}

/// Suite-level declaration plus the test-level declarations of its tests.
///
/// Built once when tests are registered and queried by test identifier.
#[derive(Debug, Clone, Default)]
pub struct SuiteAuth {
    suite: Option<AuthDeclaration>,
    tests: HashMap<String, AuthDeclaration>,
}

impl SuiteAuth {
    /// A suite without any declaration: tests run with no scope and use the cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds suite-level scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let declaration = self.suite.take().unwrap_or_default().with_scopes(scopes);
        self.suite = Some(declaration);
        self
    }

    /// Adds the suite-level bypass-cache directive.
    #[must_use]
    pub fn bypass_cache(mut self) -> Self {
        let declaration = self.suite.take().unwrap_or_default().bypass_cache();
        self.suite = Some(declaration);
        self
    }

    /// Declares the requirements of a single test, replacing a previous declaration.
    #[must_use]
    pub fn with_test(mut self, test_id: impl Into<String>, declaration: AuthDeclaration) -> Self {
        self.tests.insert(test_id.into(), declaration);
        self
    }

    /// The suite-level declaration, if any.
    pub fn suite_declaration(&self) -> Option<&AuthDeclaration> {
        self.suite.as_ref()
    }

    /// The declaration of a test, if any.
    pub fn test_declaration(&self, test_id: &str) -> Option<&AuthDeclaration> {
        self.tests.get(test_id)
    }

    /// Resolves the effective configuration of a test.
    ///
    /// Unknown tests get the suite-level configuration; never fails.
    pub fn resolve(&self, test_id: &str) -> EffectiveTestConfig {
        let config = resolve_declarations(self.suite.as_ref(), self.tests.get(test_id));
        debug!(
            test_id,
            scopes = %config.scopes,
            bypass_cache = config.bypass_cache,
            "resolved test authentication"
        );
        config
    }
}
