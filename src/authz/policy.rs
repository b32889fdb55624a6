//! Sensitive-data field/type authorization policy.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

/// Strip a leading `ROLE_` prefix; otherwise return the role unchanged.
/// Comparisons are case-sensitive and prefix-normalized, so `ADMIN` and
/// `ROLE_ADMIN` both denote the same authority — only the prefix is
/// normalized, case is not folded.
fn normalize_role(role: &str) -> &str {
    role.strip_prefix("ROLE_").unwrap_or(role)
}

/// Supplies additional authorities at evaluation time — e.g. "the owner
/// of this resource" — beyond a field's statically-annotated role set.
/// Used behind `Arc`, so the method returns a boxed future for object
/// safety, matching the rest of [`crate::adapters`].
pub trait DynamicRoleProvider: Send + Sync {
    /// Resolve the dynamic authorities applicable to the current
    /// evaluation.
    ///
    /// # Errors
    ///
    /// Any error here makes the whole policy fail-closed —
    /// [`SensitiveFieldPolicy::authorize`] treats a dynamic-provider
    /// error as "deny", not "ignore".
    fn roles(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>>;
}

/// A field or type's authorization policy: the union of a fixed static
/// role set and an optional dynamic provider, annotated with a set of
/// static role names and optionally a dynamic-role provider.
pub struct SensitiveFieldPolicy {
    static_roles: Vec<String>,
    dynamic: Option<Arc<dyn DynamicRoleProvider>>,
}

impl SensitiveFieldPolicy {
    /// A policy with only a static role set.
    #[must_use]
    pub fn new(static_roles: Vec<String>) -> Self {
        Self {
            static_roles,
            dynamic: None,
        }
    }

    /// Attach a dynamic-role provider, returning `self` for chaining.
    #[must_use]
    pub fn with_dynamic_provider(mut self, provider: Arc<dyn DynamicRoleProvider>) -> Self {
        self.dynamic = Some(provider);
        self
    }

    /// Whether `subject_roles` grants access: the subject's authorities
    /// must intersect the union of the static and (if present) dynamic
    /// role sets, after prefix normalization.
    ///
    /// Fail-closed: if the dynamic provider errors, this returns `false`
    /// rather than falling back to the static set alone.
    pub async fn authorize(&self, subject_roles: &[String]) -> bool {
        let mut authorized: HashSet<&str> = self.static_roles.iter().map(|r| normalize_role(r)).collect();

        let mut dynamic_owned: Vec<String> = Vec::new();
        if let Some(provider) = &self.dynamic {
            match provider.roles().await {
                Ok(roles) => dynamic_owned = roles,
                Err(err) => {
                    tracing::warn!(error = %err, "dynamic role provider failed, denying access");
                    return false;
                }
            }
        }
        authorized.extend(dynamic_owned.iter().map(|r| normalize_role(r)));

        subject_roles.iter().any(|role| authorized.contains(normalize_role(role)))
    }
}
