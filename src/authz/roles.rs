//! `RoleHierarchy` — numeric-level dominance and incompatibility tables.

use std::collections::{HashMap, HashSet};

use crate::ids::UserId;

/// Roles that bypass the privilege-escalation check in
/// [`crate::authz::assignment::validate_assignment`]: a subject already
/// holding one of these may propose any role set, incompatibility aside.
pub const PRIVILEGE_ESCALATION_BYPASS_ROLES: &[&str] = &["ADMIN", "SUPER_ADMIN", "ROOT"];

/// A numeric dominance level per role name, plus a symmetric
/// incompatibility table.
///
/// Role names are compared exactly as given — this crate does not
/// normalize case or a `ROLE_` prefix here (that normalization is
/// [`crate::authz::policy`]'s concern for the separate sensitive-data
/// policy check). Construct with [`RoleHierarchy::new`] and the `with_*`
/// builders, mirroring [`crate::config::DeviceFingerprintConfig`]'s style.
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    levels: HashMap<String, u32>,
    incompatible: HashMap<String, HashSet<String>>,
}

impl RoleHierarchy {
    /// An empty hierarchy: every role has level 0 and no incompatibilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role's numeric dominance level. Higher is more
    /// privileged.
    #[must_use]
    pub fn with_level(mut self, role: impl Into<String>, level: u32) -> Self {
        self.levels.insert(role.into(), level);
        self
    }

    /// Register a symmetric incompatibility between two roles — neither
    /// may be held alongside the other in the same proposed assignment.
    #[must_use]
    pub fn with_incompatible(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        let a = a.into();
        let b = b.into();
        self.incompatible.entry(a.clone()).or_default().insert(b.clone());
        self.incompatible.entry(b).or_default().insert(a);
        self
    }

    /// The dominance level of `role`, or `0` if unregistered (the
    /// lowest rank).
    #[must_use]
    pub fn level_of(&self, role: &str) -> u32 {
        self.levels.get(role).copied().unwrap_or(0)
    }

    /// The highest dominance level among `roles`, or `0` if `roles` is
    /// empty or holds only unregistered names.
    #[must_use]
    pub fn highest_level(&self, roles: &[String]) -> u32 {
        roles.iter().map(|r| self.level_of(r)).max().unwrap_or(0)
    }

    /// Whether `a` and `b` are registered as mutually incompatible.
    #[must_use]
    pub fn are_incompatible(&self, a: &str, b: &str) -> bool {
        self.incompatible.get(a).is_some_and(|set| set.contains(b))
    }

    /// `hasRole(subject, role)` — exact membership.
    #[must_use]
    pub fn has_role(&self, subject_roles: &[String], role: &str) -> bool {
        subject_roles.iter().any(|r| r == role)
    }

    /// `hasAnyRole(subject, roles)`.
    #[must_use]
    pub fn has_any_role(&self, subject_roles: &[String], roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(subject_roles, role))
    }

    /// `hasMinimumRole(subject, role)`: true iff some role the subject
    /// holds has a dominance level at least that of `role`.
    #[must_use]
    pub fn has_minimum_role(&self, subject_roles: &[String], role: &str) -> bool {
        self.highest_level(subject_roles) >= self.level_of(role)
    }

    /// `canManage(manager, target)` — true iff the two subjects are the
    /// same identity, or the manager's highest dominance level strictly
    /// exceeds the target's.
    #[must_use]
    pub fn can_manage(
        &self,
        manager_id: UserId,
        manager_roles: &[String],
        target_id: UserId,
        target_roles: &[String],
    ) -> bool {
        manager_id == target_id || self.highest_level(manager_roles) > self.highest_level(target_roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> RoleHierarchy {
        RoleHierarchy::new()
            .with_level("USER", 0)
            .with_level("SUPPORT", 10)
            .with_level("ADMIN", 20)
            .with_level("SUPER_ADMIN", 30)
            .with_incompatible("SUPPORT", "AUDITOR")
    }

    #[test]
    fn test_has_minimum_role_uses_highest_held_level() {
        let hierarchy = hierarchy();
        let subject = vec!["USER".to_string(), "ADMIN".to_string()];
        assert!(hierarchy.has_minimum_role(&subject, "SUPPORT"));
        assert!(!hierarchy.has_minimum_role(&subject, "SUPER_ADMIN"));
    }

    #[test]
    fn test_incompatibility_is_symmetric() {
        let hierarchy = hierarchy();
        assert!(hierarchy.are_incompatible("SUPPORT", "AUDITOR"));
        assert!(hierarchy.are_incompatible("AUDITOR", "SUPPORT"));
        assert!(!hierarchy.are_incompatible("SUPPORT", "ADMIN"));
    }

    #[test]
    fn test_can_manage_self_regardless_of_level() {
        let hierarchy = hierarchy();
        let user = UserId::new();
        assert!(hierarchy.can_manage(user, &["USER".to_string()], user, &["ADMIN".to_string()]));
    }

    #[test]
    fn test_can_manage_requires_strictly_higher_level_for_others() {
        let hierarchy = hierarchy();
        let admin = UserId::new();
        let support = UserId::new();
        assert!(hierarchy.can_manage(admin, &["ADMIN".to_string()], support, &["SUPPORT".to_string()]));
        assert!(!hierarchy.can_manage(support, &["SUPPORT".to_string()], admin, &["ADMIN".to_string()]));
        assert!(!hierarchy.can_manage(admin, &["ADMIN".to_string()], support, &["ADMIN".to_string()]));
    }
}
