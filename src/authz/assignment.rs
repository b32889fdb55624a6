//! Role-assignment validation.

use crate::authz::roles::{RoleHierarchy, PRIVILEGE_ESCALATION_BYPASS_ROLES};
use crate::error::{Result, RiskError};

/// Validate a proposed role assignment against the subject's current
/// roles.
///
/// Two independent checks, either of which rejects:
/// 1. No pair of proposed roles may be mutually incompatible.
/// 2. Privilege escalation: unless the subject already holds `ADMIN`,
///    `SUPER_ADMIN`, or `ROOT`, every proposed role must be dominated by
///    (have a level no higher than) some role the subject already holds.
///
/// # Errors
///
/// Returns [`RiskError::InvalidAssignment`] with a human-readable reason
/// on either rejection.
pub fn validate_assignment(hierarchy: &RoleHierarchy, proposed_roles: &[String], current_roles: &[String]) -> Result<()> {
    for i in 0..proposed_roles.len() {
        for j in (i + 1)..proposed_roles.len() {
            if hierarchy.are_incompatible(&proposed_roles[i], &proposed_roles[j]) {
                return Err(RiskError::InvalidAssignment {
                    reason: format!("{} and {} are incompatible roles", proposed_roles[i], proposed_roles[j]),
                });
            }
        }
    }

    let bypasses_escalation_check = current_roles
        .iter()
        .any(|role| PRIVILEGE_ESCALATION_BYPASS_ROLES.contains(&role.as_str()));
    if bypasses_escalation_check {
        return Ok(());
    }

    for proposed in proposed_roles {
        let proposed_level = hierarchy.level_of(proposed);
        let dominated = current_roles.iter().any(|current| hierarchy.level_of(current) >= proposed_level);
        if !dominated {
            return Err(RiskError::InvalidAssignment {
                reason: format!("{proposed} would escalate privilege beyond the subject's current roles"),
            });
        }
    }

    Ok(())
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
    fn test_rejects_incompatible_pair() {
        let hierarchy = hierarchy();
        let result = validate_assignment(
            &hierarchy,
            &["SUPPORT".to_string(), "AUDITOR".to_string()],
            &["ADMIN".to_string()],
        );
        assert!(matches!(result, Err(RiskError::InvalidAssignment { .. })));
    }

    #[test]
    fn test_rejects_privilege_escalation_without_bypass_role() {
        let hierarchy = hierarchy();
        let result = validate_assignment(&hierarchy, &["ADMIN".to_string()], &["USER".to_string()]);
        assert!(matches!(result, Err(RiskError::InvalidAssignment { .. })));
    }

    #[test]
    fn test_allows_escalation_for_existing_admin() {
        let hierarchy = hierarchy();
        let result = validate_assignment(&hierarchy, &["SUPER_ADMIN".to_string()], &["ADMIN".to_string()]);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_allows_lateral_or_downward_assignment() {
        let hierarchy = hierarchy();
        let result = validate_assignment(
            &hierarchy,
            &["USER".to_string(), "SUPPORT".to_string()],
            &["SUPPORT".to_string()],
        );
        assert_eq!(result, Ok(()));
    }
}
