//! Role-based authorization primitives: role hierarchy, assignment
//! validation, and sensitive-field policy evaluation.

pub mod assignment;
pub mod policy;
pub mod roles;

pub use assignment::validate_assignment;
pub use policy::{DynamicRoleProvider, SensitiveFieldPolicy};
pub use roles::RoleHierarchy;
