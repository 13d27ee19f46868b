//! Authorization module - Policy Engine
//!
//! This module implements the scope-aware permission engine with support for:
//! - Organization/environment/element hierarchical scope resolution
//! - Policy rules with optional cron-pair time windows
//! - The `admin` wildcard function
//! - Superadmin bypass
//! - Configurable handling of unreadable schedules (fail closed/open)

mod evaluator;
mod principal;
pub mod schedule;

pub use evaluator::{DefaultPermissionEvaluator, PermissionEvaluator};
pub use principal::{EnvironmentRef, GroupMembership, PolicyBinding, Principal, TargetScope};
pub use schedule::{AccessSchedule, ScheduleEvaluator, ScheduleFailurePolicy};

/// Well-known function names
pub mod functions {
    /// Wildcard granting every function under the rule's scope.
    pub const ADMIN: &str = "admin";

    // Element
    pub const ELEMENT_CREATE: &str = "element:create";
    pub const ELEMENT_READ: &str = "element:read";
    pub const ELEMENT_UPDATE: &str = "element:update";
    pub const ELEMENT_DELETE: &str = "element:delete";

    // Environment
    pub const ENVIRONMENT_CREATE: &str = "environment:create";
    pub const ENVIRONMENT_READ: &str = "environment:read";
    pub const ENVIRONMENT_UPDATE: &str = "environment:update";
    pub const ENVIRONMENT_DELETE: &str = "environment:delete";

    // Organization
    pub const ORGANIZATION_READ: &str = "organization:read";
    pub const ORGANIZATION_UPDATE: &str = "organization:update";

    // Group
    pub const GROUP_CREATE: &str = "group:create";
    pub const GROUP_READ: &str = "group:read";
    pub const GROUP_UPDATE: &str = "group:update";
    pub const GROUP_DELETE: &str = "group:delete";

    // Policy
    pub const POLICY_CREATE: &str = "policy:create";
    pub const POLICY_READ: &str = "policy:read";
    pub const POLICY_UPDATE: &str = "policy:update";
    pub const POLICY_DELETE: &str = "policy:delete";

    // Tag
    pub const TAG_ASSIGN: &str = "tag:assign";
    pub const TAG_READ: &str = "tag:read";

    // User
    pub const USER_READ: &str = "user:read";
    pub const USER_MANAGE: &str = "user:manage";

    /// Vocabulary seeded into the directory at construction. Rule creation
    /// validates against the registered set plus [`ADMIN`].
    pub const BUILT_IN: &[&str] = &[
        ELEMENT_CREATE,
        ELEMENT_READ,
        ELEMENT_UPDATE,
        ELEMENT_DELETE,
        ENVIRONMENT_CREATE,
        ENVIRONMENT_READ,
        ENVIRONMENT_UPDATE,
        ENVIRONMENT_DELETE,
        ORGANIZATION_READ,
        ORGANIZATION_UPDATE,
        GROUP_CREATE,
        GROUP_READ,
        GROUP_UPDATE,
        GROUP_DELETE,
        POLICY_CREATE,
        POLICY_READ,
        POLICY_UPDATE,
        POLICY_DELETE,
        TAG_ASSIGN,
        TAG_READ,
        USER_READ,
        USER_MANAGE,
    ];
}
