use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A collection of users, either global or scoped to one environment.
///
/// An environment-scoped group inherits the organization of its environment;
/// a global group (`environment_id == None`) is not owned by any organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub environment_id: Option<Uuid>,
    /// Functions granted directly on the group, a convenience vocabulary
    /// separate from policy rules. Surfaced through the effective-permissions
    /// summary.
    pub functions: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join entity binding a user to a group, optionally narrowed to a single
/// element of the group's environment. Unique per (user, group, element).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub element_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
