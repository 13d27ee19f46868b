use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// POLICY
// =============================================================================

/// A named bundle of rules owned by exactly one organization, attachable to
/// users, groups and tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// RULE
// =============================================================================

/// A single allow clause: one function, an optional environment or element
/// scope, and an optional recurring time window. Rules never express deny.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub policy_id: Uuid,
    /// Function name, or the `admin` wildcard.
    pub function: String,
    /// Some = rule applies inside this environment. None together with a null
    /// element makes the rule global.
    pub environment_id: Option<Uuid>,
    /// Some = rule applies to this element only.
    pub element_id: Option<Uuid>,
    /// Optional time window: a `{"start", "end"}` cron pair, either as a JSON
    /// object or as a JSON-encoded string of the same shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_schedule: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleCreateRequest {
    pub function: String,
    #[serde(default)]
    pub environment_id: Option<Uuid>,
    #[serde(default)]
    pub element_id: Option<Uuid>,
    #[serde(default)]
    pub access_schedule: Option<Value>,
}

// =============================================================================
// EFFECTIVE PERMISSIONS (computed)
// =============================================================================

#[derive(Debug, Serialize)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub superadmin: bool,
    pub functions: Vec<EffectiveFunction>,
}

#[derive(Debug, Serialize)]
pub struct EffectiveFunction {
    pub function: String,
    /// Where the grant comes from: "group-policy", "direct-policy" or
    /// "group-function".
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<Uuid>,
}
