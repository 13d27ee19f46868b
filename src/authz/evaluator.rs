use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use super::functions;
use super::principal::{Principal, PolicyBinding, TargetScope};
use super::schedule::ScheduleEvaluator;
use crate::models::policy::Rule;

/// Permission evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PermissionEvaluator: Send + Sync {
    /// Check whether the principal may perform `function` against `target`.
    async fn has_permission(
        &self,
        principal: &Principal,
        function: &str,
        target: &TargetScope,
    ) -> bool;
}

/// Default evaluator over the resolved principal graph.
///
/// Evaluation order:
/// 1. superadmin -> allow
/// 2. gather applicable policies (group-attached and direct, restricted to
///    the owning organization) deduplicated by policy id
/// 3. scan rules: function match (or `admin` wildcard), time window, scope
/// 4. deny
///
/// The body is pure over already-loaded data: no I/O and no await points, so
/// a decision can be recomputed per request without synchronization.
#[derive(Debug, Clone, Default)]
pub struct DefaultPermissionEvaluator {
    schedule: ScheduleEvaluator,
}

impl DefaultPermissionEvaluator {
    pub fn new() -> Self {
        Self {
            schedule: ScheduleEvaluator::from_env(),
        }
    }

    pub fn with_schedule(schedule: ScheduleEvaluator) -> Self {
        Self { schedule }
    }

    /// Same decision as [`PermissionEvaluator::has_permission`], with the
    /// evaluation instant pinned.
    pub fn has_permission_at(
        &self,
        principal: &Principal,
        function: &str,
        target: &TargetScope,
        now: DateTime<Utc>,
    ) -> bool {
        if principal.superadmin {
            tracing::debug!(
                user_id = %principal.user_id,
                function = %function,
                "superadmin bypass"
            );
            return true;
        }

        for policy in Self::applicable_policies(principal) {
            for rule in &policy.rules {
                if rule.function != function && rule.function != functions::ADMIN {
                    continue;
                }
                if !self.schedule.is_rule_accessible_at(rule, now) {
                    continue;
                }
                if Self::scope_allows(rule, target) {
                    tracing::debug!(
                        user_id = %principal.user_id,
                        function = %function,
                        policy_id = %policy.policy_id,
                        rule_id = %rule.id,
                        "rule match"
                    );
                    return true;
                }
            }
        }

        tracing::debug!(
            user_id = %principal.user_id,
            function = %function,
            "permission denied"
        );
        false
    }

    /// Policies that can grant anything to this principal: per organization
    /// membership, policies attached to the principal's groups (skipping
    /// groups whose environment belongs to a different organization) and
    /// direct attachments, both restricted to policies owned by that
    /// organization. Deduplicated by policy id; the model is allow-only, so
    /// iteration order cannot change the outcome.
    fn applicable_policies(principal: &Principal) -> Vec<&PolicyBinding> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut applicable = Vec::new();
        for org_id in &principal.organizations {
            for membership in &principal.groups {
                if let Some(env) = &membership.environment {
                    if env.organization_id != *org_id {
                        continue;
                    }
                }
                for policy in &membership.policies {
                    if policy.organization_id == *org_id && seen.insert(policy.policy_id) {
                        applicable.push(policy);
                    }
                }
            }
            for policy in &principal.policies {
                if policy.organization_id == *org_id && seen.insert(policy.policy_id) {
                    applicable.push(policy);
                }
            }
        }
        applicable
    }

    /// Hierarchical scope resolution, first matching case wins:
    /// a fully global rule allows any target; otherwise a scoped rule must
    /// hit the requested element, the element's environment, or the requested
    /// environment. A query with no target is only satisfied by a fully
    /// global rule.
    fn scope_allows(rule: &Rule, target: &TargetScope) -> bool {
        if rule.environment_id.is_none() && rule.element_id.is_none() {
            return true;
        }
        match (target.environment_id, &target.element) {
            (None, None) => false,
            (Some(env_id), None) => rule.environment_id == Some(env_id),
            (None, Some(element)) => {
                rule.element_id == Some(element.id)
                    || rule.environment_id == Some(element.environment_id)
            }
            (Some(env_id), Some(element)) => {
                rule.element_id == Some(element.id)
                    || rule.environment_id == Some(element.environment_id)
                    || rule.environment_id == Some(env_id)
            }
        }
    }
}

#[async_trait]
impl PermissionEvaluator for DefaultPermissionEvaluator {
    async fn has_permission(
        &self,
        principal: &Principal,
        function: &str,
        target: &TargetScope,
    ) -> bool {
        self.has_permission_at(principal, function, target, Utc::now())
    }
}
