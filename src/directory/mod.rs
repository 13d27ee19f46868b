//! In-memory entity directory.
//!
//! Owns the organization -> environment -> element graph together with
//! groups, policies, rules, users and tags, and keeps the structural
//! invariants: cascade deletes for owned rows, (user, group, element)
//! assignment uniqueness, the function vocabulary for rule creation, and the
//! reference-counted tag lifecycle (see `tags.rs`). Every mutation runs under
//! one write lock, so multi-step sequences like detach-then-maybe-delete are
//! atomic with respect to each other.

mod tags;

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::authz::{
    functions, EnvironmentRef, GroupMembership, PermissionEvaluator, PolicyBinding, Principal,
    TargetScope,
};
use crate::errors::{DomainError, DomainResult};
use crate::models::element::{Element, ElementResource, ElementUpdateRequest};
use crate::models::group::{Group, UserAssignment};
use crate::models::org::{Environment, Organization};
use crate::models::policy::{
    EffectiveFunction, EffectivePermissions, Policy, Rule, RuleCreateRequest,
};
use crate::models::tag::{Tag, TagSubject};
use crate::models::user::User;

pub struct Directory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    organizations: HashMap<Uuid, Organization>,
    environments: HashMap<Uuid, Environment>,
    elements: HashMap<Uuid, Element>,
    groups: HashMap<Uuid, Group>,
    policies: HashMap<Uuid, Policy>,
    rules: HashMap<Uuid, Rule>,
    users: HashMap<Uuid, User>,
    /// Registered function vocabulary; rule creation validates against it.
    functions: BTreeSet<String>,
    /// (user_id, organization_id)
    memberships: HashSet<(Uuid, Uuid)>,
    assignments: HashMap<Uuid, UserAssignment>,
    /// (group_id, policy_id)
    group_policies: HashSet<(Uuid, Uuid)>,
    /// (user_id, policy_id)
    user_policies: HashSet<(Uuid, Uuid)>,
    tags: HashMap<Uuid, Tag>,
    tag_ids_by_value: HashMap<String, Uuid>,
    tag_refs: HashMap<Uuid, HashSet<TagSubject>>,
}

impl Directory {
    pub fn new() -> Self {
        let mut inner = DirectoryInner::default();
        inner
            .functions
            .extend(functions::BUILT_IN.iter().map(|f| f.to_string()));
        Self {
            inner: RwLock::new(inner),
        }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ORGANIZATIONS & ENVIRONMENTS
// =============================================================================

impl Directory {
    pub async fn create_organization(&self, name: &str) -> DomainResult<Organization> {
        let mut inner = self.inner.write().await;
        if inner.organizations.values().any(|o| o.name == name) {
            return Err(DomainError::conflict("Organization name already exists"));
        }
        let now = Utc::now();
        let org = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.organizations.insert(org.id, org.clone());
        Ok(org)
    }

    pub async fn get_organization(&self, id: Uuid) -> DomainResult<Organization> {
        self.inner
            .read()
            .await
            .organizations
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Organization not found"))
    }

    pub async fn delete_organization(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if inner.organizations.remove(&id).is_none() {
            return Err(DomainError::not_found("Organization not found"));
        }
        let environment_ids: Vec<Uuid> = inner
            .environments
            .values()
            .filter(|e| e.organization_id == id)
            .map(|e| e.id)
            .collect();
        for environment_id in environment_ids {
            inner.drop_environment(environment_id);
        }
        let policy_ids: Vec<Uuid> = inner
            .policies
            .values()
            .filter(|p| p.organization_id == id)
            .map(|p| p.id)
            .collect();
        for policy_id in policy_ids {
            inner.drop_policy(policy_id);
        }
        inner.memberships.retain(|(_, org_id)| *org_id != id);
        Ok(())
    }

    pub async fn create_environment(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> DomainResult<Environment> {
        let mut inner = self.inner.write().await;
        if !inner.organizations.contains_key(&organization_id) {
            return Err(DomainError::not_found("Organization not found"));
        }
        let now = Utc::now();
        let environment = Environment {
            id: Uuid::new_v4(),
            organization_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.environments.insert(environment.id, environment.clone());
        Ok(environment)
    }

    pub async fn get_environment(&self, id: Uuid) -> DomainResult<Environment> {
        self.inner
            .read()
            .await
            .environments
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Environment not found"))
    }

    pub async fn delete_environment(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.environments.contains_key(&id) {
            return Err(DomainError::not_found("Environment not found"));
        }
        inner.drop_environment(id);
        Ok(())
    }
}

// =============================================================================
// ELEMENTS
// =============================================================================

impl Directory {
    /// The resource is part of the element's type, so an element without one
    /// cannot be constructed; payloads with an unknown kind already failed at
    /// deserialization.
    pub async fn create_element(
        &self,
        environment_id: Uuid,
        name: &str,
        resource: ElementResource,
    ) -> DomainResult<Element> {
        let mut inner = self.inner.write().await;
        if !inner.environments.contains_key(&environment_id) {
            return Err(DomainError::not_found("Environment not found"));
        }
        let now = Utc::now();
        let element = Element {
            id: Uuid::new_v4(),
            environment_id,
            name: name.to_string(),
            resource,
            created_at: now,
            updated_at: now,
        };
        inner.elements.insert(element.id, element.clone());
        Ok(element)
    }

    pub async fn get_element(&self, id: Uuid) -> DomainResult<Element> {
        self.inner
            .read()
            .await
            .elements
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Element not found"))
    }

    /// Updates name and/or resource. The resource can only be swapped for
    /// another valid one, never removed.
    pub async fn update_element(
        &self,
        id: Uuid,
        update: ElementUpdateRequest,
    ) -> DomainResult<Element> {
        let mut inner = self.inner.write().await;
        let element = inner
            .elements
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Element not found"))?;
        if let Some(name) = update.name {
            element.name = name;
        }
        if let Some(resource) = update.resource {
            element.resource = resource;
        }
        element.updated_at = Utc::now();
        Ok(element.clone())
    }

    pub async fn delete_element(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.elements.contains_key(&id) {
            return Err(DomainError::not_found("Element not found"));
        }
        inner.drop_element(id);
        Ok(())
    }

    /// Moves an element into another environment. The actor must hold
    /// `element:update` both on the element in its current environment and on
    /// the destination environment — crossing organizations therefore
    /// requires an applicable policy owned by the destination organization.
    pub async fn move_element(
        &self,
        evaluator: &dyn PermissionEvaluator,
        actor: &Principal,
        element_id: Uuid,
        destination_environment_id: Uuid,
    ) -> DomainResult<Element> {
        let (source, destination) = {
            let inner = self.inner.read().await;
            let element = inner
                .elements
                .get(&element_id)
                .ok_or_else(|| DomainError::not_found("Element not found"))?;
            if !inner
                .environments
                .contains_key(&destination_environment_id)
            {
                return Err(DomainError::not_found("Destination environment not found"));
            }
            (
                TargetScope::environment_and_element(element.environment_id, element.scope_ref()),
                TargetScope::environment(destination_environment_id),
            )
        };

        if !evaluator
            .has_permission(actor, functions::ELEMENT_UPDATE, &source)
            .await
        {
            return Err(DomainError::forbidden(
                "not allowed to move this element out of its environment",
            ));
        }
        if !evaluator
            .has_permission(actor, functions::ELEMENT_UPDATE, &destination)
            .await
        {
            return Err(DomainError::forbidden(
                "not allowed to place elements in the destination environment",
            ));
        }

        let mut inner = self.inner.write().await;
        if !inner
            .environments
            .contains_key(&destination_environment_id)
        {
            return Err(DomainError::not_found("Destination environment not found"));
        }
        let element = inner
            .elements
            .get_mut(&element_id)
            .ok_or_else(|| DomainError::not_found("Element not found"))?;
        element.environment_id = destination_environment_id;
        element.updated_at = Utc::now();
        Ok(element.clone())
    }
}

// =============================================================================
// USERS, GROUPS & MEMBERSHIPS
// =============================================================================

impl Directory {
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        superadmin: bool,
    ) -> DomainResult<User> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == email) {
            return Err(DomainError::conflict("Email already registered"));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            superadmin,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> DomainResult<User> {
        self.inner
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("User not found"))
    }

    pub async fn delete_user(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if inner.users.remove(&id).is_none() {
            return Err(DomainError::not_found("User not found"));
        }
        inner.memberships.retain(|(user_id, _)| *user_id != id);
        inner.assignments.retain(|_, a| a.user_id != id);
        inner.user_policies.retain(|(user_id, _)| *user_id != id);
        inner.purge_subject_tags(&TagSubject::User(id));
        Ok(())
    }

    pub async fn add_user_to_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&user_id) {
            return Err(DomainError::not_found("User not found"));
        }
        if !inner.organizations.contains_key(&organization_id) {
            return Err(DomainError::not_found("Organization not found"));
        }
        if !inner.memberships.insert((user_id, organization_id)) {
            return Err(DomainError::conflict(
                "User already belongs to that organization",
            ));
        }
        Ok(())
    }

    pub async fn remove_user_from_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.memberships.remove(&(user_id, organization_id)) {
            return Err(DomainError::not_found(
                "User does not belong to that organization",
            ));
        }
        Ok(())
    }

    /// `environment_id == None` creates a global group.
    pub async fn create_group(
        &self,
        name: &str,
        environment_id: Option<Uuid>,
    ) -> DomainResult<Group> {
        let mut inner = self.inner.write().await;
        if let Some(environment_id) = environment_id {
            if !inner.environments.contains_key(&environment_id) {
                return Err(DomainError::not_found("Environment not found"));
            }
        }
        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            environment_id,
            functions: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        inner.groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub async fn get_group(&self, id: Uuid) -> DomainResult<Group> {
        self.inner
            .read()
            .await
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Group not found"))
    }

    pub async fn delete_group(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.groups.contains_key(&id) {
            return Err(DomainError::not_found("Group not found"));
        }
        inner.drop_group(id);
        Ok(())
    }

    /// Grants a function directly on the group, outside the policy mechanism.
    pub async fn add_group_function(&self, group_id: Uuid, function: &str) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.is_known_function(function) {
            return Err(DomainError::bad_request(format!(
                "unknown function: {function}"
            )));
        }
        let group = inner
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| DomainError::not_found("Group not found"))?;
        group.functions.insert(function.to_string());
        group.updated_at = Utc::now();
        Ok(())
    }

    /// Assigns a user to a group, optionally narrowed to one element of the
    /// group's environment. Unique per (user, group, element).
    pub async fn assign_user_to_group(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        element_id: Option<Uuid>,
    ) -> DomainResult<UserAssignment> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&user_id) {
            return Err(DomainError::not_found("User not found"));
        }
        let group = inner
            .groups
            .get(&group_id)
            .ok_or_else(|| DomainError::not_found("Group not found"))?;
        if let Some(element_id) = element_id {
            let element = inner
                .elements
                .get(&element_id)
                .ok_or_else(|| DomainError::not_found("Element not found"))?;
            if group.environment_id != Some(element.environment_id) {
                return Err(DomainError::bad_request(
                    "element does not belong to the group's environment",
                ));
            }
        }
        let duplicate = inner.assignments.values().any(|a| {
            a.user_id == user_id && a.group_id == group_id && a.element_id == element_id
        });
        if duplicate {
            return Err(DomainError::conflict("Assignment already exists"));
        }
        let assignment = UserAssignment {
            id: Uuid::new_v4(),
            user_id,
            group_id,
            element_id,
            created_at: Utc::now(),
        };
        inner.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    pub async fn remove_assignment(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if inner.assignments.remove(&id).is_none() {
            return Err(DomainError::not_found("Assignment not found"));
        }
        Ok(())
    }
}

// =============================================================================
// POLICIES & RULES
// =============================================================================

impl Directory {
    pub async fn create_policy(&self, organization_id: Uuid, name: &str) -> DomainResult<Policy> {
        let mut inner = self.inner.write().await;
        if !inner.organizations.contains_key(&organization_id) {
            return Err(DomainError::not_found("Organization not found"));
        }
        let duplicate = inner
            .policies
            .values()
            .any(|p| p.organization_id == organization_id && p.name == name);
        if duplicate {
            return Err(DomainError::conflict(
                "Policy name already exists in this organization",
            ));
        }
        let now = Utc::now();
        let policy = Policy {
            id: Uuid::new_v4(),
            organization_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    pub async fn get_policy(&self, id: Uuid) -> DomainResult<Policy> {
        self.inner
            .read()
            .await
            .policies
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Policy not found"))
    }

    /// Deletes the policy and everything hanging off it: rules, group/user
    /// attachments and its tag attachments (garbage-collecting tags whose
    /// last reference this was).
    pub async fn delete_policy(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.policies.contains_key(&id) {
            return Err(DomainError::not_found("Policy not found"));
        }
        inner.drop_policy(id);
        Ok(())
    }

    /// The function must come from the registered vocabulary (or be the
    /// `admin` wildcard); referenced scopes must exist. The schedule payload
    /// is stored as supplied — unreadable payloads are resolved at evaluation
    /// time by the configured failure policy.
    pub async fn create_rule(
        &self,
        policy_id: Uuid,
        request: RuleCreateRequest,
    ) -> DomainResult<Rule> {
        let mut inner = self.inner.write().await;
        if !inner.policies.contains_key(&policy_id) {
            return Err(DomainError::not_found("Policy not found"));
        }
        if !inner.is_known_function(&request.function) {
            return Err(DomainError::bad_request(format!(
                "unknown function: {}",
                request.function
            )));
        }
        if let Some(environment_id) = request.environment_id {
            if !inner.environments.contains_key(&environment_id) {
                return Err(DomainError::not_found("Environment not found"));
            }
        }
        if let Some(element_id) = request.element_id {
            if !inner.elements.contains_key(&element_id) {
                return Err(DomainError::not_found("Element not found"));
            }
        }
        let rule = Rule {
            id: Uuid::new_v4(),
            policy_id,
            function: request.function,
            environment_id: request.environment_id,
            element_id: request.element_id,
            access_schedule: request.access_schedule,
            created_at: Utc::now(),
        };
        inner.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    pub async fn get_rule(&self, id: Uuid) -> DomainResult<Rule> {
        self.inner
            .read()
            .await
            .rules
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Rule not found"))
    }

    pub async fn delete_rule(&self, id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if inner.rules.remove(&id).is_none() {
            return Err(DomainError::not_found("Rule not found"));
        }
        Ok(())
    }

    pub async fn attach_policy_to_group(
        &self,
        policy_id: Uuid,
        group_id: Uuid,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.policies.contains_key(&policy_id) {
            return Err(DomainError::not_found("Policy not found"));
        }
        if !inner.groups.contains_key(&group_id) {
            return Err(DomainError::not_found("Group not found"));
        }
        if !inner.group_policies.insert((group_id, policy_id)) {
            return Err(DomainError::conflict("Policy already attached to group"));
        }
        Ok(())
    }

    pub async fn detach_policy_from_group(
        &self,
        policy_id: Uuid,
        group_id: Uuid,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.group_policies.remove(&(group_id, policy_id)) {
            return Err(DomainError::not_found("Policy is not attached to group"));
        }
        Ok(())
    }

    pub async fn attach_policy_to_user(&self, policy_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.policies.contains_key(&policy_id) {
            return Err(DomainError::not_found("Policy not found"));
        }
        if !inner.users.contains_key(&user_id) {
            return Err(DomainError::not_found("User not found"));
        }
        if !inner.user_policies.insert((user_id, policy_id)) {
            return Err(DomainError::conflict("Policy already attached to user"));
        }
        Ok(())
    }

    pub async fn detach_policy_from_user(
        &self,
        policy_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.user_policies.remove(&(user_id, policy_id)) {
            return Err(DomainError::not_found("Policy is not attached to user"));
        }
        Ok(())
    }

    /// Registers an additional function name in the vocabulary.
    pub async fn register_function(&self, name: &str) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if name.trim().is_empty() {
            return Err(DomainError::bad_request("function name must not be empty"));
        }
        if name == functions::ADMIN || !inner.functions.insert(name.to_string()) {
            return Err(DomainError::conflict("Function already registered"));
        }
        Ok(())
    }

    pub async fn functions(&self) -> Vec<String> {
        self.inner.read().await.functions.iter().cloned().collect()
    }
}

// =============================================================================
// PRINCIPAL RESOLUTION & EFFECTIVE PERMISSIONS
// =============================================================================

impl Directory {
    /// Flattens the stored graph into the evaluation-ready view the
    /// permission evaluator consumes: organization ids, group memberships
    /// with their environment's organization resolved, and policy bindings
    /// carrying their rules.
    pub async fn resolve_principal(&self, user_id: Uuid) -> DomainResult<Principal> {
        let inner = self.inner.read().await;
        let user = inner
            .users
            .get(&user_id)
            .ok_or_else(|| DomainError::not_found("User not found"))?;

        let mut organizations: Vec<Uuid> = inner
            .memberships
            .iter()
            .filter(|(member, _)| *member == user_id)
            .map(|(_, org_id)| *org_id)
            .collect();
        organizations.sort();

        let mut group_ids: Vec<Uuid> = inner
            .assignments
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.group_id)
            .collect();
        group_ids.sort();
        group_ids.dedup();

        let mut groups = Vec::new();
        for group_id in group_ids {
            let Some(group) = inner.groups.get(&group_id) else {
                continue;
            };
            let environment = match group.environment_id {
                Some(environment_id) => match inner.environments.get(&environment_id) {
                    Some(env) => Some(EnvironmentRef {
                        id: env.id,
                        organization_id: env.organization_id,
                    }),
                    // Environment vanished from under the group; treat the
                    // membership as unusable rather than silently global.
                    None => continue,
                },
                None => None,
            };
            let policies = inner.policy_bindings_for_group(group_id);
            groups.push(GroupMembership {
                group_id,
                environment,
                policies,
            });
        }

        let mut direct_policy_ids: Vec<Uuid> = inner
            .user_policies
            .iter()
            .filter(|(member, _)| *member == user_id)
            .map(|(_, policy_id)| *policy_id)
            .collect();
        direct_policy_ids.sort();
        let policies = direct_policy_ids
            .into_iter()
            .filter_map(|policy_id| inner.policy_binding(policy_id))
            .collect();

        Ok(Principal {
            user_id,
            superadmin: user.superadmin,
            organizations,
            groups,
            policies,
        })
    }

    /// Computed summary of everything the user holds and where it came from.
    /// Mirrors the applicability filtering of the evaluator, so entries here
    /// are grants that can actually take effect.
    pub async fn effective_permissions(&self, user_id: Uuid) -> DomainResult<EffectivePermissions> {
        let principal = self.resolve_principal(user_id).await?;
        let orgs: HashSet<Uuid> = principal.organizations.iter().copied().collect();
        let inner = self.inner.read().await;

        let mut functions = Vec::new();
        for membership in &principal.groups {
            if let Some(group) = inner.groups.get(&membership.group_id) {
                for function in &group.functions {
                    functions.push(EffectiveFunction {
                        function: function.clone(),
                        source: "group-function".to_string(),
                        policy_id: None,
                        group_id: Some(group.id),
                        environment_id: group.environment_id,
                        element_id: None,
                    });
                }
            }
            let applicable_env = membership
                .environment
                .map(|env| orgs.contains(&env.organization_id))
                .unwrap_or(true);
            if !applicable_env {
                continue;
            }
            for policy in &membership.policies {
                if !orgs.contains(&policy.organization_id) {
                    continue;
                }
                for rule in &policy.rules {
                    functions.push(EffectiveFunction {
                        function: rule.function.clone(),
                        source: "group-policy".to_string(),
                        policy_id: Some(policy.policy_id),
                        group_id: Some(membership.group_id),
                        environment_id: rule.environment_id,
                        element_id: rule.element_id,
                    });
                }
            }
        }
        for policy in &principal.policies {
            if !orgs.contains(&policy.organization_id) {
                continue;
            }
            for rule in &policy.rules {
                functions.push(EffectiveFunction {
                    function: rule.function.clone(),
                    source: "direct-policy".to_string(),
                    policy_id: Some(policy.policy_id),
                    group_id: None,
                    environment_id: rule.environment_id,
                    element_id: rule.element_id,
                });
            }
        }

        Ok(EffectivePermissions {
            user_id,
            superadmin: principal.superadmin,
            functions,
        })
    }
}

// =============================================================================
// CASCADES (run inside one write-lock scope)
// =============================================================================

impl DirectoryInner {
    fn is_known_function(&self, name: &str) -> bool {
        name == functions::ADMIN || self.functions.contains(name)
    }

    fn policy_binding(&self, policy_id: Uuid) -> Option<PolicyBinding> {
        let policy = self.policies.get(&policy_id)?;
        let mut rules: Vec<Rule> = self
            .rules
            .values()
            .filter(|r| r.policy_id == policy_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.created_at);
        Some(PolicyBinding {
            policy_id,
            organization_id: policy.organization_id,
            rules,
        })
    }

    fn policy_bindings_for_group(&self, group_id: Uuid) -> Vec<PolicyBinding> {
        let mut policy_ids: Vec<Uuid> = self
            .group_policies
            .iter()
            .filter(|(member, _)| *member == group_id)
            .map(|(_, policy_id)| *policy_id)
            .collect();
        policy_ids.sort();
        policy_ids
            .into_iter()
            .filter_map(|policy_id| self.policy_binding(policy_id))
            .collect()
    }

    fn drop_policy(&mut self, id: Uuid) {
        self.policies.remove(&id);
        self.rules.retain(|_, r| r.policy_id != id);
        self.group_policies.retain(|(_, policy_id)| *policy_id != id);
        self.user_policies.retain(|(_, policy_id)| *policy_id != id);
        self.purge_subject_tags(&TagSubject::Policy(id));
    }

    fn drop_element(&mut self, id: Uuid) {
        self.elements.remove(&id);
        self.assignments.retain(|_, a| a.element_id != Some(id));
        self.purge_subject_tags(&TagSubject::Element(id));
    }

    fn drop_group(&mut self, id: Uuid) {
        self.groups.remove(&id);
        self.assignments.retain(|_, a| a.group_id != id);
        self.group_policies.retain(|(group_id, _)| *group_id != id);
        self.purge_subject_tags(&TagSubject::Group(id));
    }

    fn drop_environment(&mut self, id: Uuid) {
        self.environments.remove(&id);
        let element_ids: Vec<Uuid> = self
            .elements
            .values()
            .filter(|e| e.environment_id == id)
            .map(|e| e.id)
            .collect();
        for element_id in element_ids {
            self.drop_element(element_id);
        }
        let group_ids: Vec<Uuid> = self
            .groups
            .values()
            .filter(|g| g.environment_id == Some(id))
            .map(|g| g.id)
            .collect();
        for group_id in group_ids {
            self.drop_group(group_id);
        }
        self.purge_subject_tags(&TagSubject::Environment(id));
    }
}
