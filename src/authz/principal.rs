use uuid::Uuid;

use crate::models::element::ElementRef;
use crate::models::policy::Rule;

/// The acting user with every relationship the evaluator needs already
/// resolved: organization memberships, group memberships (each carrying its
/// environment and that environment's organization) and policy attachments
/// with their rules. Built by the directory or supplied by a collaborator;
/// evaluation itself never loads anything.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub superadmin: bool,
    pub organizations: Vec<Uuid>,
    pub groups: Vec<GroupMembership>,
    /// Policies attached directly to the user.
    pub policies: Vec<PolicyBinding>,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            superadmin: false,
            organizations: Vec::new(),
            groups: Vec::new(),
            policies: Vec::new(),
        }
    }

    pub fn with_superadmin(mut self, superadmin: bool) -> Self {
        self.superadmin = superadmin;
        self
    }

    pub fn with_organizations(mut self, orgs: impl IntoIterator<Item = Uuid>) -> Self {
        self.organizations = orgs.into_iter().collect();
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupMembership>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }

    pub fn with_policies(mut self, policies: impl IntoIterator<Item = PolicyBinding>) -> Self {
        self.policies = policies.into_iter().collect();
        self
    }
}

/// One group the user belongs to, with the group's environment resolved to
/// explicit ids (`None` for a global group).
#[derive(Debug, Clone)]
pub struct GroupMembership {
    pub group_id: Uuid,
    pub environment: Option<EnvironmentRef>,
    pub policies: Vec<PolicyBinding>,
}

/// Environment id plus its owning organization id, so scope checks are plain
/// id comparisons instead of object-graph navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentRef {
    pub id: Uuid,
    pub organization_id: Uuid,
}

/// A policy attachment flattened for evaluation: owning organization and the
/// policy's rules.
#[derive(Debug, Clone)]
pub struct PolicyBinding {
    pub policy_id: Uuid,
    pub organization_id: Uuid,
    pub rules: Vec<Rule>,
}

/// The scope a permission check targets: an environment, an element, both,
/// or neither.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetScope {
    pub environment_id: Option<Uuid>,
    pub element: Option<ElementRef>,
}

impl TargetScope {
    /// No target at all; only fully global rules can satisfy this.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn environment(environment_id: Uuid) -> Self {
        Self {
            environment_id: Some(environment_id),
            element: None,
        }
    }

    pub fn element(element: ElementRef) -> Self {
        Self {
            environment_id: None,
            element: Some(element),
        }
    }

    pub fn environment_and_element(environment_id: Uuid, element: ElementRef) -> Self {
        Self {
            environment_id: Some(environment_id),
            element: Some(element),
        }
    }
}
