use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde_json::json;
use stackwarden::authz::{
    functions, DefaultPermissionEvaluator, PermissionEvaluator, ScheduleEvaluator,
    ScheduleFailurePolicy, TargetScope,
};
use stackwarden::errors::DomainError;
use stackwarden::models::element::{ElementResource, VmResource};
use stackwarden::models::policy::RuleCreateRequest;
use stackwarden::Directory;

fn vm() -> ElementResource {
    ElementResource::Vm(VmResource {
        cpus: 2,
        memory_mb: 4096,
    })
}

fn evaluator() -> DefaultPermissionEvaluator {
    DefaultPermissionEvaluator::with_schedule(ScheduleEvaluator::new(
        ScheduleFailurePolicy::Closed,
    ))
}

fn rule(function: &str, environment_id: Option<uuid::Uuid>) -> RuleCreateRequest {
    RuleCreateRequest {
        function: function.to_string(),
        environment_id,
        element_id: None,
        access_schedule: None,
    }
}

#[tokio::test]
async fn test_environment_scoped_policy_through_group() -> Result<()> {
    let directory = Directory::new();
    let org = directory.create_organization("acme").await?;
    let prod = directory.create_environment(org.id, "production").await?;
    let staging = directory.create_environment(org.id, "staging").await?;
    let web = directory.create_element(prod.id, "web-1", vm()).await?;

    let policy = directory.create_policy(org.id, "prod-readers").await?;
    directory
        .create_rule(policy.id, rule(functions::ELEMENT_READ, Some(prod.id)))
        .await?;

    let ops = directory.create_group("prod-ops", Some(prod.id)).await?;
    directory.attach_policy_to_group(policy.id, ops.id).await?;

    let user = directory.create_user("Ada", "ada@example.com", false).await?;
    directory.add_user_to_organization(user.id, org.id).await?;
    directory.assign_user_to_group(user.id, ops.id, None).await?;

    let principal = directory.resolve_principal(user.id).await?;
    let ev = evaluator();

    assert!(
        ev.has_permission(
            &principal,
            functions::ELEMENT_READ,
            &TargetScope::environment(prod.id)
        )
        .await
    );
    // Elements inside the environment are covered through their parent.
    assert!(
        ev.has_permission(
            &principal,
            functions::ELEMENT_READ,
            &TargetScope::element(web.scope_ref())
        )
        .await
    );
    assert!(
        !ev.has_permission(
            &principal,
            functions::ELEMENT_READ,
            &TargetScope::environment(staging.id)
        )
        .await
    );
    assert!(
        !ev.has_permission(
            &principal,
            functions::ELEMENT_UPDATE,
            &TargetScope::environment(prod.id)
        )
        .await
    );
    // A query with no target is only satisfied by a fully global rule.
    assert!(
        !ev.has_permission(&principal, functions::ELEMENT_READ, &TargetScope::none())
            .await
    );
    Ok(())
}

#[tokio::test]
async fn test_direct_policy_with_global_rule() -> Result<()> {
    let directory = Directory::new();
    let org = directory.create_organization("acme").await?;
    let policy = directory.create_policy(org.id, "org-admins").await?;
    directory
        .create_rule(policy.id, rule(functions::ADMIN, None))
        .await?;

    let user = directory.create_user("Max", "max@example.com", false).await?;
    directory.add_user_to_organization(user.id, org.id).await?;
    directory.attach_policy_to_user(policy.id, user.id).await?;

    let principal = directory.resolve_principal(user.id).await?;
    let ev = evaluator();
    assert!(
        ev.has_permission(&principal, functions::ELEMENT_DELETE, &TargetScope::none())
            .await
    );
    assert!(
        ev.has_permission(
            &principal,
            functions::POLICY_UPDATE,
            &TargetScope::environment(uuid::Uuid::new_v4())
        )
        .await
    );
    Ok(())
}

#[tokio::test]
async fn test_superadmin_bypasses_empty_policy_set() -> Result<()> {
    let directory = Directory::new();
    let root = directory.create_user("root", "root@example.com", true).await?;
    let principal = directory.resolve_principal(root.id).await?;
    assert!(
        evaluator()
            .has_permission(&principal, "anything:at-all", &TargetScope::none())
            .await
    );
    Ok(())
}

#[tokio::test]
async fn test_cross_organization_isolation() -> Result<()> {
    let directory = Directory::new();
    let org_a = directory.create_organization("org-a").await?;
    let org_b = directory.create_organization("org-b").await?;
    let env_b = directory.create_environment(org_b.id, "b-prod").await?;

    // Policy owned by org A, attached through a group whose environment
    // belongs to org B: no single organization satisfies both conditions.
    let policy = directory.create_policy(org_a.id, "a-readers").await?;
    directory
        .create_rule(policy.id, rule(functions::ELEMENT_READ, None))
        .await?;
    let group = directory.create_group("b-ops", Some(env_b.id)).await?;
    directory.attach_policy_to_group(policy.id, group.id).await?;

    let user = directory.create_user("Eve", "eve@example.com", false).await?;
    directory.add_user_to_organization(user.id, org_a.id).await?;
    directory.add_user_to_organization(user.id, org_b.id).await?;
    directory.assign_user_to_group(user.id, group.id, None).await?;

    let principal = directory.resolve_principal(user.id).await?;
    assert!(
        !evaluator()
            .has_permission(&principal, functions::ELEMENT_READ, &TargetScope::none())
            .await
    );
    Ok(())
}

#[tokio::test]
async fn test_time_windowed_rule_through_directory() -> Result<()> {
    let directory = Directory::new();
    let org = directory.create_organization("acme").await?;
    let env = directory.create_environment(org.id, "prod").await?;
    let policy = directory.create_policy(org.id, "office-hours").await?;
    directory
        .create_rule(
            policy.id,
            RuleCreateRequest {
                function: functions::ELEMENT_UPDATE.to_string(),
                environment_id: Some(env.id),
                element_id: None,
                access_schedule: Some(json!({"start": "0 9 * * 1-5", "end": "0 17 * * 1-5"})),
            },
        )
        .await?;

    let user = directory.create_user("Kim", "kim@example.com", false).await?;
    directory.add_user_to_organization(user.id, org.id).await?;
    directory.attach_policy_to_user(policy.id, user.id).await?;

    let principal = directory.resolve_principal(user.id).await?;
    let ev = evaluator();
    let tuesday = Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap();
    let saturday = Utc.with_ymd_and_hms(2024, 3, 16, 14, 0, 0).unwrap();
    let target = TargetScope::environment(env.id);
    assert!(ev.has_permission_at(&principal, functions::ELEMENT_UPDATE, &target, tuesday));
    assert!(!ev.has_permission_at(&principal, functions::ELEMENT_UPDATE, &target, saturday));
    Ok(())
}

#[tokio::test]
async fn test_rule_creation_validates_function_and_scope() -> Result<()> {
    let directory = Directory::new();
    let org = directory.create_organization("acme").await?;
    let policy = directory.create_policy(org.id, "p").await?;

    let unknown = directory
        .create_rule(policy.id, rule("element:defragment", None))
        .await;
    assert!(matches!(unknown, Err(DomainError::BadRequest(_))));

    let missing_env = directory
        .create_rule(
            policy.id,
            rule(functions::ELEMENT_READ, Some(uuid::Uuid::new_v4())),
        )
        .await;
    assert!(matches!(missing_env, Err(DomainError::NotFound(_))));

    directory.register_function("element:defragment").await?;
    directory
        .create_rule(policy.id, rule("element:defragment", None))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_assignment_uniqueness_and_narrowing() -> Result<()> {
    let directory = Directory::new();
    let org = directory.create_organization("acme").await?;
    let prod = directory.create_environment(org.id, "prod").await?;
    let staging = directory.create_environment(org.id, "staging").await?;
    let web = directory.create_element(prod.id, "web-1", vm()).await?;
    let db = directory.create_element(staging.id, "db-1", vm()).await?;
    let group = directory.create_group("prod-ops", Some(prod.id)).await?;
    let user = directory.create_user("Ada", "ada@example.com", false).await?;

    directory.assign_user_to_group(user.id, group.id, None).await?;
    let duplicate = directory.assign_user_to_group(user.id, group.id, None).await;
    assert!(matches!(duplicate, Err(DomainError::Conflict(_))));

    // Narrowing to an element of the group's environment is fine; an element
    // from elsewhere is not.
    directory
        .assign_user_to_group(user.id, group.id, Some(web.id))
        .await?;
    let foreign = directory
        .assign_user_to_group(user.id, group.id, Some(db.id))
        .await;
    assert!(matches!(foreign, Err(DomainError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn test_effective_permissions_summary() -> Result<()> {
    let directory = Directory::new();
    let org = directory.create_organization("acme").await?;
    let env = directory.create_environment(org.id, "prod").await?;

    let group_policy = directory.create_policy(org.id, "readers").await?;
    directory
        .create_rule(group_policy.id, rule(functions::ELEMENT_READ, Some(env.id)))
        .await?;
    let direct_policy = directory.create_policy(org.id, "editors").await?;
    directory
        .create_rule(direct_policy.id, rule(functions::ELEMENT_UPDATE, None))
        .await?;

    let group = directory.create_group("ops", Some(env.id)).await?;
    directory
        .attach_policy_to_group(group_policy.id, group.id)
        .await?;
    directory
        .add_group_function(group.id, functions::TAG_READ)
        .await?;

    let user = directory.create_user("Ada", "ada@example.com", false).await?;
    directory.add_user_to_organization(user.id, org.id).await?;
    directory.assign_user_to_group(user.id, group.id, None).await?;
    directory
        .attach_policy_to_user(direct_policy.id, user.id)
        .await?;

    let effective = directory.effective_permissions(user.id).await?;
    assert!(!effective.superadmin);
    assert_eq!(effective.functions.len(), 3);

    let sources: Vec<&str> = effective
        .functions
        .iter()
        .map(|f| f.source.as_str())
        .collect();
    assert!(sources.contains(&"group-policy"));
    assert!(sources.contains(&"direct-policy"));
    assert!(sources.contains(&"group-function"));

    let scoped = effective
        .functions
        .iter()
        .find(|f| f.source == "group-policy")
        .unwrap();
    assert_eq!(scoped.function, functions::ELEMENT_READ);
    assert_eq!(scoped.environment_id, Some(env.id));
    Ok(())
}
