use learnspire_core::{AppError, UserId};
use learnspire_domain::{GroupId, PermissionGroup, RoleId, RoleKind};

use crate::permission_group_service::CreateGroupInput;
use crate::test_support::{TestEngine, engine};

async fn created(engine: &TestEngine, actor: UserId) -> PermissionGroup {
    let input = CreateGroupInput {
        name: "Grading Tools".to_owned(),
        description: "Access to gradebooks and rubric templates".to_owned(),
        permissions: vec!["view_gradebook".to_owned(), "edit_rubric".to_owned()],
    };
    match engine.groups.create_group(actor, input).await {
        Ok(group) => group,
        Err(error) => panic!("group creation must succeed: {error}"),
    }
}

#[tokio::test]
async fn bootstrap_seeds_builtin_groups_once() {
    let engine = engine().await;
    let groups = match engine.groups.list_groups().await {
        Ok(groups) => groups,
        Err(error) => panic!("listing must succeed: {error}"),
    };
    assert_eq!(groups.len(), 5);

    // A second bootstrap creates nothing new.
    match engine.registry.bootstrap().await {
        Ok(summary) => {
            assert_eq!(summary.roles_created, 0);
            assert_eq!(summary.groups_created, 0);
        }
        Err(error) => panic!("bootstrap must succeed: {error}"),
    }
}

#[tokio::test]
async fn group_creation_requires_system_capability() {
    let engine = engine().await;
    let user = engine.store.add_user().await;

    let input = CreateGroupInput {
        name: "Grading Tools".to_owned(),
        description: String::new(),
        permissions: Vec::new(),
    };
    let result = engine.groups.create_group(user, input).await;
    assert!(matches!(result, Err(AppError::PermissionDenied(_))));
}

#[tokio::test]
async fn duplicate_group_name_conflicts() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    created(&engine, admin).await;

    let input = CreateGroupInput {
        name: "Grading Tools".to_owned(),
        description: String::new(),
        permissions: Vec::new(),
    };
    let result = engine.groups.create_group(admin, input).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn attachment_is_idempotent() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    let group = created(&engine, admin).await;
    let role = engine.role(RoleKind::Instructor).await;

    match engine
        .groups
        .attach_group_to_role(admin, role.id, group.id)
        .await
    {
        Ok(attached) => assert!(attached),
        Err(error) => panic!("attachment must succeed: {error}"),
    }
    match engine
        .groups
        .attach_group_to_role(admin, role.id, group.id)
        .await
    {
        Ok(attached) => assert!(!attached),
        Err(error) => panic!("attachment must stay idempotent: {error}"),
    }

    let groups = match engine.groups.groups_for_role(role.id).await {
        Ok(groups) => groups,
        Err(error) => panic!("listing must succeed: {error}"),
    };
    assert_eq!(groups.len(), 1);
}

#[tokio::test]
async fn attachment_rejects_unknown_role_and_group() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    let group = created(&engine, admin).await;
    let role = engine.role(RoleKind::Instructor).await;

    let result = engine
        .groups
        .attach_group_to_role(admin, RoleId::new(), group.id)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = engine
        .groups
        .attach_group_to_role(admin, role.id, GroupId::new())
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn capabilities_for_role_deduplicates_across_groups() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    let role = engine.role(RoleKind::Instructor).await;

    let first = created(&engine, admin).await;
    let second = match engine
        .groups
        .create_group(
            admin,
            CreateGroupInput {
                name: "Forum Tools".to_owned(),
                description: String::new(),
                permissions: vec!["moderate_forum".to_owned(), "view_gradebook".to_owned()],
            },
        )
        .await
    {
        Ok(group) => group,
        Err(error) => panic!("group creation must succeed: {error}"),
    };

    for group in [&first, &second] {
        match engine
            .groups
            .attach_group_to_role(admin, role.id, group.id)
            .await
        {
            Ok(_) => {}
            Err(error) => panic!("attachment must succeed: {error}"),
        }
    }

    let capabilities = match engine.groups.capabilities_for_role(role.id).await {
        Ok(capabilities) => capabilities,
        Err(error) => panic!("union must succeed: {error}"),
    };
    // The shared identifier appears once.
    assert_eq!(capabilities.len(), 3);
    assert!(capabilities.contains("view_gradebook"));
    assert!(capabilities.contains("moderate_forum"));
}
