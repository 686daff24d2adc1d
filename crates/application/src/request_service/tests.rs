use learnspire_core::{AppError, UserId};
use learnspire_domain::{RequestStatus, RoleKind, RoleRequest};

use crate::assignment_service::GrantRoleInput;
use crate::request_service::SubmitRequestInput;
use crate::test_support::{TestEngine, engine};

fn request_input() -> SubmitRequestInput {
    SubmitRequestInput {
        justification: "taught two courses last term".to_owned(),
        supporting_documents: vec!["https://docs.example.com/cv.pdf".to_owned()],
    }
}

async fn submitted(engine: &TestEngine, requester: UserId, kind: RoleKind) -> RoleRequest {
    let role = engine.role(kind).await;
    match engine
        .requests
        .submit(requester, role.id, request_input())
        .await
    {
        Ok(request) => request,
        Err(error) => panic!("submit must succeed: {error}"),
    }
}

#[tokio::test]
async fn submit_creates_pending_request() {
    let engine = engine().await;
    let requester = engine.store.add_user().await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.user_id, requester);

    match engine.requests.pending_count().await {
        Ok(count) => assert_eq!(count, 1),
        Err(error) => panic!("count must succeed: {error}"),
    }
}

#[tokio::test]
async fn submit_rejects_empty_justification() {
    let engine = engine().await;
    let requester = engine.store.add_user().await;
    let role = engine.role(RoleKind::Instructor).await;

    let result = engine
        .requests
        .submit(requester, role.id, SubmitRequestInput::default())
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn second_pending_request_for_same_role_conflicts() {
    let engine = engine().await;
    let requester = engine.store.add_user().await;
    let role = engine.role(RoleKind::Instructor).await;

    submitted(&engine, requester, RoleKind::Instructor).await;
    let result = engine
        .requests
        .submit(requester, role.id, request_input())
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn resubmission_is_allowed_once_the_request_is_closed() {
    let engine = engine().await;
    let requester = engine.store.add_user().await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;
    if let Err(error) = engine.requests.cancel(requester, request.id).await {
        panic!("cancel must succeed: {error}");
    }
    submitted(&engine, requester, RoleKind::Instructor).await;
}

#[tokio::test]
async fn approval_issues_the_grant() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    let requester = engine.store.add_user().await;
    let role = engine.role(RoleKind::Instructor).await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;
    let reviewed = match engine
        .requests
        .approve(admin, request.id, "credentials verified")
        .await
    {
        Ok(reviewed) => reviewed,
        Err(error) => panic!("approve must succeed: {error}"),
    };
    assert_eq!(reviewed.status, RequestStatus::Approved);
    assert_eq!(reviewed.reviewed_by, Some(admin));

    let active = match engine.assignments.active_roles_for_user(requester).await {
        Ok(active) => active,
        Err(error) => panic!("query must succeed: {error}"),
    };
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].role_id, role.id);
    assert!(active[0].assignment_reason.contains("approved role request"));
}

#[tokio::test]
async fn unprivileged_reviewer_leaves_the_request_pending() {
    let engine = engine().await;
    let reviewer = engine.store.add_user().await;
    let requester = engine.store.add_user().await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;
    let result = engine.requests.approve(reviewer, request.id, "sure").await;
    assert!(matches!(result, Err(AppError::PermissionDenied(_))));

    let Ok(Some(stored)) = engine.requests.find_request(request.id).await else {
        panic!("request must remain stored");
    };
    assert_eq!(stored.status, RequestStatus::Pending);
}

#[tokio::test]
async fn approval_with_a_duplicate_grant_closes_as_rejected() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    let requester = engine.store.add_user().await;
    let role = engine.role(RoleKind::Instructor).await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;

    // The role lands through another path while the request sits in review.
    if let Err(error) = engine
        .assignments
        .grant(admin, requester, role.id, GrantRoleInput::default())
        .await
    {
        panic!("direct grant must succeed: {error}");
    }

    let reviewed = match engine.requests.approve(admin, request.id, "ok").await {
        Ok(reviewed) => reviewed,
        Err(error) => panic!("approve must settle the request: {error}"),
    };
    assert_eq!(reviewed.status, RequestStatus::Rejected);
    let Some(notes) = reviewed.review_notes else {
        panic!("review notes must be recorded");
    };
    assert!(notes.contains("role assignment failed"));
}

#[tokio::test]
async fn rejection_records_reviewer_notes() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    let requester = engine.store.add_user().await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;
    let reviewed = match engine
        .requests
        .reject(admin, request.id, "insufficient experience")
        .await
    {
        Ok(reviewed) => reviewed,
        Err(error) => panic!("reject must succeed: {error}"),
    };
    assert_eq!(reviewed.status, RequestStatus::Rejected);
    assert_eq!(
        reviewed.review_notes.as_deref(),
        Some("insufficient experience")
    );

    // No grant was issued.
    let active = match engine.assignments.active_roles_for_user(requester).await {
        Ok(active) => active,
        Err(error) => panic!("query must succeed: {error}"),
    };
    assert!(active.is_empty());
}

#[tokio::test]
async fn only_the_requester_may_cancel() {
    let engine = engine().await;
    let requester = engine.store.add_user().await;
    let stranger = engine.store.add_user().await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;
    let result = engine.requests.cancel(stranger, request.id).await;
    assert!(matches!(result, Err(AppError::PermissionDenied(_))));

    let cancelled = match engine.requests.cancel(requester, request.id).await {
        Ok(cancelled) => cancelled,
        Err(error) => panic!("cancel must succeed: {error}"),
    };
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
}

#[tokio::test]
async fn reviewing_a_settled_request_reads_as_missing() {
    let engine = engine().await;
    let admin = engine.admin_user().await;
    let requester = engine.store.add_user().await;

    let request = submitted(&engine, requester, RoleKind::Instructor).await;
    if let Err(error) = engine.requests.reject(admin, request.id, "no").await {
        panic!("reject must succeed: {error}");
    }

    let result = engine.requests.approve(admin, request.id, "changed my mind").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
