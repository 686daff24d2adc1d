//! Self-service role request workflow: submission and review.

use std::sync::Arc;

use async_trait::async_trait;
use learnspire_core::{AppError, AppResult, NonEmptyString, UserId};
use learnspire_domain::{RequestId, RequestStatus, RoleDefinition, RoleId, RoleRequest};

use crate::assignment_service::{GrantRoleInput, IdentityDirectory, RoleAssignmentService};
use crate::clock::Clock;
use crate::guard;
use crate::registry::RoleRepository;

/// Repository port for role requests.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Inserts a pending request. Fails `Conflict` when the (user, role)
    /// pair already has a pending request; the uniqueness check runs in the
    /// same unit of work as the insert.
    async fn insert_pending(&self, request: RoleRequest) -> AppResult<()>;

    /// Persists a review outcome. Fails `Conflict` when the stored status is
    /// no longer `expected`.
    async fn persist_review(
        &self,
        request: RoleRequest,
        expected: RequestStatus,
    ) -> AppResult<()>;

    /// Returns one request by identifier.
    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<RoleRequest>>;

    /// Lists pending requests, oldest first.
    async fn list_pending(&self) -> AppResult<Vec<RoleRequest>>;

    /// Lists a user's requests, most recent first.
    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleRequest>>;

    /// Counts pending requests.
    async fn count_pending(&self) -> AppResult<u64>;
}

/// Input payload for submitting a role request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmitRequestInput {
    /// Why the requester believes they qualify.
    pub justification: String,
    /// References to supporting documents.
    pub supporting_documents: Vec<String>,
}

/// Application service for the role request workflow.
///
/// Approval issues the grant through the assignment lifecycle before the
/// review outcome is persisted, so a stored `approved` request always has a
/// grant behind it.
#[derive(Clone)]
pub struct RoleRequestService {
    requests: Arc<dyn RequestRepository>,
    roles: Arc<dyn RoleRepository>,
    identity: Arc<dyn IdentityDirectory>,
    assignments: RoleAssignmentService,
    clock: Arc<dyn Clock>,
}

impl RoleRequestService {
    /// Creates a new service from its dependencies.
    #[must_use]
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        roles: Arc<dyn RoleRepository>,
        identity: Arc<dyn IdentityDirectory>,
        assignments: RoleAssignmentService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            roles,
            identity,
            assignments,
            clock,
        }
    }

    /// Submits a pending request for `role_id` on behalf of `requester`.
    pub async fn submit(
        &self,
        requester: UserId,
        role_id: RoleId,
        input: SubmitRequestInput,
    ) -> AppResult<RoleRequest> {
        if !self.identity.user_exists(requester).await? {
            return Err(AppError::NotFound(format!("user '{requester}' not found")));
        }

        let role = self
            .roles
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' not found")))?;
        if !role.is_active || !role.is_assignable {
            return Err(AppError::NotAssignable(format!(
                "role '{}' is not open to requests",
                role.kind.as_str()
            )));
        }

        let request = RoleRequest::submit(
            requester,
            role_id,
            NonEmptyString::new(input.justification)?,
            input.supporting_documents,
            self.clock.now(),
        );
        self.requests.insert_pending(request.clone()).await?;
        Ok(request)
    }

    /// Approves a pending request on behalf of `reviewer`, issuing the grant.
    ///
    /// The reviewer must pass the same hierarchy and capability checks as a
    /// direct grant. When the grant itself fails for a business reason, for
    /// example a duplicate active assignment created since submission, the
    /// request is closed as rejected with the failure recorded in the review
    /// notes rather than left dangling.
    pub async fn approve(
        &self,
        reviewer: UserId,
        request_id: RequestId,
        notes: &str,
    ) -> AppResult<RoleRequest> {
        let now = self.clock.now();
        let mut request = self.require_pending(request_id).await?;
        let role = self.require_requested_role(&request).await?;

        // Authorize before touching anything so a denied reviewer leaves the
        // request pending for someone else.
        self.assignments
            .authorize_grant_for(reviewer, &role, now)
            .await?;

        let grant = self
            .assignments
            .grant(
                reviewer,
                request.user_id,
                request.requested_role_id,
                GrantRoleInput {
                    reason: format!("approved role request: {}", request.justification),
                    ..GrantRoleInput::default()
                },
            )
            .await;

        match grant {
            Ok(_) => {
                request.approve(reviewer, notes, now)?;
            }
            Err(error @ AppError::Internal(_)) => return Err(error),
            Err(error) => {
                request.reject(
                    reviewer,
                    format!("role assignment failed: {error}"),
                    now,
                )?;
            }
        }

        self.requests
            .persist_review(request.clone(), RequestStatus::Pending)
            .await?;
        Ok(request)
    }

    /// Rejects a pending request on behalf of `reviewer`.
    pub async fn reject(
        &self,
        reviewer: UserId,
        request_id: RequestId,
        notes: &str,
    ) -> AppResult<RoleRequest> {
        let now = self.clock.now();
        let mut request = self.require_pending(request_id).await?;
        let role = self.require_requested_role(&request).await?;

        let reviewer_primary = self
            .assignments
            .resolve_active_primary(reviewer, now)
            .await?;
        guard::authorize_review(reviewer_primary.as_ref(), &role)?;

        request.reject(reviewer, notes, now)?;
        self.requests
            .persist_review(request.clone(), RequestStatus::Pending)
            .await?;
        Ok(request)
    }

    /// Withdraws a pending request. Only the requester may cancel.
    pub async fn cancel(&self, actor: UserId, request_id: RequestId) -> AppResult<RoleRequest> {
        let mut request = self.require_pending(request_id).await?;
        if request.user_id != actor {
            return Err(AppError::PermissionDenied(format!(
                "only the requester may cancel request '{request_id}'"
            )));
        }

        request.cancel(self.clock.now())?;
        self.requests
            .persist_review(request.clone(), RequestStatus::Pending)
            .await?;
        Ok(request)
    }

    /// Returns one request by identifier.
    pub async fn find_request(&self, request_id: RequestId) -> AppResult<Option<RoleRequest>> {
        self.requests.find_request(request_id).await
    }

    /// Lists pending requests, oldest first.
    pub async fn pending_requests(&self) -> AppResult<Vec<RoleRequest>> {
        self.requests.list_pending().await
    }

    /// Lists a user's requests, most recent first.
    pub async fn requests_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleRequest>> {
        self.requests.list_for_user(user_id).await
    }

    /// Counts pending requests.
    pub async fn pending_count(&self) -> AppResult<u64> {
        self.requests.count_pending().await
    }

    async fn require_pending(&self, request_id: RequestId) -> AppResult<RoleRequest> {
        self.requests
            .find_request(request_id)
            .await?
            .filter(|request| request.status == RequestStatus::Pending)
            .ok_or_else(|| {
                AppError::NotFound(format!("pending request '{request_id}' not found"))
            })
    }

    /// Resolves the role a stored request points at; absence here is a
    /// referential integrity fault, not a caller error.
    async fn require_requested_role(
        &self,
        request: &RoleRequest,
    ) -> AppResult<RoleDefinition> {
        self.roles
            .find_role(request.requested_role_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "request references missing role '{}'",
                    request.requested_role_id
                ))
            })
    }
}

#[cfg(test)]
mod tests;
