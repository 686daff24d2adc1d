//! Self-service role requests and their review transitions.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use learnspire_core::{AppError, AppResult, NonEmptyString, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::RoleId;

/// Unique identifier for a role request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random request identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a request identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Review state of a role request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting review.
    Pending,
    /// Approved; a grant was issued.
    Approved,
    /// Declined by a reviewer or by the system.
    Rejected,
    /// Withdrawn by the requester.
    Cancelled,
}

impl RequestStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(AppError::Validation(format!(
                "unknown request status '{value}'"
            ))),
        }
    }
}

/// A user's self-service request for a role.
///
/// At most one pending request may exist per (user, role); rejected or
/// cancelled history never blocks a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequest {
    /// Stable request identifier.
    pub id: RequestId,
    /// Requesting user.
    pub user_id: UserId,
    /// Role being requested.
    pub requested_role_id: RoleId,
    /// Why the requester believes they qualify.
    pub justification: String,
    /// References to supporting documents.
    pub supporting_documents: Vec<String>,
    /// Review state.
    pub status: RequestStatus,
    /// Reviewer, once reviewed.
    pub reviewed_by: Option<UserId>,
    /// Review timestamp, once reviewed.
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Reviewer notes, once reviewed.
    pub review_notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoleRequest {
    /// Creates a pending request.
    pub fn submit(
        user_id: UserId,
        requested_role_id: RoleId,
        justification: NonEmptyString,
        supporting_documents: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            user_id,
            requested_role_id,
            justification: justification.into(),
            supporting_documents,
            status: RequestStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks a pending request approved.
    pub fn approve(
        &mut self,
        reviewer: UserId,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.require_pending("approve")?;
        self.status = RequestStatus::Approved;
        self.record_review(reviewer, notes, now);
        Ok(())
    }

    /// Marks a pending request rejected.
    pub fn reject(
        &mut self,
        reviewer: UserId,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.require_pending("reject")?;
        self.status = RequestStatus::Rejected;
        self.record_review(reviewer, notes, now);
        Ok(())
    }

    /// Withdraws a pending request on behalf of the requester.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.require_pending("cancel")?;
        self.status = RequestStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    fn record_review(&mut self, reviewer: UserId, notes: impl Into<String>, now: DateTime<Utc>) {
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.review_notes = Some(notes.into());
        self.updated_at = now;
    }

    fn require_pending(&self, operation: &str) -> AppResult<()> {
        if self.status != RequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "cannot {operation} request '{}' in status '{}'",
                self.id,
                self.status.as_str()
            )));
        }

        Ok(())
    }
}
