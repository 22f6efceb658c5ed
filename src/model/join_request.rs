use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MemberRole;

/// State of a pending admission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinRequestState {
    Waiting,
    Accepted,
    Rejected,
}

impl Default for JoinRequestState {
    fn default() -> Self {
        Self::Waiting
    }
}

/// A user's request to join an approval-gated classroom, resolved by the
/// owner. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: String,
    pub user: String,
    pub classroom_id: String,
    pub role: MemberRole,
    pub state: JoinRequestState,
    /// Owner who accepted or rejected the request
    pub reviewer: Option<String>,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JoinRequest {
    pub fn new(user: &str, classroom_id: &str, role: MemberRole, now: DateTime<Utc>) -> Self {
        Self {
            id: super::new_id(),
            user: user.to_string(),
            classroom_id: classroom_id.to_string(),
            role,
            state: JoinRequestState::Waiting,
            reviewer: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
