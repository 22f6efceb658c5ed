use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Classroom, GeoPoint, JoinRequest, Subject};

/// Input for creating a classroom. The creator becomes owner and sole
/// initial participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClassroom {
    pub name: String,
    pub subject: Subject,
    pub max_participants: u32,
    pub location: GeoPoint,
    pub address: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// The creator wants the tutor role; requires a credential for the
    /// subject
    pub owner_is_tutor: bool,

    pub description: Option<String>,
    pub is_public: bool,
    pub owner_approval_required: bool,
    /// Required for private classrooms, forced empty for public ones
    pub secret_key: Option<String>,
}

/// Owner-issued partial update. `None` means "leave unchanged"; there is no
/// sparse map — presence is explicit per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassroomPatch {
    pub name: Option<String>,
    pub subject: Option<Subject>,
    pub location: Option<GeoPoint>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ClassroomPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.subject.is_none()
            && self.location.is_none()
            && self.address.is_none()
            && self.description.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }
}

/// Result of a public join: immediate membership, or a pending request when
/// the classroom is approval-gated
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Joined(Classroom),
    Pending(JoinRequest),
}
