use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClassroomError;

/// Lifecycle state of a classroom, driven by the scheduled start/end
/// transitions. Termination is a separate flag, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassroomState {
    Waiting,
    Learning,
    Finished,
}

impl Default for ClassroomState {
    fn default() -> Self {
        Self::Waiting
    }
}

/// Role a user may hold when joining a classroom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Student,
    Tutor,
}

impl std::str::FromStr for MemberRole {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Self::Student),
            "TUTOR" => Ok(Self::Tutor),
            other => Err(ClassroomError::InvalidRole(other.to_string())),
        }
    }
}

/// A study subject, with the name denormalized onto the classroom so
/// free-text discovery does not need a second lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

/// WGS84 point for classroom discovery on a map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// Rectangular map viewport given by its north-east and south-west corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub north_lat: f64,
    pub north_lng: f64,
    pub south_lat: f64,
    pub south_lng: f64,
}

impl GeoBounds {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        let (lat_min, lat_max) = ordered(self.south_lat, self.north_lat);
        let (lng_min, lng_max) = ordered(self.south_lng, self.north_lng);
        point.latitude >= lat_min
            && point.latitude <= lat_max
            && point.longitude >= lng_min
            && point.longitude <= lng_max
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A scheduled, capacity-bounded study session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classroom {
    pub id: String,
    pub name: String,
    pub subject: Subject,

    pub creator: String,
    pub owner: String,
    pub tutor: Option<String>,
    pub current_participants: Vec<String>,
    /// Everyone who has ever been a member; only ever grows
    pub history_participants: Vec<String>,
    pub max_participants: u32,

    pub state: ClassroomState,
    /// False once capacity is reached (or the classroom is terminated)
    pub available: bool,
    /// Owner- or leave-triggered definitive end, distinct from a natural
    /// FINISHED
    pub terminated: bool,
    /// Ids of join requests still awaiting the owner's decision
    pub join_requests: Vec<String>,

    pub location: GeoPoint,
    pub address: String,
    pub description: Option<String>,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    pub is_public: bool,
    pub owner_approval_required: bool,
    pub secret_key: String,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Classroom {
    pub fn is_full(&self) -> bool {
        self.current_participants.len() >= self.max_participants as usize
    }

    pub fn has_participant(&self, user: &str) -> bool {
        self.current_participants.iter().any(|p| p == user)
    }

    /// Whether this classroom's `[start_time, end_time)` interval
    /// intersects the given one
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    /// The lifecycle state this classroom should be in at `now`, used to
    /// repair stale persisted state after a restart
    pub fn expected_state_at(&self, now: DateTime<Utc>) -> ClassroomState {
        if now < self.start_time {
            ClassroomState::Waiting
        } else if now < self.end_time {
            ClassroomState::Learning
        } else {
            ClassroomState::Finished
        }
    }
}
