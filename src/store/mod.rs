//! Persistence seam for classrooms and join requests.
//!
//! The service layer never does read-modify-write in memory: every mutation
//! goes through `find_and_update`, whose filter doubles as an optimistic
//! precondition. A `None` result means the precondition no longer matched —
//! the race-loss signal the callers translate into a conflict or a no-op.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{Classroom, ClassroomState, GeoBounds, GeoPoint, JoinRequest, JoinRequestState, Subject};

/// Filter over the classroom collection. Every lookup implicitly excludes
/// soft-deleted documents.
#[derive(Debug, Clone, Default)]
pub struct ClassroomFilter {
    pub id: Option<String>,
    pub owner: Option<String>,
    pub available: Option<bool>,
    pub terminated: Option<bool>,
    pub states: Option<Vec<ClassroomState>>,
    /// Matches classrooms whose current participant set contains this user
    pub has_participant: Option<String>,
    /// Matches classrooms whose current participant set does NOT contain
    /// this user
    pub not_participant: Option<String>,
    pub has_history_participant: Option<String>,
    /// Case-insensitive substring match on the subject name
    pub subject_name_contains: Option<String>,
    pub within: Option<GeoBounds>,
}

impl ClassroomFilter {
    pub fn by_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.available = Some(available);
        self
    }

    pub fn terminated(mut self, terminated: bool) -> Self {
        self.terminated = Some(terminated);
        self
    }

    pub fn states(mut self, states: &[ClassroomState]) -> Self {
        self.states = Some(states.to_vec());
        self
    }

    pub fn has_participant(mut self, user: &str) -> Self {
        self.has_participant = Some(user.to_string());
        self
    }

    pub fn not_participant(mut self, user: &str) -> Self {
        self.not_participant = Some(user.to_string());
        self
    }

    pub fn has_history_participant(mut self, user: &str) -> Self {
        self.has_history_participant = Some(user.to_string());
        self
    }

    pub fn subject_name_contains(mut self, text: &str) -> Self {
        self.subject_name_contains = Some(text.to_string());
        self
    }

    pub fn within(mut self, bounds: GeoBounds) -> Self {
        self.within = Some(bounds);
        self
    }

    pub fn matches(&self, classroom: &Classroom) -> bool {
        if classroom.is_deleted {
            return false;
        }
        if let Some(id) = &self.id {
            if &classroom.id != id {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if &classroom.owner != owner {
                return false;
            }
        }
        if let Some(available) = self.available {
            if classroom.available != available {
                return false;
            }
        }
        if let Some(terminated) = self.terminated {
            if classroom.terminated != terminated {
                return false;
            }
        }
        if let Some(states) = &self.states {
            if !states.contains(&classroom.state) {
                return false;
            }
        }
        if let Some(user) = &self.has_participant {
            if !classroom.has_participant(user) {
                return false;
            }
        }
        if let Some(user) = &self.not_participant {
            if classroom.has_participant(user) {
                return false;
            }
        }
        if let Some(user) = &self.has_history_participant {
            if !classroom.history_participants.iter().any(|p| p == user) {
                return false;
            }
        }
        if let Some(text) = &self.subject_name_contains {
            let name = classroom.subject.name.to_lowercase();
            if !name.contains(&text.to_lowercase()) {
                return false;
            }
        }
        if let Some(bounds) = &self.within {
            if !bounds.contains(&classroom.location) {
                return false;
            }
        }
        true
    }
}

/// Typed patch applied to a classroom document. Field presence is explicit;
/// `tutor` uses a nested Option so the assignment can be cleared.
#[derive(Debug, Clone, Default)]
pub struct ClassroomUpdate {
    pub name: Option<String>,
    pub subject: Option<Subject>,
    pub location: Option<GeoPoint>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub state: Option<ClassroomState>,
    pub available: Option<bool>,
    pub terminated: Option<bool>,
    pub owner: Option<String>,
    /// `Some(None)` clears the tutor assignment
    pub tutor: Option<Option<String>>,

    /// Add-to-set on both current and history participants
    pub add_participant: Option<String>,
    pub pull_participant: Option<String>,
    pub clear_participants: bool,

    pub push_join_request: Option<String>,
    pub pull_join_request: Option<String>,

    /// Recompute `available` from the participant count after the
    /// membership edits above have been applied
    pub recompute_available: bool,

    pub soft_delete: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ClassroomUpdate {
    pub fn apply(&self, classroom: &mut Classroom) {
        if let Some(name) = &self.name {
            classroom.name = name.clone();
        }
        if let Some(subject) = &self.subject {
            classroom.subject = subject.clone();
        }
        if let Some(location) = self.location {
            classroom.location = location;
        }
        if let Some(address) = &self.address {
            classroom.address = address.clone();
        }
        if let Some(description) = &self.description {
            classroom.description = Some(description.clone());
        }
        if let Some(start_time) = self.start_time {
            classroom.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            classroom.end_time = end_time;
        }
        if let Some(state) = self.state {
            classroom.state = state;
        }
        if let Some(terminated) = self.terminated {
            classroom.terminated = terminated;
        }
        if let Some(owner) = &self.owner {
            classroom.owner = owner.clone();
        }
        if let Some(tutor) = &self.tutor {
            classroom.tutor = tutor.clone();
        }

        if let Some(user) = &self.add_participant {
            if !classroom.current_participants.iter().any(|p| p == user) {
                classroom.current_participants.push(user.clone());
            }
            if !classroom.history_participants.iter().any(|p| p == user) {
                classroom.history_participants.push(user.clone());
            }
        }
        if let Some(user) = &self.pull_participant {
            classroom.current_participants.retain(|p| p != user);
        }
        if self.clear_participants {
            classroom.current_participants.clear();
        }

        if let Some(id) = &self.push_join_request {
            if !classroom.join_requests.iter().any(|r| r == id) {
                classroom.join_requests.push(id.clone());
            }
        }
        if let Some(id) = &self.pull_join_request {
            classroom.join_requests.retain(|r| r != id);
        }

        if let Some(available) = self.available {
            classroom.available = available;
        }
        if self.recompute_available {
            classroom.available = !classroom.terminated && !classroom.is_full();
        }

        if let Some(at) = self.soft_delete {
            classroom.is_deleted = true;
            classroom.deleted_at = Some(at);
        }
        if let Some(at) = self.updated_at {
            classroom.updated_at = at;
        }
    }
}

/// Filter over the join-request collection
#[derive(Debug, Clone, Default)]
pub struct JoinRequestFilter {
    pub id: Option<String>,
    pub user: Option<String>,
    pub classroom_id: Option<String>,
    pub state: Option<JoinRequestState>,
}

impl JoinRequestFilter {
    pub fn by_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn classroom(mut self, classroom_id: &str) -> Self {
        self.classroom_id = Some(classroom_id.to_string());
        self
    }

    pub fn state(mut self, state: JoinRequestState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn matches(&self, request: &JoinRequest) -> bool {
        if request.is_deleted {
            return false;
        }
        if let Some(id) = &self.id {
            if &request.id != id {
                return false;
            }
        }
        if let Some(user) = &self.user {
            if &request.user != user {
                return false;
            }
        }
        if let Some(classroom_id) = &self.classroom_id {
            if &request.classroom_id != classroom_id {
                return false;
            }
        }
        if let Some(state) = self.state {
            if request.state != state {
                return false;
            }
        }
        true
    }
}

/// Typed patch applied to a join-request document
#[derive(Debug, Clone, Default)]
pub struct JoinRequestUpdate {
    pub state: Option<JoinRequestState>,
    pub reviewer: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl JoinRequestUpdate {
    pub fn apply(&self, request: &mut JoinRequest) {
        if let Some(state) = self.state {
            request.state = state;
        }
        if let Some(reviewer) = &self.reviewer {
            request.reviewer = Some(reviewer.clone());
        }
        if let Some(at) = self.updated_at {
            request.updated_at = at;
        }
    }
}

#[async_trait]
pub trait ClassroomStore: Send + Sync {
    async fn insert(&self, classroom: Classroom) -> Result<(), StoreError>;

    async fn find_one(&self, filter: ClassroomFilter) -> Result<Option<Classroom>, StoreError>;

    async fn find(&self, filter: ClassroomFilter) -> Result<Vec<Classroom>, StoreError>;

    /// Atomically applies `update` to the first document matching `filter`.
    /// Returns the updated document, or `None` if nothing matched — i.e.
    /// the precondition failed.
    async fn find_and_update(
        &self,
        filter: ClassroomFilter,
        update: ClassroomUpdate,
    ) -> Result<Option<Classroom>, StoreError>;
}

#[async_trait]
pub trait JoinRequestStore: Send + Sync {
    async fn insert(&self, request: JoinRequest) -> Result<(), StoreError>;

    async fn find_one(&self, filter: JoinRequestFilter) -> Result<Option<JoinRequest>, StoreError>;

    async fn find(&self, filter: JoinRequestFilter) -> Result<Vec<JoinRequest>, StoreError>;

    async fn find_and_update(
        &self,
        filter: JoinRequestFilter,
        update: JoinRequestUpdate,
    ) -> Result<Option<JoinRequest>, StoreError>;
}
