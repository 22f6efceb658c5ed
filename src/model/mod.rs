mod classroom;
mod join_request;

pub use classroom::{Classroom, ClassroomState, GeoBounds, GeoPoint, MemberRole, Subject};
pub use join_request::{JoinRequest, JoinRequestState};

/// Generates a fresh document id
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
