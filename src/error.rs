use thiserror::Error;

/// Custom error types for the classroom server
#[derive(Debug, Error)]
pub enum ClassroomError {
    /// Input validation errors
    #[error("Required field missing: {0}")]
    MissingField(&'static str),

    #[error("Invalid start and end time")]
    InvalidTimeRange,

    #[error("Start time must not be in the past")]
    StartTimeInPast,

    #[error("Max participants must be between {min} and {max}")]
    InvalidCapacity { min: u32, max: u32 },

    #[error("Secret key required for private classroom")]
    SecretKeyRequired,

    #[error("Secret key does not match")]
    SecretKeyMismatch,

    #[error("Invalid classroom member role: {0}")]
    InvalidRole(String),

    /// Lookup errors
    #[error("Classroom {0} not found")]
    ClassroomNotFound(String),

    #[error("Join request {0} not found")]
    RequestNotFound(String),

    /// Membership errors
    #[error("Classroom {0} is not currently available or you have already joined")]
    ClassroomUnavailable(String),

    #[error("Classroom {0} is full")]
    ClassroomFull(String),

    #[error("Classroom {0} is full (another join won the last slot)")]
    CapacityRaceLost(String),

    #[error("You can only join a maximum of {0} classrooms")]
    JoinLimitReached(usize),

    #[error("Study time conflicts with classroom {0}")]
    StudyTimeConflict(String),

    #[error("You have already sent a join request to classroom {0}")]
    DuplicateJoinRequest(String),

    #[error("Join request {0} has already been handled")]
    RequestAlreadyHandled(String),

    #[error("User {user} has no proof of level for subject {subject}")]
    MissingCredential { user: String, subject: String },

    #[error("User {0} is not a participant of this classroom")]
    NotParticipant(String),

    /// Authorization errors
    #[error("This is not a public classroom")]
    NotPublic,

    #[error("This is not a private classroom")]
    NotPrivate,

    #[error("Only the classroom owner can perform this operation")]
    NotOwner,

    #[error("Only the classroom owner can handle join requests")]
    NotRequestReviewer,

    #[error("You cannot kick yourself")]
    SelfKick,

    /// Lifecycle errors
    #[error("Classroom {0} is no longer active")]
    ClassroomNotActive(String),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Coarse classification of an error, the shape an outer RPC/HTTP layer
/// would map onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    Unauthenticated,
    Conflict,
    NotFound,
    Internal,
}

impl ClassroomError {
    pub fn kind(&self) -> ErrorKind {
        use ClassroomError::*;
        match self {
            MissingField(_)
            | InvalidTimeRange
            | StartTimeInPast
            | InvalidCapacity { .. }
            | SecretKeyRequired
            | SecretKeyMismatch
            | InvalidRole(_)
            | ClassroomUnavailable(_)
            | JoinLimitReached(_)
            | StudyTimeConflict(_)
            | DuplicateJoinRequest(_)
            | NotParticipant(_)
            | ClassroomNotActive(_) => ErrorKind::BadRequest,
            NotPublic | NotPrivate | NotOwner | SelfKick | MissingCredential { .. } => {
                ErrorKind::Forbidden
            }
            NotRequestReviewer => ErrorKind::Unauthenticated,
            ClassroomFull(_) | CapacityRaceLost(_) | RequestAlreadyHandled(_) => {
                ErrorKind::Conflict
            }
            ClassroomNotFound(_) | RequestNotFound(_) => ErrorKind::NotFound,
            Store(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for Results using ClassroomError
pub type Result<T> = std::result::Result<T, ClassroomError>;
