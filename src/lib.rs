//! Coordination core for time-bounded, capacity-limited group study
//! sessions ("classrooms").
//!
//! # Architecture
//!
//! - `classroom`: the service owning the lifecycle state machine
//!   (WAITING → LEARNING → FINISHED, plus owner-initiated termination),
//!   the membership workflows and the discovery queries
//! - `scheduler`: one-shot timers firing lifecycle transitions at
//!   wall-clock start/end instants, rebuilt from persisted state on restart
//! - `store`: conditional find/update seam over the classroom and
//!   join-request collections; the store is the arbiter of every race
//! - `notify`, `credential`, `clock`: external collaborator boundaries
//!
//! Identity, payments, attachments and the transport layer live outside
//! this crate; commands take acting users as plain ids.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use classroom_server::{
//!     ClassroomService, Config, LogNotifier, MemoryCredentialStore, MemoryStore, SystemClock,
//! };
//!
//! # async fn run() {
//! let store = MemoryStore::new();
//! let service = ClassroomService::new(
//!     store.clone(),
//!     store,
//!     MemoryCredentialStore::new(),
//!     Arc::new(LogNotifier),
//!     Arc::new(SystemClock),
//!     Config::from_env().limits,
//! );
//!
//! // Pick up where a previous process left off
//! service.recover_on_restart().await.unwrap();
//! # }
//! ```

pub mod classroom;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod store;

pub use classroom::{ClassroomPatch, ClassroomService, CreateClassroom, JoinOutcome, RecoverySummary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, LimitsConfig};
pub use credential::{CredentialStore, MemoryCredentialStore};
pub use error::{ClassroomError, ErrorKind, Result, StoreError};
pub use model::{Classroom, ClassroomState, GeoBounds, GeoPoint, JoinRequest, JoinRequestState, MemberRole, Subject};
pub use notify::{LogNotifier, MemoryNotifier, Notification, NotificationKind, NotificationQueue, Notifier};
pub use scheduler::{TransitionKind, TransitionScheduler};
pub use store::{ClassroomFilter, ClassroomStore, ClassroomUpdate, JoinRequestFilter, JoinRequestStore, JoinRequestUpdate, MemoryStore};
