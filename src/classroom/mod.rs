//! The classroom coordination service.
//!
//! Owns the lifecycle state machine (`lifecycle`), the membership workflows
//! (`membership`) and the discovery queries (`query`). All external
//! collaborators come in as injected trait objects; every mutation is a
//! conditional store update so concurrent commands resolve to exactly one
//! effective writer.

mod lifecycle;
mod membership;
mod params;
mod query;

pub use lifecycle::RecoverySummary;
pub use params::{ClassroomPatch, CreateClassroom, JoinOutcome};

use std::sync::{Arc, Weak};

use crate::clock::Clock;
use crate::config::LimitsConfig;
use crate::credential::CredentialStore;
use crate::error::Result;
use crate::model::{Classroom, ClassroomState};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::scheduler::TransitionScheduler;
use crate::store::{ClassroomFilter, ClassroomStore, JoinRequestStore};

pub struct ClassroomService {
    classrooms: Arc<dyn ClassroomStore>,
    requests: Arc<dyn JoinRequestStore>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<TransitionScheduler>,
    limits: LimitsConfig,
    /// Handle to self for the transition callbacks handed to the scheduler
    self_ref: Weak<ClassroomService>,
}

impl ClassroomService {
    pub fn new(
        classrooms: Arc<dyn ClassroomStore>,
        requests: Arc<dyn JoinRequestStore>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        limits: LimitsConfig,
    ) -> Arc<Self> {
        let scheduler = TransitionScheduler::new(clock.clone());
        Arc::new_cyclic(|self_ref| Self {
            classrooms,
            requests,
            credentials,
            notifier,
            clock,
            scheduler,
            limits,
            self_ref: self_ref.clone(),
        })
    }

    pub fn scheduler(&self) -> &Arc<TransitionScheduler> {
        &self.scheduler
    }

    /// Looks up a non-terminated classroom or reports it as missing
    pub(crate) async fn fetch_active(&self, classroom_id: &str) -> Result<Classroom> {
        self.classrooms
            .find_one(ClassroomFilter::by_id(classroom_id).terminated(false))
            .await?
            .ok_or_else(|| crate::error::ClassroomError::ClassroomNotFound(classroom_id.to_string()))
    }

    /// All non-terminated classrooms the user currently belongs to, the
    /// set both the concurrency cap and the overlap check run against
    pub(crate) async fn joined_classrooms(&self, user: &str) -> Result<Vec<Classroom>> {
        Ok(self
            .classrooms
            .find(ClassroomFilter::default().terminated(false).has_participant(user))
            .await?)
    }

    /// Best-effort notification; delivery problems are the notifier's to log
    pub(crate) async fn notify(
        &self,
        kind: NotificationKind,
        origin_user: &str,
        target_user: &str,
        classroom_id: &str,
        content: &str,
    ) {
        self.notifier
            .emit(Notification {
                kind,
                origin_user: origin_user.to_string(),
                target_user: target_user.to_string(),
                classroom_id: classroom_id.to_string(),
                content: content.to_string(),
            })
            .await;
    }

    /// Fans a notification out to every current participant
    pub(crate) async fn notify_participants(
        &self,
        classroom: &Classroom,
        kind: NotificationKind,
        content: &str,
    ) {
        let emissions = classroom
            .current_participants
            .iter()
            .map(|user| self.notify(kind, &classroom.owner, user, &classroom.id, content));
        futures::future::join_all(emissions).await;
    }

    pub(crate) fn states_allowing(kind: crate::scheduler::TransitionKind) -> &'static [ClassroomState] {
        match kind {
            crate::scheduler::TransitionKind::Start => &[ClassroomState::Waiting],
            crate::scheduler::TransitionKind::End => {
                &[ClassroomState::Waiting, ClassroomState::Learning]
            }
        }
    }
}
