use chrono::{DateTime, Utc};

use super::{ClassroomPatch, ClassroomService, CreateClassroom};
use crate::error::{ClassroomError, Result};
use crate::model::{Classroom, ClassroomState};
use crate::notify::NotificationKind;
use crate::scheduler::TransitionKind;
use crate::store::{ClassroomFilter, ClassroomUpdate};

/// What a restart recovery scan found and did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub scanned: usize,
    pub corrected: usize,
    pub rescheduled: usize,
}

impl ClassroomService {
    /// Creates a classroom. The actor becomes creator, owner and sole
    /// initial participant; START and END transitions are registered.
    pub async fn create(&self, actor: &str, params: CreateClassroom) -> Result<Classroom> {
        let now = self.clock.now();

        if params.name.trim().is_empty() {
            return Err(ClassroomError::MissingField("name"));
        }
        if params.subject.id.trim().is_empty() || params.subject.name.trim().is_empty() {
            return Err(ClassroomError::MissingField("subject"));
        }
        if params.address.trim().is_empty() {
            return Err(ClassroomError::MissingField("address"));
        }
        if params.max_participants < self.limits.min_participants
            || params.max_participants > self.limits.max_participants
        {
            return Err(ClassroomError::InvalidCapacity {
                min: self.limits.min_participants,
                max: self.limits.max_participants,
            });
        }
        if params.start_time >= params.end_time {
            return Err(ClassroomError::InvalidTimeRange);
        }
        if params.start_time < now {
            return Err(ClassroomError::StartTimeInPast);
        }

        // Public rooms carry no secret; private rooms require one and are
        // never approval-gated.
        let (secret_key, owner_approval_required) = if params.is_public {
            (String::new(), params.owner_approval_required)
        } else {
            match params.secret_key.as_deref() {
                None | Some("") => return Err(ClassroomError::SecretKeyRequired),
                Some(key) => (key.to_string(), false),
            }
        };

        if params.owner_is_tutor
            && !self
                .credentials
                .has_credential(actor, &params.subject.id)
                .await?
        {
            return Err(ClassroomError::MissingCredential {
                user: actor.to_string(),
                subject: params.subject.id.clone(),
            });
        }

        let joined = self.joined_classrooms(actor).await?;
        if joined.len() >= self.limits.max_joined_classrooms {
            return Err(ClassroomError::JoinLimitReached(
                self.limits.max_joined_classrooms,
            ));
        }
        if let Some(conflict) = joined
            .iter()
            .find(|c| c.overlaps(params.start_time, params.end_time))
        {
            return Err(ClassroomError::StudyTimeConflict(conflict.id.clone()));
        }

        let classroom = Classroom {
            id: crate::model::new_id(),
            name: params.name,
            subject: params.subject,
            creator: actor.to_string(),
            owner: actor.to_string(),
            tutor: params.owner_is_tutor.then(|| actor.to_string()),
            current_participants: vec![actor.to_string()],
            history_participants: vec![actor.to_string()],
            max_participants: params.max_participants,
            state: ClassroomState::Waiting,
            available: true,
            terminated: false,
            join_requests: vec![],
            location: params.location,
            address: params.address,
            description: params.description,
            start_time: params.start_time,
            end_time: params.end_time,
            is_public: params.is_public,
            owner_approval_required,
            secret_key,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        self.classrooms.insert(classroom.clone()).await?;
        self.register_transition(&classroom.id, TransitionKind::Start, classroom.start_time)
            .await;
        self.register_transition(&classroom.id, TransitionKind::End, classroom.end_time)
            .await;

        tracing::info!(
            classroom_id = %classroom.id,
            owner = %actor,
            start_time = %classroom.start_time,
            "Classroom created"
        );
        Ok(classroom)
    }

    /// Applies an owner-issued patch. Time changes re-validate ordering and
    /// overlap and re-register the affected scheduled transitions; moving
    /// the start resets the classroom to WAITING.
    pub async fn update(
        &self,
        classroom_id: &str,
        actor: &str,
        patch: ClassroomPatch,
    ) -> Result<Classroom> {
        let now = self.clock.now();
        let classroom = self.fetch_active(classroom_id).await?;

        if classroom.owner != actor {
            return Err(ClassroomError::NotOwner);
        }
        if classroom.state == ClassroomState::Finished {
            return Err(ClassroomError::ClassroomNotActive(classroom_id.to_string()));
        }
        if patch.is_empty() {
            return Ok(classroom);
        }

        let new_start = patch.start_time.unwrap_or(classroom.start_time);
        let new_end = patch.end_time.unwrap_or(classroom.end_time);
        let times_changed = patch.start_time.is_some() || patch.end_time.is_some();
        if times_changed {
            if patch.start_time.is_some() && new_start < now {
                return Err(ClassroomError::StartTimeInPast);
            }
            if new_start >= new_end {
                return Err(ClassroomError::InvalidTimeRange);
            }
            let others = self.joined_classrooms(actor).await?;
            if let Some(conflict) = others
                .iter()
                .filter(|c| c.id != classroom.id)
                .find(|c| c.overlaps(new_start, new_end))
            {
                return Err(ClassroomError::StudyTimeConflict(conflict.id.clone()));
            }
        }

        let subject_changed = patch
            .subject
            .as_ref()
            .map(|s| s.id != classroom.subject.id)
            .unwrap_or(false);

        let mut update = ClassroomUpdate {
            name: patch.name,
            subject: patch.subject,
            location: patch.location,
            address: patch.address,
            description: patch.description,
            start_time: patch.start_time,
            end_time: patch.end_time,
            updated_at: Some(now),
            ..Default::default()
        };
        if update.start_time.is_some() {
            // The classroom has not started under its new schedule yet
            update.state = Some(ClassroomState::Waiting);
        }
        if subject_changed && classroom.tutor.is_some() {
            // The tutor credential was validated against the old subject
            update.tutor = Some(None);
        }

        let updated = self
            .classrooms
            .find_and_update(
                ClassroomFilter::by_id(classroom_id).terminated(false),
                update,
            )
            .await?
            .ok_or_else(|| ClassroomError::ClassroomNotActive(classroom_id.to_string()))?;

        if patch.start_time.is_some() {
            self.register_transition(classroom_id, TransitionKind::Start, updated.start_time)
                .await;
        }
        if patch.end_time.is_some() {
            self.register_transition(classroom_id, TransitionKind::End, updated.end_time)
                .await;
        }

        tracing::info!(classroom_id = %classroom_id, "Classroom updated");
        Ok(updated)
    }

    /// Owner-initiated early end
    pub async fn end(&self, classroom_id: &str, actor: &str) -> Result<Classroom> {
        let classroom = self.fetch_active(classroom_id).await?;
        if classroom.owner != actor {
            return Err(ClassroomError::NotOwner);
        }
        self.terminate(&classroom).await
    }

    /// Soft-deletes a classroom (admin surface); the historical record is
    /// kept but every query and command stops seeing it.
    pub async fn delete(&self, classroom_id: &str) -> Result<()> {
        let now = self.clock.now();
        let update = ClassroomUpdate {
            available: Some(false),
            soft_delete: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        let deleted = self
            .classrooms
            .find_and_update(ClassroomFilter::by_id(classroom_id), update)
            .await?;
        if deleted.is_none() {
            return Err(ClassroomError::ClassroomNotFound(classroom_id.to_string()));
        }
        self.scheduler.cancel_all(classroom_id).await;
        tracing::info!(classroom_id = %classroom_id, "Classroom soft-deleted");
        Ok(())
    }

    /// Terminates a classroom: clears membership, flags it terminated and
    /// unavailable, cancels pending timers and notifies the (former)
    /// participants. Callers handle authorization.
    pub(crate) async fn terminate(&self, classroom: &Classroom) -> Result<Classroom> {
        let now = self.clock.now();
        let update = ClassroomUpdate {
            state: Some(ClassroomState::Finished),
            available: Some(false),
            terminated: Some(true),
            clear_participants: true,
            updated_at: Some(now),
            ..Default::default()
        };
        let updated = self
            .classrooms
            .find_and_update(
                ClassroomFilter::by_id(&classroom.id).terminated(false),
                update,
            )
            .await?
            .ok_or_else(|| ClassroomError::ClassroomNotActive(classroom.id.clone()))?;

        self.scheduler.cancel_all(&classroom.id).await;
        // The pre-termination snapshot still knows who to tell
        self.notify_participants(
            classroom,
            NotificationKind::ClassroomTerminated,
            "Your classroom has been terminated",
        )
        .await;

        tracing::info!(classroom_id = %classroom.id, "Classroom terminated");
        Ok(updated)
    }

    /// Scheduler-invoked lifecycle transition. Idempotent: a fire against a
    /// terminated or already-transitioned classroom is a silent no-op, and
    /// write failures are logged rather than retried (the next restart scan
    /// reconciles).
    pub async fn transition_on_schedule(&self, classroom_id: &str, kind: TransitionKind) {
        let now = self.clock.now();
        let (new_state, notification, content) = match kind {
            TransitionKind::Start => (
                ClassroomState::Learning,
                NotificationKind::ClassroomStarted,
                "Your classroom has started",
            ),
            TransitionKind::End => (
                ClassroomState::Finished,
                NotificationKind::ClassroomFinished,
                "Your classroom has finished",
            ),
        };

        let filter = ClassroomFilter::by_id(classroom_id)
            .terminated(false)
            .states(Self::states_allowing(kind));
        let update = ClassroomUpdate {
            state: Some(new_state),
            updated_at: Some(now),
            ..Default::default()
        };

        match self.classrooms.find_and_update(filter, update).await {
            Ok(Some(updated)) => {
                tracing::info!(
                    classroom_id = %classroom_id,
                    state = ?updated.state,
                    "Scheduled transition applied"
                );
                self.notify_participants(&updated, notification, content).await;
            }
            Ok(None) => {
                tracing::debug!(
                    classroom_id = %classroom_id,
                    kind = ?kind,
                    "Scheduled transition no longer applicable, skipping"
                );
            }
            Err(e) => {
                tracing::error!(
                    classroom_id = %classroom_id,
                    kind = ?kind,
                    error = %e,
                    "Scheduled transition failed"
                );
            }
        }
    }

    /// Rebuilds scheduler state after a process restart: corrects stale
    /// persisted lifecycle states and re-registers exactly the still-future
    /// transitions.
    pub async fn recover_on_restart(&self) -> Result<RecoverySummary> {
        let now = self.clock.now();
        let classrooms = self
            .classrooms
            .find(ClassroomFilter::default().terminated(false))
            .await?;

        let mut summary = RecoverySummary::default();
        for classroom in classrooms {
            summary.scanned += 1;

            let expected = classroom.expected_state_at(now);
            if classroom.state != expected {
                let corrected = self
                    .classrooms
                    .find_and_update(
                        ClassroomFilter::by_id(&classroom.id).terminated(false),
                        ClassroomUpdate {
                            state: Some(expected),
                            updated_at: Some(now),
                            ..Default::default()
                        },
                    )
                    .await?;
                if corrected.is_some() {
                    summary.corrected += 1;
                    tracing::warn!(
                        classroom_id = %classroom.id,
                        from = ?classroom.state,
                        to = ?expected,
                        "Corrected stale classroom state"
                    );
                }
            }

            if now < classroom.start_time {
                self.register_transition(&classroom.id, TransitionKind::Start, classroom.start_time)
                    .await;
                self.register_transition(&classroom.id, TransitionKind::End, classroom.end_time)
                    .await;
                summary.rescheduled += 2;
            } else if now < classroom.end_time {
                self.register_transition(&classroom.id, TransitionKind::End, classroom.end_time)
                    .await;
                summary.rescheduled += 1;
            }
        }

        tracing::info!(
            scanned = summary.scanned,
            corrected = summary.corrected,
            rescheduled = summary.rescheduled,
            "Restart recovery complete"
        );
        Ok(summary)
    }

    pub(crate) async fn register_transition(
        &self,
        classroom_id: &str,
        kind: TransitionKind,
        fire_at: DateTime<Utc>,
    ) {
        let Some(service) = self.self_ref.upgrade() else {
            return;
        };
        let id = classroom_id.to_string();
        self.scheduler
            .schedule(classroom_id, kind, fire_at, move || async move {
                service.transition_on_schedule(&id, kind).await;
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::testutil::{harness, params};
    use crate::error::ErrorKind;
    use crate::store::ClassroomStore;
    use chrono::Duration;

    async fn force_state(h: &crate::classroom::testutil::TestHarness, id: &str, state: ClassroomState) {
        ClassroomStore::find_and_update(
            h.store.as_ref(),
            ClassroomFilter::by_id(id),
            ClassroomUpdate {
                state: Some(state),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_initializes_classroom() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();

        assert_eq!(classroom.state, ClassroomState::Waiting);
        assert!(classroom.available);
        assert!(!classroom.terminated);
        assert_eq!(classroom.creator, "u1");
        assert_eq!(classroom.owner, "u1");
        assert_eq!(classroom.current_participants, vec!["u1".to_string()]);
        assert_eq!(classroom.history_participants, vec!["u1".to_string()]);
        assert!(
            h.service
                .scheduler()
                .is_scheduled(&classroom.id, TransitionKind::Start)
                .await
        );
        assert!(
            h.service
                .scheduler()
                .is_scheduled(&classroom.id, TransitionKind::End)
                .await
        );
    }

    #[tokio::test]
    async fn test_create_rejects_bad_times() {
        let h = harness();

        let mut p = params(h.now);
        p.start_time = h.now + Duration::hours(2);
        p.end_time = h.now + Duration::hours(1);
        assert!(matches!(
            h.service.create("u1", p).await,
            Err(ClassroomError::InvalidTimeRange)
        ));

        let mut p = params(h.now);
        p.start_time = h.now - Duration::minutes(1);
        assert!(matches!(
            h.service.create("u1", p).await,
            Err(ClassroomError::StartTimeInPast)
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_capacity() {
        let h = harness();
        let mut p = params(h.now);
        p.max_participants = 1;
        assert!(matches!(
            h.service.create("u1", p).await,
            Err(ClassroomError::InvalidCapacity { .. })
        ));

        let mut p = params(h.now);
        p.max_participants = 31;
        assert!(h.service.create("u1", p).await.is_err());
    }

    #[tokio::test]
    async fn test_create_private_requires_secret_and_disables_approval() {
        let h = harness();

        let mut p = params(h.now);
        p.is_public = false;
        p.secret_key = None;
        assert!(matches!(
            h.service.create("u1", p).await,
            Err(ClassroomError::SecretKeyRequired)
        ));

        let mut p = params(h.now);
        p.is_public = false;
        p.secret_key = Some("ABC".into());
        p.owner_approval_required = true;
        let classroom = h.service.create("u1", p).await.unwrap();
        assert_eq!(classroom.secret_key, "ABC");
        assert!(!classroom.owner_approval_required);
    }

    #[tokio::test]
    async fn test_create_public_clears_secret() {
        let h = harness();
        let mut p = params(h.now);
        p.secret_key = Some("should-not-survive".into());
        let classroom = h.service.create("u1", p).await.unwrap();
        assert_eq!(classroom.secret_key, "");
    }

    #[tokio::test]
    async fn test_create_owner_is_tutor_needs_credential() {
        let h = harness();
        let mut p = params(h.now);
        p.owner_is_tutor = true;
        let err = h.service.create("u1", p).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        h.credentials.grant("u1", "subj-math").await;
        let mut p = params(h.now);
        p.owner_is_tutor = true;
        let classroom = h.service.create("u1", p).await.unwrap();
        assert_eq!(classroom.tutor.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_create_rejects_overlap_with_own_classroom() {
        let h = harness();
        h.service.create("u1", params(h.now)).await.unwrap();

        // Same window again
        let err = h.service.create("u1", params(h.now)).await.unwrap_err();
        assert!(matches!(err, ClassroomError::StudyTimeConflict(_)));

        // Disjoint window is fine
        let mut p = params(h.now);
        p.start_time = h.now + Duration::hours(3);
        p.end_time = h.now + Duration::hours(4);
        assert!(h.service.create("u1", p).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_owner_only() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();

        let patch = ClassroomPatch {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let err = h
            .service
            .update(&classroom.id, "u2", patch.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassroomError::NotOwner));

        let updated = h.service.update(&classroom.id, "u1", patch).await.unwrap();
        assert_eq!(updated.name, "Renamed");
    }

    #[tokio::test]
    async fn test_update_start_resets_state_to_waiting() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();

        // Pretend the start already fired
        force_state(&h, &classroom.id, ClassroomState::Learning).await;

        let patch = ClassroomPatch {
            start_time: Some(h.now + Duration::hours(5)),
            end_time: Some(h.now + Duration::hours(6)),
            ..Default::default()
        };
        let updated = h.service.update(&classroom.id, "u1", patch).await.unwrap();
        assert_eq!(updated.state, ClassroomState::Waiting);
    }

    #[tokio::test]
    async fn test_update_end_only_keeps_learning_state() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();
        force_state(&h, &classroom.id, ClassroomState::Learning).await;

        let patch = ClassroomPatch {
            end_time: Some(h.now + Duration::hours(3)),
            ..Default::default()
        };
        let updated = h.service.update(&classroom.id, "u1", patch).await.unwrap();
        assert_eq!(updated.state, ClassroomState::Learning);
        assert_eq!(updated.end_time, h.now + Duration::hours(3));
    }

    #[tokio::test]
    async fn test_update_subject_clears_tutor() {
        let h = harness();
        h.credentials.grant("u1", "subj-math").await;
        let mut p = params(h.now);
        p.owner_is_tutor = true;
        let classroom = h.service.create("u1", p).await.unwrap();
        assert!(classroom.tutor.is_some());

        let patch = ClassroomPatch {
            subject: Some(crate::model::Subject {
                id: "subj-physics".into(),
                name: "Physics".into(),
            }),
            ..Default::default()
        };
        let updated = h.service.update(&classroom.id, "u1", patch).await.unwrap();
        assert!(updated.tutor.is_none());
    }

    #[tokio::test]
    async fn test_update_rejects_finished_classroom() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();
        force_state(&h, &classroom.id, ClassroomState::Finished).await;

        let patch = ClassroomPatch {
            name: Some("Too late".into()),
            ..Default::default()
        };
        let err = h.service.update(&classroom.id, "u1", patch).await.unwrap_err();
        assert!(matches!(err, ClassroomError::ClassroomNotActive(_)));
    }

    #[tokio::test]
    async fn test_end_terminates_and_clears() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();

        let err = h.service.end(&classroom.id, "u2").await.unwrap_err();
        assert!(matches!(err, ClassroomError::NotOwner));

        let ended = h.service.end(&classroom.id, "u1").await.unwrap();
        assert!(ended.terminated);
        assert!(!ended.available);
        assert_eq!(ended.state, ClassroomState::Finished);
        assert!(ended.current_participants.is_empty());
        // History is untouched by termination
        assert_eq!(ended.history_participants, vec!["u1".to_string()]);
        assert!(
            !h.service
                .scheduler()
                .is_scheduled(&classroom.id, TransitionKind::Start)
                .await
        );

        // Ending twice fails: the first writer won
        let err = h.service.end(&classroom.id, "u1").await.unwrap_err();
        assert!(matches!(err, ClassroomError::ClassroomNotFound(_)));
    }

    #[tokio::test]
    async fn test_transition_start_and_idempotence() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();

        h.service
            .transition_on_schedule(&classroom.id, TransitionKind::Start)
            .await;
        let current = h.service.get_by_id(&classroom.id).await.unwrap();
        assert_eq!(current.state, ClassroomState::Learning);

        // Re-firing START against LEARNING is a no-op
        h.service
            .transition_on_schedule(&classroom.id, TransitionKind::Start)
            .await;
        let current = h.service.get_by_id(&classroom.id).await.unwrap();
        assert_eq!(current.state, ClassroomState::Learning);

        let started = h.notifier.of_kind(NotificationKind::ClassroomStarted).await;
        assert_eq!(started.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_end_skips_terminated() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();
        h.service.end(&classroom.id, "u1").await.unwrap();

        h.service
            .transition_on_schedule(&classroom.id, TransitionKind::End)
            .await;
        assert!(
            h.notifier
                .of_kind(NotificationKind::ClassroomFinished)
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_delete_hides_classroom() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();

        h.service.delete(&classroom.id).await.unwrap();
        assert!(matches!(
            h.service.get_by_id(&classroom.id).await,
            Err(ClassroomError::ClassroomNotFound(_))
        ));
        assert!(matches!(
            h.service.delete(&classroom.id).await,
            Err(ClassroomError::ClassroomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_corrects_stale_state_and_reschedules() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();
        h.service.scheduler().cancel_all(&classroom.id).await;

        // Restart happens mid-session: persisted state is stale WAITING
        h.clock.set(h.now + Duration::minutes(90));
        let summary = h.service.recover_on_restart().await.unwrap();

        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.corrected, 1);
        assert_eq!(summary.rescheduled, 1);
        let current = h.service.get_by_id(&classroom.id).await.unwrap();
        assert_eq!(current.state, ClassroomState::Learning);
        assert!(
            h.service
                .scheduler()
                .is_scheduled(&classroom.id, TransitionKind::End)
                .await
        );
        assert!(
            !h.service
                .scheduler()
                .is_scheduled(&classroom.id, TransitionKind::Start)
                .await
        );
    }

    #[tokio::test]
    async fn test_recover_before_start_reschedules_both() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();
        h.service.scheduler().cancel_all(&classroom.id).await;

        let summary = h.service.recover_on_restart().await.unwrap();
        assert_eq!(summary.corrected, 0);
        assert_eq!(summary.rescheduled, 2);
        assert!(
            h.service
                .scheduler()
                .is_scheduled(&classroom.id, TransitionKind::Start)
                .await
        );
    }

    #[tokio::test]
    async fn test_recover_after_end_corrects_without_scheduling() {
        let h = harness();
        let classroom = h.service.create("u1", params(h.now)).await.unwrap();
        h.service.scheduler().cancel_all(&classroom.id).await;

        h.clock.set(h.now + Duration::hours(3));
        let summary = h.service.recover_on_restart().await.unwrap();
        assert_eq!(summary.corrected, 1);
        assert_eq!(summary.rescheduled, 0);
        let current = h.service.get_by_id(&classroom.id).await.unwrap();
        assert_eq!(current.state, ClassroomState::Finished);
    }
}
