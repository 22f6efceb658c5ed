use super::{ClassroomService, JoinOutcome};
use crate::error::{ClassroomError, Result};
use crate::model::{Classroom, JoinRequest, JoinRequestState, MemberRole};
use crate::notify::NotificationKind;
use crate::store::{ClassroomFilter, ClassroomUpdate, JoinRequestFilter, JoinRequestUpdate};

impl ClassroomService {
    /// Joins a public classroom, or files a join request when the owner
    /// gates admission.
    pub async fn join_public(
        &self,
        classroom_id: &str,
        actor: &str,
        role: MemberRole,
    ) -> Result<JoinOutcome> {
        let classroom = self.joinable_classroom(classroom_id, actor).await?;
        if !classroom.is_public {
            return Err(ClassroomError::NotPublic);
        }
        self.check_join_eligibility(&classroom, actor, role).await?;

        if classroom.owner_approval_required {
            let pending = self
                .requests
                .find_one(
                    JoinRequestFilter::default()
                        .user(actor)
                        .classroom(classroom_id)
                        .state(JoinRequestState::Waiting),
                )
                .await?;
            if pending.is_some() {
                return Err(ClassroomError::DuplicateJoinRequest(
                    classroom_id.to_string(),
                ));
            }

            let request = JoinRequest::new(actor, classroom_id, role, self.clock.now());
            self.requests.insert(request.clone()).await?;
            self.classrooms
                .find_and_update(
                    ClassroomFilter::by_id(classroom_id).terminated(false),
                    ClassroomUpdate {
                        push_join_request: Some(request.id.clone()),
                        updated_at: Some(self.clock.now()),
                        ..Default::default()
                    },
                )
                .await?;

            tracing::info!(
                classroom_id = %classroom_id,
                user = %actor,
                request_id = %request.id,
                "Join request filed"
            );
            return Ok(JoinOutcome::Pending(request));
        }

        let updated = self.admit(&classroom, actor, role, None).await?;
        self.notify(
            NotificationKind::NewMember,
            actor,
            &updated.owner,
            &updated.id,
            &format!("{actor} joined your classroom"),
        )
        .await;
        Ok(JoinOutcome::Joined(updated))
    }

    /// Joins a private classroom; the caller must present the secret key
    pub async fn join_private(
        &self,
        classroom_id: &str,
        actor: &str,
        role: MemberRole,
        secret_key: &str,
    ) -> Result<Classroom> {
        let classroom = self.joinable_classroom(classroom_id, actor).await?;
        if classroom.is_public {
            return Err(ClassroomError::NotPrivate);
        }
        if classroom.secret_key != secret_key {
            return Err(ClassroomError::SecretKeyMismatch);
        }
        self.check_join_eligibility(&classroom, actor, role).await?;

        let updated = self.admit(&classroom, actor, role, None).await?;
        self.notify(
            NotificationKind::NewMember,
            actor,
            &updated.owner,
            &updated.id,
            &format!("{actor} joined your classroom"),
        )
        .await;
        Ok(updated)
    }

    /// Owner accepts a pending join request: same membership mutation as an
    /// unmediated join, plus request resolution.
    pub async fn accept_join_request(&self, request_id: &str, actor: &str) -> Result<Classroom> {
        let request = self
            .requests
            .find_one(JoinRequestFilter::by_id(request_id))
            .await?
            .ok_or_else(|| ClassroomError::RequestNotFound(request_id.to_string()))?;
        if request.state != JoinRequestState::Waiting {
            return Err(ClassroomError::RequestAlreadyHandled(request_id.to_string()));
        }

        let classroom = self
            .classrooms
            .find_one(ClassroomFilter::by_id(&request.classroom_id).terminated(false))
            .await?
            .ok_or_else(|| ClassroomError::ClassroomNotFound(request.classroom_id.clone()))?;
        if classroom.owner != actor {
            return Err(ClassroomError::NotRequestReviewer);
        }

        let updated = self
            .admit(&classroom, &request.user, request.role, Some(&request.id))
            .await?;

        self.requests
            .find_and_update(
                JoinRequestFilter::by_id(&request.id).state(JoinRequestState::Waiting),
                JoinRequestUpdate {
                    state: Some(JoinRequestState::Accepted),
                    reviewer: Some(actor.to_string()),
                    updated_at: Some(self.clock.now()),
                },
            )
            .await?;

        self.notify(
            NotificationKind::JoinRequestAccepted,
            actor,
            &request.user,
            &classroom.id,
            "Your join request has been accepted",
        )
        .await;

        tracing::info!(
            classroom_id = %classroom.id,
            user = %request.user,
            request_id = %request.id,
            "Join request accepted"
        );
        Ok(updated)
    }

    /// Owner rejects a pending join request; membership is untouched
    pub async fn reject_join_request(&self, request_id: &str, actor: &str) -> Result<JoinRequest> {
        let request = self
            .requests
            .find_one(JoinRequestFilter::by_id(request_id))
            .await?
            .ok_or_else(|| ClassroomError::RequestNotFound(request_id.to_string()))?;
        if request.state != JoinRequestState::Waiting {
            return Err(ClassroomError::RequestAlreadyHandled(request_id.to_string()));
        }

        let classroom = self
            .classrooms
            .find_one(ClassroomFilter::by_id(&request.classroom_id))
            .await?
            .ok_or_else(|| ClassroomError::ClassroomNotFound(request.classroom_id.clone()))?;
        if classroom.owner != actor {
            return Err(ClassroomError::NotRequestReviewer);
        }

        let resolved = self
            .requests
            .find_and_update(
                JoinRequestFilter::by_id(&request.id).state(JoinRequestState::Waiting),
                JoinRequestUpdate {
                    state: Some(JoinRequestState::Rejected),
                    reviewer: Some(actor.to_string()),
                    updated_at: Some(self.clock.now()),
                },
            )
            .await?
            .ok_or_else(|| ClassroomError::RequestAlreadyHandled(request_id.to_string()))?;

        self.classrooms
            .find_and_update(
                ClassroomFilter::by_id(&classroom.id),
                ClassroomUpdate {
                    pull_join_request: Some(request.id.clone()),
                    updated_at: Some(self.clock.now()),
                    ..Default::default()
                },
            )
            .await?;

        self.notify(
            NotificationKind::JoinRequestRejected,
            actor,
            &request.user,
            &classroom.id,
            "Your join request has been rejected",
        )
        .await;
        Ok(resolved)
    }

    /// Leaves a classroom. The sole remaining participant or the owner
    /// leaving terminates the whole classroom.
    pub async fn leave(&self, classroom_id: &str, actor: &str) -> Result<Classroom> {
        let classroom = self.fetch_active(classroom_id).await?;
        if !classroom.has_participant(actor) {
            return Err(ClassroomError::NotParticipant(actor.to_string()));
        }

        if classroom.current_participants.len() == 1 || classroom.owner == actor {
            return self.terminate(&classroom).await;
        }

        let clears_tutor = classroom.tutor.as_deref() == Some(actor);
        let update = ClassroomUpdate {
            pull_participant: Some(actor.to_string()),
            tutor: clears_tutor.then_some(None),
            recompute_available: true,
            updated_at: Some(self.clock.now()),
            ..Default::default()
        };
        let updated = self
            .classrooms
            .find_and_update(
                ClassroomFilter::by_id(classroom_id)
                    .terminated(false)
                    .has_participant(actor),
                update,
            )
            .await?
            .ok_or_else(|| ClassroomError::NotParticipant(actor.to_string()))?;

        tracing::info!(classroom_id = %classroom_id, user = %actor, "Participant left");
        Ok(updated)
    }

    /// Owner removes a participant
    pub async fn kick(&self, classroom_id: &str, actor: &str, target: &str) -> Result<Classroom> {
        if actor == target {
            return Err(ClassroomError::SelfKick);
        }
        let classroom = self.fetch_active(classroom_id).await?;
        if classroom.owner != actor {
            return Err(ClassroomError::NotOwner);
        }
        if !classroom.has_participant(target) {
            return Err(ClassroomError::NotParticipant(target.to_string()));
        }

        let clears_tutor = classroom.tutor.as_deref() == Some(target);
        let update = ClassroomUpdate {
            pull_participant: Some(target.to_string()),
            tutor: clears_tutor.then_some(None),
            recompute_available: true,
            updated_at: Some(self.clock.now()),
            ..Default::default()
        };
        let updated = self
            .classrooms
            .find_and_update(
                ClassroomFilter::by_id(classroom_id)
                    .terminated(false)
                    .has_participant(target),
                update,
            )
            .await?
            .ok_or_else(|| ClassroomError::NotParticipant(target.to_string()))?;

        self.notify(
            NotificationKind::MemberKicked,
            actor,
            target,
            classroom_id,
            "You have been kicked out of the classroom",
        )
        .await;

        tracing::info!(classroom_id = %classroom_id, target = %target, "Participant kicked");
        Ok(updated)
    }

    /// Owner hands the tutor role to another participant holding a
    /// credential for the classroom subject
    pub async fn transfer_tutor(
        &self,
        classroom_id: &str,
        actor: &str,
        target: &str,
    ) -> Result<Classroom> {
        let classroom = self.fetch_active(classroom_id).await?;
        if classroom.owner != actor {
            return Err(ClassroomError::NotOwner);
        }
        if !classroom.has_participant(target) {
            return Err(ClassroomError::NotParticipant(target.to_string()));
        }
        if !self
            .credentials
            .has_credential(target, &classroom.subject.id)
            .await?
        {
            return Err(ClassroomError::MissingCredential {
                user: target.to_string(),
                subject: classroom.subject.id.clone(),
            });
        }

        let updated = self
            .classrooms
            .find_and_update(
                ClassroomFilter::by_id(classroom_id)
                    .terminated(false)
                    .has_participant(target),
                ClassroomUpdate {
                    tutor: Some(Some(target.to_string())),
                    updated_at: Some(self.clock.now()),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| ClassroomError::NotParticipant(target.to_string()))?;

        self.notify(
            NotificationKind::TutorUpdated,
            actor,
            target,
            classroom_id,
            "You are now the tutor of this classroom",
        )
        .await;
        Ok(updated)
    }

    /// Owner hands ownership to another participant
    pub async fn transfer_owner(
        &self,
        classroom_id: &str,
        actor: &str,
        target: &str,
    ) -> Result<Classroom> {
        let classroom = self.fetch_active(classroom_id).await?;
        if classroom.owner != actor {
            return Err(ClassroomError::NotOwner);
        }
        if !classroom.has_participant(target) {
            return Err(ClassroomError::NotParticipant(target.to_string()));
        }

        let updated = self
            .classrooms
            .find_and_update(
                ClassroomFilter::by_id(classroom_id)
                    .terminated(false)
                    .has_participant(target),
                ClassroomUpdate {
                    owner: Some(target.to_string()),
                    updated_at: Some(self.clock.now()),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| ClassroomError::NotParticipant(target.to_string()))?;

        self.notify(
            NotificationKind::OwnerUpdated,
            actor,
            target,
            classroom_id,
            "You are now the owner of this classroom",
        )
        .await;
        Ok(updated)
    }

    /// Owner-only view of a classroom's pending join requests
    pub async fn pending_requests(
        &self,
        classroom_id: &str,
        actor: &str,
    ) -> Result<Vec<JoinRequest>> {
        let classroom = self.fetch_active(classroom_id).await?;
        if classroom.owner != actor {
            return Err(ClassroomError::NotOwner);
        }
        Ok(self
            .requests
            .find(
                JoinRequestFilter::default()
                    .classroom(classroom_id)
                    .state(JoinRequestState::Waiting),
            )
            .await?)
    }

    /// The classroom a join may target: available, not soft-deleted and not
    /// already containing the actor
    async fn joinable_classroom(&self, classroom_id: &str, actor: &str) -> Result<Classroom> {
        let classroom = self
            .classrooms
            .find_one(
                ClassroomFilter::by_id(classroom_id)
                    .available(true)
                    .not_participant(actor),
            )
            .await?
            .ok_or_else(|| ClassroomError::ClassroomUnavailable(classroom_id.to_string()))?;

        // `available` should already imply a free slot; this guards a
        // stale flag
        if classroom.is_full() {
            return Err(ClassroomError::ClassroomFull(classroom_id.to_string()));
        }
        Ok(classroom)
    }

    /// Per-user concurrency cap, schedule-overlap check and tutor
    /// credential check
    async fn check_join_eligibility(
        &self,
        classroom: &Classroom,
        actor: &str,
        role: MemberRole,
    ) -> Result<()> {
        let joined = self.joined_classrooms(actor).await?;
        if joined.len() >= self.limits.max_joined_classrooms {
            return Err(ClassroomError::JoinLimitReached(
                self.limits.max_joined_classrooms,
            ));
        }
        if let Some(conflict) = joined
            .iter()
            .find(|c| c.overlaps(classroom.start_time, classroom.end_time))
        {
            return Err(ClassroomError::StudyTimeConflict(conflict.id.clone()));
        }

        if role == MemberRole::Tutor
            && !self
                .credentials
                .has_credential(actor, &classroom.subject.id)
                .await?
        {
            return Err(ClassroomError::MissingCredential {
                user: actor.to_string(),
                subject: classroom.subject.id.clone(),
            });
        }
        Ok(())
    }

    /// The one membership mutation: conditionally adds the user, takes the
    /// tutor seat when requested, refreshes `available` and (for approval
    /// flows) pulls the resolved request from the pending set. The filter
    /// is the race guard — losing it means someone else took the last
    /// slot, the user joined concurrently, or the classroom terminated.
    async fn admit(
        &self,
        classroom: &Classroom,
        user: &str,
        role: MemberRole,
        resolve_request: Option<&str>,
    ) -> Result<Classroom> {
        let update = ClassroomUpdate {
            add_participant: Some(user.to_string()),
            tutor: (role == MemberRole::Tutor).then(|| Some(user.to_string())),
            pull_join_request: resolve_request.map(str::to_string),
            recompute_available: true,
            updated_at: Some(self.clock.now()),
            ..Default::default()
        };
        let filter = ClassroomFilter::by_id(&classroom.id)
            .terminated(false)
            .available(true)
            .not_participant(user);

        let updated = self
            .classrooms
            .find_and_update(filter, update)
            .await?
            .ok_or_else(|| ClassroomError::CapacityRaceLost(classroom.id.clone()))?;

        tracing::info!(
            classroom_id = %classroom.id,
            user = %user,
            role = ?role,
            available = updated.available,
            "Participant admitted"
        );
        Ok(updated)
    }
}
