use super::ClassroomService;
use crate::error::{ClassroomError, Result};
use crate::model::{Classroom, ClassroomState, GeoBounds};
use crate::store::ClassroomFilter;

impl ClassroomService {
    /// Classroom discovery by subject text and lifecycle state. Terminated
    /// and soft-deleted classrooms never show up.
    pub async fn search(
        &self,
        subject_text: Option<&str>,
        states: Option<&[ClassroomState]>,
    ) -> Result<Vec<Classroom>> {
        let filter = Self::discovery_filter(subject_text, states);
        Ok(self.classrooms.find(filter).await?)
    }

    /// Discovery restricted to a map viewport
    pub async fn search_on_map(
        &self,
        bounds: GeoBounds,
        subject_text: Option<&str>,
        states: Option<&[ClassroomState]>,
    ) -> Result<Vec<Classroom>> {
        let filter = Self::discovery_filter(subject_text, states).within(bounds);
        Ok(self.classrooms.find(filter).await?)
    }

    pub async fn get_by_id(&self, classroom_id: &str) -> Result<Classroom> {
        self.classrooms
            .find_one(ClassroomFilter::by_id(classroom_id))
            .await?
            .ok_or_else(|| ClassroomError::ClassroomNotFound(classroom_id.to_string()))
    }

    /// Non-terminated classrooms the user currently belongs to
    pub async fn current_for_user(&self, user: &str) -> Result<Vec<Classroom>> {
        self.joined_classrooms(user).await
    }

    /// Terminated classrooms the user has ever belonged to
    pub async fn history_for_user(&self, user: &str) -> Result<Vec<Classroom>> {
        Ok(self
            .classrooms
            .find(
                ClassroomFilter::default()
                    .terminated(true)
                    .has_history_participant(user),
            )
            .await?)
    }

    fn discovery_filter(
        subject_text: Option<&str>,
        states: Option<&[ClassroomState]>,
    ) -> ClassroomFilter {
        let mut filter = ClassroomFilter::default().terminated(false);
        if let Some(text) = subject_text {
            if !text.trim().is_empty() {
                filter = filter.subject_name_contains(text.trim());
            }
        }
        if let Some(states) = states {
            filter = filter.states(states);
        }
        filter
    }
}
