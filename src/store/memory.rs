use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    ClassroomFilter, ClassroomStore, ClassroomUpdate, JoinRequestFilter, JoinRequestStore,
    JoinRequestUpdate,
};
use crate::error::StoreError;
use crate::model::{Classroom, JoinRequest};

/// In-process document store. The write lock is held across match-and-apply
/// in `find_and_update`, which is what makes the filter an effective
/// optimistic precondition: concurrent writers serialize on the lock and
/// the loser re-evaluates against the winner's result.
pub struct MemoryStore {
    classrooms: RwLock<HashMap<String, Classroom>>,
    requests: RwLock<HashMap<String, JoinRequest>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            classrooms: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
        })
    }
}

fn sorted_classrooms(mut found: Vec<Classroom>) -> Vec<Classroom> {
    found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    found
}

#[async_trait]
impl ClassroomStore for MemoryStore {
    async fn insert(&self, classroom: Classroom) -> Result<(), StoreError> {
        let mut classrooms = self.classrooms.write().await;
        classrooms.insert(classroom.id.clone(), classroom);
        Ok(())
    }

    async fn find_one(&self, filter: ClassroomFilter) -> Result<Option<Classroom>, StoreError> {
        let classrooms = self.classrooms.read().await;
        Ok(classrooms.values().find(|c| filter.matches(c)).cloned())
    }

    async fn find(&self, filter: ClassroomFilter) -> Result<Vec<Classroom>, StoreError> {
        let classrooms = self.classrooms.read().await;
        let found = classrooms
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        Ok(sorted_classrooms(found))
    }

    async fn find_and_update(
        &self,
        filter: ClassroomFilter,
        update: ClassroomUpdate,
    ) -> Result<Option<Classroom>, StoreError> {
        let mut classrooms = self.classrooms.write().await;
        let target = classrooms.values_mut().find(|c| filter.matches(c));
        match target {
            Some(classroom) => {
                update.apply(classroom);
                Ok(Some(classroom.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl JoinRequestStore for MemoryStore {
    async fn insert(&self, request: JoinRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn find_one(&self, filter: JoinRequestFilter) -> Result<Option<JoinRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.values().find(|r| filter.matches(r)).cloned())
    }

    async fn find(&self, filter: JoinRequestFilter) -> Result<Vec<JoinRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut found: Vec<JoinRequest> = requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn find_and_update(
        &self,
        filter: JoinRequestFilter,
        update: JoinRequestUpdate,
    ) -> Result<Option<JoinRequest>, StoreError> {
        let mut requests = self.requests.write().await;
        let target = requests.values_mut().find(|r| filter.matches(r));
        match target {
            Some(request) => {
                update.apply(request);
                Ok(Some(request.clone()))
            }
            None => Ok(None),
        }
    }
}
