use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Lookup of externally verified proof-of-level credentials. Holding a
/// credential for a subject is what permits a user to take the TUTOR role.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn has_credential(&self, user: &str, subject_id: &str) -> Result<bool, StoreError>;
}

/// In-process credential store for tests and bootstrap setups
pub struct MemoryCredentialStore {
    grants: RwLock<HashSet<(String, String)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            grants: RwLock::new(HashSet::new()),
        })
    }

    pub async fn grant(&self, user: &str, subject_id: &str) {
        let mut grants = self.grants.write().await;
        grants.insert((user.to_string(), subject_id.to_string()));
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn has_credential(&self, user: &str, subject_id: &str) -> Result<bool, StoreError> {
        let grants = self.grants.read().await;
        Ok(grants.contains(&(user.to_string(), subject_id.to_string())))
    }
}
