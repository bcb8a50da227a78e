use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::repos::error::{RepoError, RepoResult};
use crate::services::keys::Key;

/// Persistence for API keys. Login and recovery keys are never stored.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Store a key; fails with `Conflict` if `(issuer_id, id)` already exists.
    async fn save(&self, key: Key) -> RepoResult<String>;

    async fn retrieve(&self, issuer_id: &str, id: &str) -> RepoResult<Key>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, issuer_id: &str, id: &str) -> RepoResult<()>;
}

/// In-process key store, keyed by `(issuer_id, id)`.
#[derive(Debug, Default)]
pub struct InMemoryKeyRepo {
    keys: RwLock<HashMap<(String, String), Key>>,
}

impl InMemoryKeyRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepo {
    async fn save(&self, key: Key) -> RepoResult<String> {
        let mut keys = self.keys.write().await;
        let id = (key.issuer_id.clone(), key.id.clone());
        if keys.contains_key(&id) {
            return Err(RepoError::Conflict);
        }
        keys.insert(id, key.clone());
        Ok(key.id)
    }

    async fn retrieve(&self, issuer_id: &str, id: &str) -> RepoResult<Key> {
        self.keys
            .read()
            .await
            .get(&(issuer_id.to_string(), id.to_string()))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn remove(&self, issuer_id: &str, id: &str) -> RepoResult<()> {
        self.keys
            .write()
            .await
            .remove(&(issuer_id.to_string(), id.to_string()));
        Ok(())
    }
}
