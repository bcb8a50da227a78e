use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};
use crate::services::pats::{
    EntityType, Pat, PatPageMeta, PatView, PatsPage, Scope, ScopePageMeta, ScopesPage,
};

/// Stored secret hash with the state needed to accept or reject it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretStatus {
    pub hash: String,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
}

/// Persistence for PATs and their scopes.
///
/// Every PAT lookup is keyed by `(user_id, pat_id)`, so a user can never
/// reach another user's token.
#[async_trait]
pub trait PatStore: Send + Sync {
    async fn save(&self, pat: Pat) -> RepoResult<()>;

    async fn retrieve(&self, user_id: &str, pat_id: &str) -> RepoResult<Pat>;

    async fn retrieve_secret_and_revoke_status(
        &self,
        user_id: &str,
        pat_id: &str,
    ) -> RepoResult<SecretStatus>;

    async fn update_name(&self, user_id: &str, pat_id: &str, name: &str) -> RepoResult<Pat>;

    async fn update_description(
        &self,
        user_id: &str,
        pat_id: &str,
        description: &str,
    ) -> RepoResult<Pat>;

    async fn retrieve_all(&self, user_id: &str, meta: &PatPageMeta) -> RepoResult<PatsPage>;

    /// Store a new secret hash and expiry; clears revocation.
    async fn update_token_hash(
        &self,
        user_id: &str,
        pat_id: &str,
        hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<Pat>;

    async fn revoke(&self, user_id: &str, pat_id: &str) -> RepoResult<()>;

    async fn remove(&self, user_id: &str, pat_id: &str) -> RepoResult<()>;

    async fn update_last_used(&self, user_id: &str, pat_id: &str) -> RepoResult<()>;

    /// Attach scopes to a PAT. Ids are assigned here; grants identical to an
    /// existing scope are not duplicated.
    async fn add_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        scopes: Vec<Scope>,
    ) -> RepoResult<Vec<Scope>>;

    async fn remove_scope(&self, user_id: &str, pat_id: &str, scope_ids: &[String])
    -> RepoResult<()>;

    async fn remove_all_scope(&self, pat_id: &str) -> RepoResult<()>;

    async fn retrieve_scopes(&self, meta: &ScopePageMeta) -> RepoResult<ScopesPage>;

    /// Counter bumped by every removal of scopes from a PAT (including
    /// deleting the PAT). Starts at 0 and never decreases.
    async fn scope_generation(&self, pat_id: &str) -> RepoResult<u64>;

    async fn check_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        entity_type: EntityType,
        domain_id: &str,
        operation: &str,
        entity_id: &str,
    ) -> RepoResult<bool>;
}

#[derive(Debug, Default)]
struct PatState {
    pats: HashMap<(String, String), Pat>,
    // pat id -> scopes
    scopes: HashMap<String, Vec<Scope>>,
    // pat id -> scope removal counter
    generations: HashMap<String, u64>,
}

impl PatState {
    fn pat_mut(&mut self, user_id: &str, pat_id: &str) -> RepoResult<&mut Pat> {
        self.pats
            .get_mut(&(user_id.to_string(), pat_id.to_string()))
            .ok_or(RepoError::NotFound)
    }

    fn owns(&self, user_id: &str, pat_id: &str) -> bool {
        self.pats
            .contains_key(&(user_id.to_string(), pat_id.to_string()))
    }

    fn drop_scopes(&mut self, pat_id: &str) {
        self.scopes.remove(pat_id);
        self.bump_generation(pat_id);
    }

    fn bump_generation(&mut self, pat_id: &str) {
        *self.generations.entry(pat_id.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPatRepo {
    state: RwLock<PatState>,
}

impl InMemoryPatRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_grant(a: &Scope, b: &Scope) -> bool {
    a.entity_type == b.entity_type
        && a.domain_id == b.domain_id
        && a.operation == b.operation
        && a.entity_id == b.entity_id
}

#[async_trait]
impl PatStore for InMemoryPatRepo {
    async fn save(&self, pat: Pat) -> RepoResult<()> {
        let mut state = self.state.write().await;
        let id = (pat.user_id.clone(), pat.id.clone());
        if state.pats.contains_key(&id) {
            return Err(RepoError::Conflict);
        }
        state.pats.insert(id, pat);
        Ok(())
    }

    async fn retrieve(&self, user_id: &str, pat_id: &str) -> RepoResult<Pat> {
        self.state
            .read()
            .await
            .pats
            .get(&(user_id.to_string(), pat_id.to_string()))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn retrieve_secret_and_revoke_status(
        &self,
        user_id: &str,
        pat_id: &str,
    ) -> RepoResult<SecretStatus> {
        let pat = self.retrieve(user_id, pat_id).await?;
        Ok(SecretStatus {
            hash: pat.secret,
            revoked: pat.revoked,
            expires_at: pat.expires_at,
        })
    }

    async fn update_name(&self, user_id: &str, pat_id: &str, name: &str) -> RepoResult<Pat> {
        let mut state = self.state.write().await;
        let pat = state.pat_mut(user_id, pat_id)?;
        pat.name = name.to_string();
        pat.updated_at = Some(Utc::now());
        Ok(pat.clone())
    }

    async fn update_description(
        &self,
        user_id: &str,
        pat_id: &str,
        description: &str,
    ) -> RepoResult<Pat> {
        let mut state = self.state.write().await;
        let pat = state.pat_mut(user_id, pat_id)?;
        pat.description = description.to_string();
        pat.updated_at = Some(Utc::now());
        Ok(pat.clone())
    }

    async fn retrieve_all(&self, user_id: &str, meta: &PatPageMeta) -> RepoResult<PatsPage> {
        let state = self.state.read().await;
        let now = Utc::now();

        let mut matched: Vec<&Pat> = state
            .pats
            .values()
            .filter(|p| p.user_id == user_id && meta.matches(p, now))
            .collect();
        matched.sort_by(|a, b| (a.issued_at, &a.id).cmp(&(b.issued_at, &b.id)));

        let total = matched.len() as u64;
        let pats = matched
            .into_iter()
            .skip(meta.offset as usize)
            .take(meta.limit as usize)
            .map(|p| PatView::from(p.clone().redacted()))
            .collect();

        Ok(PatsPage {
            total,
            offset: meta.offset,
            limit: meta.limit,
            pats,
        })
    }

    async fn update_token_hash(
        &self,
        user_id: &str,
        pat_id: &str,
        hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<Pat> {
        let mut state = self.state.write().await;
        let pat = state.pat_mut(user_id, pat_id)?;
        pat.secret = hash.to_string();
        pat.expires_at = expires_at;
        pat.revoked = false;
        pat.revoked_at = None;
        pat.updated_at = Some(Utc::now());
        Ok(pat.clone())
    }

    async fn revoke(&self, user_id: &str, pat_id: &str) -> RepoResult<()> {
        let mut state = self.state.write().await;
        let pat = state.pat_mut(user_id, pat_id)?;
        let now = Utc::now();
        pat.revoked = true;
        pat.revoked_at = Some(now);
        pat.updated_at = Some(now);
        Ok(())
    }

    async fn remove(&self, user_id: &str, pat_id: &str) -> RepoResult<()> {
        let mut state = self.state.write().await;
        state
            .pats
            .remove(&(user_id.to_string(), pat_id.to_string()))
            .ok_or(RepoError::NotFound)?;
        state.drop_scopes(pat_id);
        Ok(())
    }

    async fn update_last_used(&self, user_id: &str, pat_id: &str) -> RepoResult<()> {
        let mut state = self.state.write().await;
        state.pat_mut(user_id, pat_id)?.last_used_at = Some(Utc::now());
        Ok(())
    }

    async fn add_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        scopes: Vec<Scope>,
    ) -> RepoResult<Vec<Scope>> {
        let mut state = self.state.write().await;
        if !state.owns(user_id, pat_id) {
            return Err(RepoError::NotFound);
        }

        let stored = state.scopes.entry(pat_id.to_string()).or_default();
        let mut added = Vec::with_capacity(scopes.len());
        for mut scope in scopes {
            if let Some(existing) = stored.iter().find(|s| same_grant(s, &scope)) {
                added.push(existing.clone());
                continue;
            }
            scope.id = Uuid::new_v4().to_string();
            scope.pat_id = pat_id.to_string();
            stored.push(scope.clone());
            added.push(scope);
        }
        Ok(added)
    }

    async fn remove_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        scope_ids: &[String],
    ) -> RepoResult<()> {
        let mut state = self.state.write().await;
        if !state.owns(user_id, pat_id) {
            return Err(RepoError::NotFound);
        }
        if let Some(stored) = state.scopes.get_mut(pat_id) {
            stored.retain(|s| !scope_ids.contains(&s.id));
        }
        state.bump_generation(pat_id);
        Ok(())
    }

    async fn remove_all_scope(&self, pat_id: &str) -> RepoResult<()> {
        self.state.write().await.drop_scopes(pat_id);
        Ok(())
    }

    async fn scope_generation(&self, pat_id: &str) -> RepoResult<u64> {
        Ok(self
            .state
            .read()
            .await
            .generations
            .get(pat_id)
            .copied()
            .unwrap_or_default())
    }

    async fn retrieve_scopes(&self, meta: &ScopePageMeta) -> RepoResult<ScopesPage> {
        let state = self.state.read().await;
        let all = state
            .scopes
            .get(&meta.pat_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(ScopesPage {
            total: all.len() as u64,
            offset: meta.offset,
            limit: meta.limit,
            scopes: all
                .iter()
                .skip(meta.offset as usize)
                .take(meta.limit as usize)
                .cloned()
                .collect(),
        })
    }

    async fn check_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        entity_type: EntityType,
        domain_id: &str,
        operation: &str,
        entity_id: &str,
    ) -> RepoResult<bool> {
        let state = self.state.read().await;
        if !state.owns(user_id, pat_id) {
            return Ok(false);
        }
        Ok(state.scopes.get(pat_id).is_some_and(|scopes| {
            scopes
                .iter()
                .any(|s| s.authorized(entity_type, domain_id, operation, entity_id))
        }))
    }
}
