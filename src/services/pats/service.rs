use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::pat_repo::PatStore;
use crate::services::cache::ScopeCache;
use crate::services::keys::{Identity, KeyService};
use crate::services::pats::pat::{
    MAX_PAGE_LIMIT, Pat, PatPageMeta, PatRole, PatsPage, ScopePageMeta, ScopesPage,
};
use crate::services::pats::scope::{EntityType, Scope};
use crate::services::pats::secret;

/// Input for [`PatService::create_pat`].
#[derive(Debug, Clone, Default)]
pub struct NewPat {
    pub name: String,
    pub description: String,
    /// Falls back to the configured default lifetime.
    pub duration: Option<Duration>,
}

/// PAT lifecycle and scope-based authorization.
///
/// Management operations act on the PATs of the identity behind the bearer
/// token. `authorize_pat` is the hot path: the scope cache answers first and
/// the store is consulted on a miss.
#[derive(Clone)]
pub struct PatService {
    keys: Arc<KeyService>,
    store: Arc<dyn PatStore>,
    cache: Arc<dyn ScopeCache>,
    default_duration: Duration,
}

impl PatService {
    pub fn new(
        keys: Arc<KeyService>,
        store: Arc<dyn PatStore>,
        cache: Arc<dyn ScopeCache>,
        default_duration: Duration,
    ) -> Self {
        Self {
            keys,
            store,
            cache,
            default_duration,
        }
    }

    /// Returns the new PAT with its plaintext secret. The secret cannot be
    /// retrieved again.
    pub async fn create_pat(&self, token: &str, req: NewPat) -> Result<Pat, AppError> {
        let identity = self.keys.identify(token).await?;
        let duration = self.duration_or_default(req.duration)?;

        let id = Uuid::new_v4().to_string();
        let plaintext = secret::generate(&identity.id, &id)?;
        let now = Utc::now();

        let pat = Pat {
            id,
            user_id: identity.id.clone(),
            name: req.name,
            description: req.description,
            secret: secret::hash(&plaintext),
            role: PatRole::User,
            issued_at: now,
            expires_at: now + duration,
            updated_at: None,
            last_used_at: None,
            revoked: false,
            revoked_at: None,
        };
        pat.validate()?;

        self.store.save(pat.clone()).await.map_err(|e| {
            error!(user_id = %identity.id, error = %e, "failed to save pat");
            AppError::CreateEntity(e)
        })?;

        debug!(user_id = %pat.user_id, pat_id = %pat.id, expires_at = %pat.expires_at, "created pat");
        Ok(Pat {
            secret: plaintext,
            ..pat
        })
    }

    pub async fn update_pat_name(
        &self,
        token: &str,
        pat_id: &str,
        name: &str,
    ) -> Result<Pat, AppError> {
        let identity = self.keys.identify(token).await?;
        if name.trim().is_empty() {
            return Err(AppError::malformed("pat name is required"));
        }

        let pat = self
            .store
            .update_name(&identity.id, pat_id, name)
            .await
            .map_err(AppError::UpdateEntity)?;
        Ok(pat.redacted())
    }

    pub async fn update_pat_description(
        &self,
        token: &str,
        pat_id: &str,
        description: &str,
    ) -> Result<Pat, AppError> {
        let identity = self.keys.identify(token).await?;
        let pat = self
            .store
            .update_description(&identity.id, pat_id, description)
            .await
            .map_err(AppError::UpdateEntity)?;
        Ok(pat.redacted())
    }

    pub async fn retrieve_pat(&self, token: &str, pat_id: &str) -> Result<Pat, AppError> {
        let identity = self.keys.identify(token).await?;
        self.owned_pat(&identity, pat_id).await
    }

    pub async fn list_pats(&self, token: &str, meta: PatPageMeta) -> Result<PatsPage, AppError> {
        let identity = self.keys.identify(token).await?;
        let meta = meta.normalized()?;
        self.store
            .retrieve_all(&identity.id, &meta)
            .await
            .map_err(AppError::ViewEntity)
    }

    /// Delete a PAT together with its scopes and their cached copies.
    pub async fn delete_pat(&self, token: &str, pat_id: &str) -> Result<(), AppError> {
        let identity = self.keys.identify(token).await?;
        self.owned_pat(&identity, pat_id).await?;

        self.store
            .remove_all_scope(pat_id)
            .await
            .map_err(AppError::RemoveEntity)?;
        self.store
            .remove(&identity.id, pat_id)
            .await
            .map_err(|e| {
                error!(user_id = %identity.id, pat_id, error = %e, "failed to delete pat");
                AppError::RemoveEntity(e)
            })?;
        self.cache.remove_all_scope(&identity.id, pat_id).await?;

        debug!(user_id = %identity.id, pat_id, "deleted pat");
        Ok(())
    }

    /// Issue a new secret, clear revocation and restart the lifetime.
    /// Returns the PAT with the new plaintext secret.
    pub async fn reset_pat_secret(
        &self,
        token: &str,
        pat_id: &str,
        duration: Option<Duration>,
    ) -> Result<Pat, AppError> {
        let identity = self.keys.identify(token).await?;
        let duration = self.duration_or_default(duration)?;

        let plaintext = secret::generate(&identity.id, pat_id)?;
        let expires_at = Utc::now() + duration;

        let pat = self
            .store
            .update_token_hash(&identity.id, pat_id, &secret::hash(&plaintext), expires_at)
            .await
            .map_err(AppError::UpdateEntity)?;

        debug!(user_id = %identity.id, pat_id, expires_at = %expires_at, "reset pat secret");
        Ok(Pat {
            secret: plaintext,
            ..pat
        })
    }

    pub async fn revoke_pat_secret(&self, token: &str, pat_id: &str) -> Result<(), AppError> {
        let identity = self.keys.identify(token).await?;
        self.store
            .revoke(&identity.id, pat_id)
            .await
            .map_err(AppError::UpdateEntity)?;

        debug!(user_id = %identity.id, pat_id, "revoked pat secret");
        Ok(())
    }

    /// Attach scopes to a PAT and write them through to the cache.
    pub async fn add_scope(
        &self,
        token: &str,
        pat_id: &str,
        scopes: Vec<Scope>,
    ) -> Result<Vec<Scope>, AppError> {
        let identity = self.keys.identify(token).await?;
        if scopes.is_empty() {
            return Err(AppError::malformed("at least one scope is required"));
        }
        for scope in &scopes {
            scope.validate()?;
        }

        let added = self
            .store
            .add_scope(&identity.id, pat_id, scopes)
            .await
            .map_err(AppError::CreateEntity)?;

        // A cache write that fails only costs a store round-trip later.
        if let Err(e) = self.cache.save(&identity.id, &added).await {
            warn!(user_id = %identity.id, pat_id, error = %e, "failed to cache added scopes");
        }

        debug!(user_id = %identity.id, pat_id, count = added.len(), "added scopes");
        Ok(added)
    }

    /// Detach scopes by id. The cached scopes of the PAT are dropped before
    /// returning.
    pub async fn remove_scope(
        &self,
        token: &str,
        pat_id: &str,
        scope_ids: &[String],
    ) -> Result<(), AppError> {
        let identity = self.keys.identify(token).await?;
        if scope_ids.is_empty() {
            return Err(AppError::MissingEntityId);
        }

        self.store
            .remove_scope(&identity.id, pat_id, scope_ids)
            .await
            .map_err(AppError::RemoveEntity)?;
        self.cache.remove_all_scope(&identity.id, pat_id).await?;

        debug!(user_id = %identity.id, pat_id, count = scope_ids.len(), "removed scopes");
        Ok(())
    }

    pub async fn remove_pat_all_scope(&self, token: &str, pat_id: &str) -> Result<(), AppError> {
        let identity = self.keys.identify(token).await?;
        self.owned_pat(&identity, pat_id).await?;

        self.store
            .remove_all_scope(pat_id)
            .await
            .map_err(AppError::RemoveEntity)?;
        self.cache.remove_all_scope(&identity.id, pat_id).await?;

        debug!(user_id = %identity.id, pat_id, "removed all scopes");
        Ok(())
    }

    pub async fn list_scopes(&self, token: &str, meta: ScopePageMeta) -> Result<ScopesPage, AppError> {
        let identity = self.keys.identify(token).await?;
        let meta = meta.normalized()?;
        self.owned_pat(&identity, &meta.pat_id).await?;

        self.store
            .retrieve_scopes(&meta)
            .await
            .map_err(AppError::ViewEntity)
    }

    /// Resolve a PAT secret to its (redacted) record.
    pub async fn identify_pat(&self, pat_secret: &str) -> Result<Pat, AppError> {
        let (user_id, pat_id) = secret::parse(pat_secret)?;

        let status = self
            .store
            .retrieve_secret_and_revoke_status(&user_id, &pat_id)
            .await
            .map_err(|e| {
                debug!(user_id = %user_id, pat_id = %pat_id, error = %e, "pat lookup failed");
                AppError::Authentication
            })?;

        if status.hash != secret::hash(pat_secret) {
            warn!(user_id = %user_id, pat_id = %pat_id, "pat secret mismatch");
            return Err(AppError::Authentication);
        }
        if status.revoked {
            return Err(AppError::PatRevoked);
        }
        if Utc::now() > status.expires_at {
            return Err(AppError::PatExpired);
        }

        if let Err(e) = self.store.update_last_used(&user_id, &pat_id).await {
            warn!(user_id = %user_id, pat_id = %pat_id, error = %e, "failed to record pat usage");
        }

        self.store
            .retrieve(&user_id, &pat_id)
            .await
            .map(Pat::redacted)
            .map_err(|_| AppError::Authentication)
    }

    /// Check that the PAT holds a scope covering the request.
    pub async fn authorize_pat(
        &self,
        user_id: &str,
        pat_id: &str,
        entity_type: EntityType,
        domain_id: &str,
        operation: &str,
        entity_id: &str,
    ) -> Result<(), AppError> {
        match self
            .cache
            .check_scope(user_id, pat_id, entity_type, domain_id, operation, entity_id)
            .await
        {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                warn!(user_id, pat_id, error = %e, "scope cache unavailable, checking store");
            }
        }

        let allowed = self
            .store
            .check_scope(user_id, pat_id, entity_type, domain_id, operation, entity_id)
            .await
            .map_err(AppError::ViewEntity)?;
        if !allowed {
            debug!(
                user_id,
                pat_id,
                entity_type = %entity_type,
                domain_id,
                operation,
                entity_id,
                "pat scope denied"
            );
            return Err(AppError::Authorization);
        }

        self.refresh_cache(user_id, pat_id).await;
        Ok(())
    }

    /// Load the PAT's scopes from the store into the cache.
    ///
    /// A removal that lands while the scopes are in flight must not be undone
    /// by this write, so the store's scope generation is compared before and
    /// after writing: a change skips the write or drops what was written.
    async fn refresh_cache(&self, user_id: &str, pat_id: &str) {
        let generation = match self.store.scope_generation(pat_id).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(user_id, pat_id, error = %e, "failed to read scope generation");
                return;
            }
        };

        let mut scopes = Vec::new();
        let mut meta = ScopePageMeta {
            pat_id: pat_id.to_string(),
            offset: 0,
            limit: MAX_PAGE_LIMIT,
        };
        loop {
            let page = match self.store.retrieve_scopes(&meta).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(user_id, pat_id, error = %e, "failed to load scopes for cache");
                    return;
                }
            };
            meta.offset += page.scopes.len() as u64;
            let done = page.scopes.is_empty() || meta.offset >= page.total;
            scopes.extend(page.scopes);
            if done {
                break;
            }
        }

        if !self.generation_unchanged(pat_id, generation).await {
            debug!(user_id, pat_id, "scopes changed during refresh, not caching");
            return;
        }
        if let Err(e) = self.cache.save(user_id, &scopes).await {
            warn!(user_id, pat_id, error = %e, "failed to repopulate scope cache");
            return;
        }
        if !self.generation_unchanged(pat_id, generation).await
            && let Err(e) = self.cache.remove_all_scope(user_id, pat_id).await
        {
            warn!(user_id, pat_id, error = %e, "failed to drop stale cached scopes");
        }
    }

    async fn generation_unchanged(&self, pat_id: &str, generation: u64) -> bool {
        matches!(self.store.scope_generation(pat_id).await, Ok(current) if current == generation)
    }

    async fn owned_pat(&self, identity: &Identity, pat_id: &str) -> Result<Pat, AppError> {
        self.store
            .retrieve(&identity.id, pat_id)
            .await
            .map(Pat::redacted)
            .map_err(AppError::ViewEntity)
    }

    fn duration_or_default(&self, duration: Option<Duration>) -> Result<Duration, AppError> {
        match duration {
            Some(d) if d <= Duration::zero() => {
                Err(AppError::malformed("pat duration must be positive"))
            }
            Some(d) => Ok(d),
            None => Ok(self.default_duration),
        }
    }
}

impl std::fmt::Debug for PatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatService")
            .field("default_duration", &self.default_duration)
            .finish()
    }
}
