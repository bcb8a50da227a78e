//! Tracing decorator for stores.
//!
//! `Instrumented<S>` implements the same store trait as `S` and records the
//! duration and outcome of every call. Compose it at wiring time:
//! `Arc::new(Instrumented::new("policies", InMemoryPolicyRepo::new()))`.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::repos::error::{RepoError, RepoResult};
use crate::repos::key_repo::KeyRepository;
use crate::repos::pat_repo::{PatStore, SecretStatus};
use crate::repos::policy_repo::PolicyStore;
use crate::services::keys::Key;
use crate::services::pats::{EntityType, Pat, PatPageMeta, PatsPage, Scope, ScopePageMeta, ScopesPage};
use crate::services::policies::{Page, Policy, PolicyEntityType, PolicyPage};

#[derive(Debug)]
pub struct Instrumented<S> {
    store: &'static str,
    inner: S,
}

impl<S> Instrumented<S> {
    pub fn new(store: &'static str, inner: S) -> Self {
        Self { store, inner }
    }

    async fn observe<T, Fut>(&self, op: &'static str, fut: Fut) -> RepoResult<T>
    where
        Fut: Future<Output = RepoResult<T>>,
    {
        let started = Instant::now();
        let res = fut.await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &res {
            Ok(_) => debug!(store = self.store, op, elapsed_ms, "store call"),
            // Expected outcomes, not failures of the backend.
            Err(e @ (RepoError::NotFound | RepoError::Conflict)) => {
                debug!(store = self.store, op, elapsed_ms, error = %e, "store call")
            }
            Err(e) => warn!(store = self.store, op, elapsed_ms, error = %e, "store call failed"),
        }
        res
    }
}

#[async_trait]
impl<S: KeyRepository> KeyRepository for Instrumented<S> {
    async fn save(&self, key: Key) -> RepoResult<String> {
        self.observe("save", self.inner.save(key)).await
    }

    async fn retrieve(&self, issuer_id: &str, id: &str) -> RepoResult<Key> {
        self.observe("retrieve", self.inner.retrieve(issuer_id, id))
            .await
    }

    async fn remove(&self, issuer_id: &str, id: &str) -> RepoResult<()> {
        self.observe("remove", self.inner.remove(issuer_id, id)).await
    }
}

#[async_trait]
impl<S: PolicyStore> PolicyStore for Instrumented<S> {
    async fn save(&self, policy: Policy) -> RepoResult<Policy> {
        self.observe("save", self.inner.save(policy)).await
    }

    async fn update(&self, policy: Policy) -> RepoResult<Policy> {
        self.observe("update", self.inner.update(policy)).await
    }

    async fn retrieve(&self, page: &Page) -> RepoResult<PolicyPage> {
        self.observe("retrieve", self.inner.retrieve(page)).await
    }

    async fn retrieve_one(&self, subject: &str, object: &str) -> RepoResult<Policy> {
        self.observe("retrieve_one", self.inner.retrieve_one(subject, object))
            .await
    }

    async fn delete(&self, subject: &str, object: &str) -> RepoResult<()> {
        self.observe("delete", self.inner.delete(subject, object))
            .await
    }

    async fn evaluate(&self, entity_type: PolicyEntityType, policy: &Policy) -> RepoResult<bool> {
        self.observe("evaluate", self.inner.evaluate(entity_type, policy))
            .await
    }

    async fn check_admin(&self, id: &str) -> RepoResult<bool> {
        self.observe("check_admin", self.inner.check_admin(id)).await
    }

    async fn assign_owner(&self, object: &str, owner: &str) -> RepoResult<()> {
        self.observe("assign_owner", self.inner.assign_owner(object, owner))
            .await
    }

    async fn check_owner(&self, object: &str, id: &str) -> RepoResult<bool> {
        self.observe("check_owner", self.inner.check_owner(object, id))
            .await
    }
}

#[async_trait]
impl<S: PatStore> PatStore for Instrumented<S> {
    async fn save(&self, pat: Pat) -> RepoResult<()> {
        self.observe("save", self.inner.save(pat)).await
    }

    async fn retrieve(&self, user_id: &str, pat_id: &str) -> RepoResult<Pat> {
        self.observe("retrieve", self.inner.retrieve(user_id, pat_id))
            .await
    }

    async fn retrieve_secret_and_revoke_status(
        &self,
        user_id: &str,
        pat_id: &str,
    ) -> RepoResult<SecretStatus> {
        self.observe(
            "retrieve_secret_and_revoke_status",
            self.inner.retrieve_secret_and_revoke_status(user_id, pat_id),
        )
        .await
    }

    async fn update_name(&self, user_id: &str, pat_id: &str, name: &str) -> RepoResult<Pat> {
        self.observe("update_name", self.inner.update_name(user_id, pat_id, name))
            .await
    }

    async fn update_description(
        &self,
        user_id: &str,
        pat_id: &str,
        description: &str,
    ) -> RepoResult<Pat> {
        self.observe(
            "update_description",
            self.inner.update_description(user_id, pat_id, description),
        )
        .await
    }

    async fn retrieve_all(&self, user_id: &str, meta: &PatPageMeta) -> RepoResult<PatsPage> {
        self.observe("retrieve_all", self.inner.retrieve_all(user_id, meta))
            .await
    }

    async fn update_token_hash(
        &self,
        user_id: &str,
        pat_id: &str,
        hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<Pat> {
        self.observe(
            "update_token_hash",
            self.inner.update_token_hash(user_id, pat_id, hash, expires_at),
        )
        .await
    }

    async fn revoke(&self, user_id: &str, pat_id: &str) -> RepoResult<()> {
        self.observe("revoke", self.inner.revoke(user_id, pat_id))
            .await
    }

    async fn remove(&self, user_id: &str, pat_id: &str) -> RepoResult<()> {
        self.observe("remove", self.inner.remove(user_id, pat_id))
            .await
    }

    async fn update_last_used(&self, user_id: &str, pat_id: &str) -> RepoResult<()> {
        self.observe("update_last_used", self.inner.update_last_used(user_id, pat_id))
            .await
    }

    async fn add_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        scopes: Vec<Scope>,
    ) -> RepoResult<Vec<Scope>> {
        self.observe("add_scope", self.inner.add_scope(user_id, pat_id, scopes))
            .await
    }

    async fn remove_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        scope_ids: &[String],
    ) -> RepoResult<()> {
        self.observe(
            "remove_scope",
            self.inner.remove_scope(user_id, pat_id, scope_ids),
        )
        .await
    }

    async fn remove_all_scope(&self, pat_id: &str) -> RepoResult<()> {
        self.observe("remove_all_scope", self.inner.remove_all_scope(pat_id))
            .await
    }

    async fn retrieve_scopes(&self, meta: &ScopePageMeta) -> RepoResult<ScopesPage> {
        self.observe("retrieve_scopes", self.inner.retrieve_scopes(meta))
            .await
    }

    async fn scope_generation(&self, pat_id: &str) -> RepoResult<u64> {
        self.observe("scope_generation", self.inner.scope_generation(pat_id))
            .await
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
        self.observe(
            "check_scope",
            self.inner
                .check_scope(user_id, pat_id, entity_type, domain_id, operation, entity_id),
        )
        .await
    }
}
