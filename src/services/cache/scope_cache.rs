//! PAT scope cache.
//!
//! Key layout (all under a configurable prefix):
//! - `{prefix}:{user}:{pat}:{entity_type}:{domain}:{operation}` -> set of entity ids
//! - `{prefix}:{user}:{pat}` -> set of the scope keys above
//! - `{prefix}:{user}` -> set of pat ids with cached scopes
//!
//! A scope with an empty domain is stored under an empty domain segment; a
//! wildcard entity is stored as `*`. Lookups check both.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::services::cache::client::{CacheClient, CacheResult};
use crate::services::pats::{ANY_ENTITY, EntityType, Scope};

#[async_trait]
pub trait ScopeCache: Send + Sync {
    async fn save(&self, user_id: &str, scopes: &[Scope]) -> CacheResult<()>;

    async fn check_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        entity_type: EntityType,
        domain_id: &str,
        operation: &str,
        entity_id: &str,
    ) -> CacheResult<bool>;

    async fn remove(&self, user_id: &str, scopes: &[Scope]) -> CacheResult<()>;

    async fn remove_user_all_scope(&self, user_id: &str) -> CacheResult<()>;

    async fn remove_all_scope(&self, user_id: &str, pat_id: &str) -> CacheResult<()>;
}

#[derive(Clone, Debug)]
pub struct CachedScopes<C: CacheClient> {
    client: C,
    prefix: String,
    ttl: Duration,
}

impl<C: CacheClient> CachedScopes<C> {
    pub fn new(client: C, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn user_key(&self, user_id: &str) -> String {
        format!("{}:{user_id}", self.prefix)
    }

    fn pat_key(&self, user_id: &str, pat_id: &str) -> String {
        format!("{}:{user_id}:{pat_id}", self.prefix)
    }

    fn scope_key(
        &self,
        user_id: &str,
        pat_id: &str,
        entity_type: EntityType,
        domain_id: &str,
        operation: &str,
    ) -> String {
        format!(
            "{}:{user_id}:{pat_id}:{entity_type}:{domain_id}:{operation}",
            self.prefix
        )
    }

    fn key_for(&self, user_id: &str, scope: &Scope) -> String {
        self.scope_key(
            user_id,
            &scope.pat_id,
            scope.entity_type,
            &scope.domain_id,
            &scope.operation,
        )
    }
}

#[async_trait]
impl<C: CacheClient> ScopeCache for CachedScopes<C> {
    async fn save(&self, user_id: &str, scopes: &[Scope]) -> CacheResult<()> {
        let user_key = self.user_key(user_id);

        for scope in scopes {
            let key = self.key_for(user_id, scope);
            let pat_key = self.pat_key(user_id, &scope.pat_id);

            self.client
                .set_add(&key, std::slice::from_ref(&scope.entity_id))
                .await?;
            self.client
                .set_add(&pat_key, std::slice::from_ref(&key))
                .await?;
            self.client
                .set_add(&user_key, std::slice::from_ref(&scope.pat_id))
                .await?;

            for k in [&key, &pat_key, &user_key] {
                self.client.expire(k, self.ttl).await?;
            }
        }

        debug!(backend = self.client.backend_name(), user_id, count = scopes.len(), "cached scopes");
        Ok(())
    }

    async fn check_scope(
        &self,
        user_id: &str,
        pat_id: &str,
        entity_type: EntityType,
        domain_id: &str,
        operation: &str,
        entity_id: &str,
    ) -> CacheResult<bool> {
        let mut domains = vec![domain_id];
        if !domain_id.is_empty() {
            domains.push("");
        }
        let mut entities = vec![entity_id];
        if entity_id != ANY_ENTITY {
            entities.push(ANY_ENTITY);
        }

        for domain in domains {
            let key = self.scope_key(user_id, pat_id, entity_type, domain, operation);
            for entity in &entities {
                if self.client.set_is_member(&key, entity).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn remove(&self, user_id: &str, scopes: &[Scope]) -> CacheResult<()> {
        for scope in scopes {
            let key = self.key_for(user_id, scope);
            self.client
                .set_remove(&key, std::slice::from_ref(&scope.entity_id))
                .await?;
        }
        Ok(())
    }

    async fn remove_user_all_scope(&self, user_id: &str) -> CacheResult<()> {
        let user_key = self.user_key(user_id);
        for pat_id in self.client.set_members(&user_key).await? {
            self.remove_all_scope(user_id, &pat_id).await?;
        }
        self.client.del(&[user_key]).await?;
        Ok(())
    }

    async fn remove_all_scope(&self, user_id: &str, pat_id: &str) -> CacheResult<()> {
        let pat_key = self.pat_key(user_id, pat_id);

        let mut keys = self.client.set_members(&pat_key).await?;
        keys.push(pat_key);
        self.client.del(&keys).await?;
        self.client
            .set_remove(&self.user_key(user_id), &[pat_id.to_string()])
            .await?;

        debug!(backend = self.client.backend_name(), user_id, pat_id, "invalidated cached scopes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MemoryCacheClient;

    fn scope(pat_id: &str, et: EntityType, domain: &str, op: &str, entity: &str) -> Scope {
        Scope {
            pat_id: pat_id.to_string(),
            ..Scope::new(et, domain, op, entity)
        }
    }

    fn cache() -> (CachedScopes<MemoryCacheClient>, MemoryCacheClient) {
        let client = MemoryCacheClient::new();
        (
            CachedScopes::new(client.clone(), "pat:scope", Duration::from_secs(60)),
            client,
        )
    }

    #[tokio::test]
    async fn exact_and_wildcard_lookups() {
        let (cache, _) = cache();
        cache
            .save(
                "u1",
                &[
                    scope("p1", EntityType::Clients, "d1", "view", "c1"),
                    scope("p1", EntityType::Channels, "d1", "update", "*"),
                    scope("p1", EntityType::Domains, "", "view", "d7"),
                ],
            )
            .await
            .unwrap();

        for (pat, et, domain, op, entity, want) in [
            ("p1", EntityType::Clients, "d1", "view", "c1", true),
            ("p1", EntityType::Clients, "d1", "view", "c2", false),
            ("p1", EntityType::Clients, "d2", "view", "c1", false),
            ("p1", EntityType::Channels, "d1", "update", "any", true),
            ("p1", EntityType::Domains, "anywhere", "view", "d7", true),
            ("p2", EntityType::Clients, "d1", "view", "c1", false),
        ] {
            let got = cache
                .check_scope("u1", pat, et, domain, op, entity)
                .await
                .unwrap();
            assert_eq!(got, want, "{pat} {et} {domain} {op} {entity}");
        }
    }

    #[tokio::test]
    async fn remove_all_scope_only_touches_one_pat() {
        let (cache, _) = cache();
        cache
            .save(
                "u1",
                &[
                    scope("p1", EntityType::Groups, "d1", "view", "*"),
                    scope("p2", EntityType::Groups, "d1", "view", "*"),
                ],
            )
            .await
            .unwrap();

        cache.remove_all_scope("u1", "p1").await.unwrap();

        for (pat, want) in [("p1", false), ("p2", true)] {
            let got = cache
                .check_scope("u1", pat, EntityType::Groups, "d1", "view", "g1")
                .await
                .unwrap();
            assert_eq!(got, want, "{pat}");
        }
    }

    #[tokio::test]
    async fn remove_user_all_scope_clears_everything() {
        let (cache, client) = cache();
        cache
            .save(
                "u1",
                &[
                    scope("p1", EntityType::Groups, "d1", "view", "*"),
                    scope("p2", EntityType::Messages, "d1", "publish", "ch1"),
                ],
            )
            .await
            .unwrap();

        cache.remove_user_all_scope("u1").await.unwrap();
        assert!(client.is_empty().await);
    }

    #[tokio::test]
    async fn remove_drops_single_grant() {
        let (cache, _) = cache();
        let s = scope("p1", EntityType::Clients, "d1", "delete", "c1");
        cache.save("u1", std::slice::from_ref(&s)).await.unwrap();
        cache.remove("u1", &[s]).await.unwrap();
        assert!(!cache
            .check_scope("u1", "p1", EntityType::Clients, "d1", "delete", "c1")
            .await
            .unwrap());
    }
}
