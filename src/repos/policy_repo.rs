use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::repos::error::{RepoError, RepoResult};
use crate::services::policies::{Page, Policy, PolicyEntityType, PolicyPage};

/// Persistence and evaluation for [`Policy`] edges.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert a new policy; fails with `Conflict` if `(subject, object)` exists.
    async fn save(&self, policy: Policy) -> RepoResult<Policy>;

    /// Replace an existing policy; fails with `NotFound` if it is missing.
    async fn update(&self, policy: Policy) -> RepoResult<Policy>;

    async fn retrieve(&self, page: &Page) -> RepoResult<PolicyPage>;

    async fn retrieve_one(&self, subject: &str, object: &str) -> RepoResult<Policy>;

    async fn delete(&self, subject: &str, object: &str) -> RepoResult<()>;

    /// Whether `policy.subject` may perform every action in `policy.actions`
    /// on `policy.object` under the rules of `entity_type`.
    async fn evaluate(&self, entity_type: PolicyEntityType, policy: &Policy) -> RepoResult<bool>;

    async fn check_admin(&self, id: &str) -> RepoResult<bool>;

    /// Record `owner` as the owner of `object`. Re-assigning the same owner is
    /// a no-op; a different existing owner is a `Conflict`.
    async fn assign_owner(&self, object: &str, owner: &str) -> RepoResult<()>;

    async fn check_owner(&self, object: &str, id: &str) -> RepoResult<bool>;
}

#[derive(Debug, Default)]
struct PolicyState {
    policies: HashMap<(String, String), Policy>,
    // object id -> owner id
    owners: HashMap<String, String>,
    admins: HashSet<String>,
}

/// In-process policy store.
#[derive(Debug, Default)]
pub struct InMemoryPolicyRepo {
    state: RwLock<PolicyState>,
}

impl InMemoryPolicyRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admins<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = PolicyState {
            admins: admins.into_iter().map(Into::into).collect(),
            ..PolicyState::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }
}

impl PolicyState {
    fn owns(&self, subject: &str, object: &str) -> bool {
        self.owners.get(object).is_some_and(|o| o == subject)
    }

    fn direct_grant(&self, subject: &str, object: &str, action: &str) -> bool {
        self.policies
            .get(&(subject.to_string(), object.to_string()))
            .is_some_and(|p| p.allows(action))
    }

    // Two clients are related when the subject holds `action` on some shared
    // object (typically a channel) that the target client is also attached to.
    fn shared_grant(&self, subject: &str, object: &str, action: &str) -> bool {
        self.policies
            .values()
            .filter(|p| p.subject == subject && p.allows(action))
            .any(|p| {
                self.policies
                    .contains_key(&(object.to_string(), p.object.clone()))
            })
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyRepo {
    async fn save(&self, policy: Policy) -> RepoResult<Policy> {
        let mut state = self.state.write().await;
        let id = (policy.subject.clone(), policy.object.clone());
        if state.policies.contains_key(&id) {
            return Err(RepoError::Conflict);
        }
        state.policies.insert(id, policy.clone());
        Ok(policy)
    }

    async fn update(&self, policy: Policy) -> RepoResult<Policy> {
        let mut state = self.state.write().await;
        let stored = state
            .policies
            .get_mut(&(policy.subject.clone(), policy.object.clone()))
            .ok_or(RepoError::NotFound)?;
        *stored = policy.clone();
        Ok(policy)
    }

    async fn retrieve(&self, page: &Page) -> RepoResult<PolicyPage> {
        let state = self.state.read().await;
        let mut matched: Vec<&Policy> = state.policies.values().filter(|p| page.matches(p)).collect();
        matched.sort_by(|a, b| (&a.subject, &a.object).cmp(&(&b.subject, &b.object)));

        let total = matched.len() as u64;
        let policies = matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok(PolicyPage {
            total,
            offset: page.offset,
            limit: page.limit,
            policies,
        })
    }

    async fn retrieve_one(&self, subject: &str, object: &str) -> RepoResult<Policy> {
        self.state
            .read()
            .await
            .policies
            .get(&(subject.to_string(), object.to_string()))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn delete(&self, subject: &str, object: &str) -> RepoResult<()> {
        self.state
            .write()
            .await
            .policies
            .remove(&(subject.to_string(), object.to_string()))
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn evaluate(&self, entity_type: PolicyEntityType, policy: &Policy) -> RepoResult<bool> {
        let state = self.state.read().await;
        let (subject, object) = (policy.subject.as_str(), policy.object.as_str());

        if state.owns(subject, object) {
            return Ok(true);
        }

        let allowed = match entity_type {
            PolicyEntityType::Client => policy.actions.iter().all(|action| {
                state.direct_grant(subject, object, action)
                    || state.shared_grant(subject, object, action)
            }),
            PolicyEntityType::Group => policy
                .actions
                .iter()
                .all(|action| state.direct_grant(subject, object, action)),
        };
        Ok(allowed)
    }

    async fn check_admin(&self, id: &str) -> RepoResult<bool> {
        Ok(self.state.read().await.admins.contains(id))
    }

    async fn assign_owner(&self, object: &str, owner: &str) -> RepoResult<()> {
        let mut state = self.state.write().await;
        match state.owners.get(object) {
            Some(current) if current == owner => Ok(()),
            Some(_) => Err(RepoError::Conflict),
            None => {
                state.owners.insert(object.to_string(), owner.to_string());
                Ok(())
            }
        }
    }

    async fn check_owner(&self, object: &str, id: &str) -> RepoResult<bool> {
        Ok(self.state.read().await.owns(id, object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_is_unique_per_subject_and_object() {
        let repo = InMemoryPolicyRepo::new();
        repo.save(Policy::new("a", "o", &["g_list"])).await.unwrap();
        assert!(matches!(
            repo.save(Policy::new("a", "o", &["g_update"])).await,
            Err(RepoError::Conflict)
        ));
        repo.save(Policy::new("b", "o", &["g_list"])).await.unwrap();
    }

    #[tokio::test]
    async fn update_replaces_actions() {
        let repo = InMemoryPolicyRepo::new();
        repo.save(Policy::new("a", "o", &["g_list", "g_update"]))
            .await
            .unwrap();
        repo.update(Policy::new("a", "o", &["g_delete"])).await.unwrap();

        let stored = repo.retrieve_one("a", "o").await.unwrap();
        assert_eq!(stored.actions, vec!["g_delete".to_string()]);

        assert!(matches!(
            repo.update(Policy::new("x", "o", &["g_list"])).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn group_evaluation_needs_direct_row_or_ownership() {
        let repo = InMemoryPolicyRepo::new();
        repo.save(Policy::new("user", "group", &["g_list"]))
            .await
            .unwrap();
        repo.assign_owner("owned-group", "user").await.unwrap();

        let eval = |object: &str, action: &str| Policy::new("user", object, &[action]);
        assert!(repo.evaluate(PolicyEntityType::Group, &eval("group", "g_list")).await.unwrap());
        assert!(!repo.evaluate(PolicyEntityType::Group, &eval("group", "g_delete")).await.unwrap());
        assert!(repo.evaluate(PolicyEntityType::Group, &eval("owned-group", "g_delete")).await.unwrap());
        assert!(!repo.evaluate(PolicyEntityType::Group, &eval("other", "g_list")).await.unwrap());
    }

    #[tokio::test]
    async fn clients_sharing_a_channel_are_related() {
        let repo = InMemoryPolicyRepo::new();
        repo.save(Policy::new("client-a", "channel", &["m_write"]))
            .await
            .unwrap();
        repo.save(Policy::new("client-b", "channel", &["m_read"]))
            .await
            .unwrap();

        let req = Policy::new("client-a", "client-b", &["m_write"]);
        assert!(repo.evaluate(PolicyEntityType::Client, &req).await.unwrap());

        // client-b does not hold m_write on the shared channel
        let req = Policy::new("client-b", "client-a", &["m_write"]);
        assert!(!repo.evaluate(PolicyEntityType::Client, &req).await.unwrap());

        // group rules do not follow shared edges
        let req = Policy::new("client-a", "client-b", &["m_write"]);
        assert!(!repo.evaluate(PolicyEntityType::Group, &req).await.unwrap());
    }

    #[tokio::test]
    async fn retrieve_filters_and_pages() {
        let repo = InMemoryPolicyRepo::with_admins(["admin"]);
        for subject in ["a", "b", "c"] {
            repo.save(Policy::new(subject, "o", &["g_list"])).await.unwrap();
        }
        repo.save(Policy::new("a", "p", &["g_update"])).await.unwrap();

        let page = Page {
            object: Some("o".to_string()),
            offset: 1,
            limit: 1,
            ..Page::default()
        };
        let res = repo.retrieve(&page).await.unwrap();
        assert_eq!(res.total, 3);
        assert_eq!(res.policies.len(), 1);
        assert_eq!(res.policies[0].subject, "b");

        let page = Page {
            action: Some("g_update".to_string()),
            limit: 10,
            ..Page::default()
        };
        assert_eq!(repo.retrieve(&page).await.unwrap().total, 1);

        assert!(repo.check_admin("admin").await.unwrap());
        assert!(!repo.check_admin("a").await.unwrap());
    }

    #[tokio::test]
    async fn ownership_is_exclusive() {
        let repo = InMemoryPolicyRepo::new();
        repo.assign_owner("group", "alice").await.unwrap();
        repo.assign_owner("group", "alice").await.unwrap();

        assert!(matches!(
            repo.assign_owner("group", "mallory").await,
            Err(RepoError::Conflict)
        ));
        assert!(repo.check_owner("group", "alice").await.unwrap());
        assert!(!repo.check_owner("group", "mallory").await.unwrap());
        assert!(!repo.check_owner("other", "alice").await.unwrap());
    }
}
