use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::repos::error::RepoError;
use crate::repos::policy_repo::PolicyStore;
use crate::services::callback::{CallbackAuthorizer, PolicyRequest};
use crate::services::keys::{Identity, KeyService};
use crate::services::policies::policy::{Page, Policy, PolicyEntityType, PolicyPage};

/// Policy evaluation and administration.
///
/// Writes are subject to privilege containment: a caller that is neither an
/// admin nor the object's owner can only grant actions it already holds on
/// the same object.
#[derive(Clone)]
pub struct PolicyService {
    keys: Arc<KeyService>,
    store: Arc<dyn PolicyStore>,
    callback: Arc<CallbackAuthorizer>,
}

impl PolicyService {
    pub fn new(
        keys: Arc<KeyService>,
        store: Arc<dyn PolicyStore>,
        callback: Arc<CallbackAuthorizer>,
    ) -> Self {
        Self {
            keys,
            store,
            callback,
        }
    }

    /// Check that the caller may perform `policy.actions` on `policy.object`.
    ///
    /// The caller's identity replaces `policy.subject`. After the store grants,
    /// every action is also submitted to the configured callbacks.
    pub async fn evaluate(
        &self,
        token: &str,
        entity_type: &str,
        mut policy: Policy,
    ) -> Result<(), AppError> {
        let identity = self.keys.identify(token).await?;
        let entity_type: PolicyEntityType = entity_type.parse()?;
        policy.subject = identity.id;

        if policy.object.trim().is_empty() {
            return Err(AppError::MissingEntityId);
        }

        let allowed = self
            .store
            .evaluate(entity_type, &policy)
            .await
            .map_err(AppError::ViewEntity)?;
        if !allowed {
            warn!(
                subject = %policy.subject,
                object = %policy.object,
                entity_type = %entity_type,
                actions = ?policy.actions,
                "policy evaluation denied"
            );
            return Err(AppError::Authorization);
        }

        for action in &policy.actions {
            let req = callback_request(entity_type, &policy, action);
            self.callback.authorize(&req).await?;
        }

        debug!(subject = %policy.subject, object = %policy.object, "policy evaluation granted");
        Ok(())
    }

    /// Create a policy owned by the caller. An existing `(subject, object)`
    /// edge is updated in place instead, keeping its original owner.
    pub async fn add_policy(&self, token: &str, policy: Policy) -> Result<Policy, AppError> {
        let identity = self.keys.identify(token).await?;
        policy.validate()?;

        match self.store.retrieve_one(&policy.subject, &policy.object).await {
            Ok(existing) => return self.update_existing(&identity, existing, policy).await,
            Err(RepoError::NotFound) => {}
            Err(e) => return Err(AppError::ViewEntity(e)),
        }

        self.check_action_rank(&identity.id, &policy).await?;

        let policy = Policy {
            owner_id: identity.id.clone(),
            created_at: Some(Utc::now()),
            updated_at: None,
            updated_by: None,
            ..policy
        };
        let saved = self.store.save(policy).await.map_err(|e| {
            error!(owner_id = %identity.id, error = %e, "failed to save policy");
            AppError::CreateEntity(e)
        })?;

        debug!(
            owner_id = %saved.owner_id,
            subject = %saved.subject,
            object = %saved.object,
            "added policy"
        );
        Ok(saved)
    }

    /// Replace the actions of an existing policy.
    pub async fn update_policy(&self, token: &str, policy: Policy) -> Result<Policy, AppError> {
        let identity = self.keys.identify(token).await?;
        policy.validate()?;

        let existing = self
            .store
            .retrieve_one(&policy.subject, &policy.object)
            .await
            .map_err(AppError::UpdateEntity)?;
        self.update_existing(&identity, existing, policy).await
    }

    /// Delete a policy. Only admins and the policy's owner may delete it.
    pub async fn delete_policy(&self, token: &str, policy: Policy) -> Result<(), AppError> {
        let identity = self.keys.identify(token).await?;
        if policy.subject.trim().is_empty() || policy.object.trim().is_empty() {
            return Err(AppError::MissingEntityId);
        }

        let existing = self
            .store
            .retrieve_one(&policy.subject, &policy.object)
            .await
            .map_err(AppError::RemoveEntity)?;

        if !self.is_admin(&identity.id).await? {
            if existing.owner_id != identity.id {
                warn!(caller = %identity.id, owner_id = %existing.owner_id, "delete of foreign policy denied");
                return Err(AppError::Authorization);
            }
            self.check_action_rank(&identity.id, &existing).await?;
        }

        self.store
            .delete(&existing.subject, &existing.object)
            .await
            .map_err(|e| {
                error!(subject = %existing.subject, object = %existing.object, error = %e, "failed to delete policy");
                AppError::RemoveEntity(e)
            })?;

        debug!(subject = %existing.subject, object = %existing.object, caller = %identity.id, "deleted policy");
        Ok(())
    }

    /// Page through policies. Non-admin callers only see policies where they
    /// are the subject or the owner.
    pub async fn list_policies(&self, token: &str, page: Page) -> Result<PolicyPage, AppError> {
        let identity = self.keys.identify(token).await?;
        let mut page = page.normalized()?;

        page.viewer = if self.is_admin(&identity.id).await? {
            None
        } else {
            Some(identity.id)
        };

        self.store.retrieve(&page).await.map_err(AppError::ViewEntity)
    }

    /// Record `owner_id` as the owner of `object`. Admin only; entity
    /// services call this when they create the entity.
    pub async fn assign_owner(
        &self,
        token: &str,
        object: &str,
        owner_id: &str,
    ) -> Result<(), AppError> {
        let identity = self.keys.identify(token).await?;
        if object.trim().is_empty() || owner_id.trim().is_empty() {
            return Err(AppError::MissingEntityId);
        }
        if !self.is_admin(&identity.id).await? {
            warn!(caller = %identity.id, object, "owner assignment by non-admin denied");
            return Err(AppError::Authorization);
        }

        if self
            .store
            .check_owner(object, owner_id)
            .await
            .map_err(AppError::ViewEntity)?
        {
            return Err(AppError::StatusAlreadyAssigned);
        }
        self.store
            .assign_owner(object, owner_id)
            .await
            .map_err(|e| match e {
                RepoError::Conflict => AppError::Conflict,
                e => AppError::UpdateEntity(e),
            })?;

        debug!(object, owner_id, caller = %identity.id, "assigned object owner");
        Ok(())
    }

    async fn update_existing(
        &self,
        identity: &Identity,
        existing: Policy,
        policy: Policy,
    ) -> Result<Policy, AppError> {
        self.check_action_rank(&identity.id, &policy).await?;

        let updated = Policy {
            actions: policy.actions,
            updated_at: Some(Utc::now()),
            updated_by: Some(identity.id.clone()),
            ..existing
        };
        let updated = self.store.update(updated).await.map_err(|e| {
            error!(subject = %policy.subject, object = %policy.object, error = %e, "failed to update policy");
            AppError::UpdateEntity(e)
        })?;

        debug!(
            subject = %updated.subject,
            object = %updated.object,
            updated_by = %identity.id,
            "updated policy"
        );
        Ok(updated)
    }

    /// Fail with `HigherPolicyRank` unless the caller may grant every action
    /// in `policy` on its object: admins and the object's owner may grant
    /// anything, anyone else only actions it already holds there.
    async fn check_action_rank(&self, caller: &str, policy: &Policy) -> Result<(), AppError> {
        if self.is_admin(caller).await? {
            return Ok(());
        }
        if self
            .store
            .check_owner(&policy.object, caller)
            .await
            .map_err(AppError::ViewEntity)?
        {
            return Ok(());
        }

        let own = match self.store.retrieve_one(caller, &policy.object).await {
            Ok(own) => own,
            Err(RepoError::NotFound) => {
                warn!(caller, object = %policy.object, "caller holds no policy on the object");
                return Err(AppError::HigherPolicyRank);
            }
            Err(e) => return Err(AppError::ViewEntity(e)),
        };

        if let Some(action) = policy.actions.iter().find(|a| !own.allows(a)) {
            warn!(caller, object = %policy.object, action = %action, "policy exceeds caller's rank");
            return Err(AppError::HigherPolicyRank);
        }
        Ok(())
    }

    async fn is_admin(&self, id: &str) -> Result<bool, AppError> {
        self.store.check_admin(id).await.map_err(AppError::ViewEntity)
    }
}

fn callback_request(entity_type: PolicyEntityType, policy: &Policy, action: &str) -> PolicyRequest {
    let subject_type = match entity_type {
        PolicyEntityType::Client => "client",
        PolicyEntityType::Group => "user",
    };
    PolicyRequest {
        subject: policy.subject.clone(),
        subject_type: subject_type.to_string(),
        object: policy.object.clone(),
        object_type: entity_type.to_string(),
        permission: action.to_string(),
        ..PolicyRequest::default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    use super::*;
    use crate::error::ErrorKind;
    use crate::repos::key_repo::InMemoryKeyRepo;
    use crate::repos::policy_repo::InMemoryPolicyRepo;
    use crate::services::keys::{KeyRequest, KeyType, TokenCodec};

    struct Fixture {
        svc: PolicyService,
        keys: Arc<KeyService>,
        store: Arc<InMemoryPolicyRepo>,
    }

    fn fixture_with(callback: CallbackAuthorizer) -> Fixture {
        let keys = Arc::new(KeyService::new(
            TokenCodec::from_secret(b"secret", "iot-auth"),
            Arc::new(InMemoryKeyRepo::new()),
            Duration::minutes(10),
        ));
        let store = Arc::new(InMemoryPolicyRepo::with_admins(["admin"]));
        let svc = PolicyService::new(keys.clone(), store.clone(), Arc::new(callback));
        Fixture { svc, keys, store }
    }

    fn fixture() -> Fixture {
        fixture_with(CallbackAuthorizer::disabled())
    }

    async fn login(keys: &KeyService, user: &str) -> String {
        let req = KeyRequest {
            key_type: KeyType::Login,
            issuer_id: user.to_string(),
            subject: format!("{user}@example.com"),
            duration: None,
        };
        keys.issue("", req).await.unwrap().token
    }

    #[tokio::test]
    async fn add_policy_cannot_exceed_callers_actions() {
        let f = fixture();
        f.store.save(Policy::new("caller", "object", &["a"])).await.unwrap();
        let token = login(&f.keys, "caller").await;

        let err = f
            .svc
            .add_policy(&token, Policy::new("friend", "object", &["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HigherPolicyRank));

        let saved = f
            .svc
            .add_policy(&token, Policy::new("friend", "object", &["a"]))
            .await
            .unwrap();
        assert_eq!(saved.owner_id, "caller");
        assert!(saved.created_at.is_some());
    }

    #[tokio::test]
    async fn add_policy_on_own_edge_is_rank_checked() {
        let f = fixture();
        f.store.save(Policy::new("caller", "object", &["a"])).await.unwrap();
        let token = login(&f.keys, "caller").await;

        let err = f
            .svc
            .add_policy(&token, Policy::new("caller", "object", &["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HigherPolicyRank));

        f.svc
            .add_policy(&token, Policy::new("caller", "object", &["a"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_existing_policy_updates_in_place() {
        let f = fixture();
        f.store.assign_owner("object", "owner").await.unwrap();
        let token = login(&f.keys, "owner").await;
        f.svc
            .add_policy(&token, Policy::new("friend", "object", &["a", "b"]))
            .await
            .unwrap();

        let updated = f
            .svc
            .add_policy(&token, Policy::new("friend", "object", &["c"]))
            .await
            .unwrap();

        assert_eq!(updated.owner_id, "owner");
        assert_eq!(updated.actions, vec!["c".to_string()]);
        assert_eq!(updated.updated_by.as_deref(), Some("owner"));
    }

    #[tokio::test]
    async fn stranger_cannot_grant_or_rewrite_policies() {
        let f = fixture();
        f.store.assign_owner("secret-group", "alice").await.unwrap();
        let alice = login(&f.keys, "alice").await;
        let mallory = login(&f.keys, "mallory").await;

        let err = f
            .svc
            .add_policy(
                &mallory,
                Policy::new("mallory", "secret-group", &["g_delete", "g_update"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HigherPolicyRank));

        let err = f
            .svc
            .evaluate(&mallory, "group", Policy::new("", "secret-group", &["g_delete"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization));

        f.svc
            .add_policy(&alice, Policy::new("bob", "secret-group", &["g_list"]))
            .await
            .unwrap();
        for attempt in [
            f.svc
                .add_policy(&mallory, Policy::new("bob", "secret-group", &["g_delete"]))
                .await,
            f.svc
                .update_policy(&mallory, Policy::new("bob", "secret-group", &["g_delete"]))
                .await,
        ] {
            assert!(matches!(attempt, Err(AppError::HigherPolicyRank)));
        }
        let stored = f.store.retrieve_one("bob", "secret-group").await.unwrap();
        assert_eq!(stored.actions, vec!["g_list".to_string()]);
    }

    #[tokio::test]
    async fn only_admins_assign_owners() {
        let f = fixture();
        let admin = login(&f.keys, "admin").await;
        let user = login(&f.keys, "user").await;

        let err = f.svc.assign_owner(&user, "group", "user").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization));

        f.svc.assign_owner(&admin, "group", "user").await.unwrap();
        assert!(matches!(
            f.svc.assign_owner(&admin, "group", "user").await,
            Err(AppError::StatusAlreadyAssigned)
        ));
        assert!(matches!(
            f.svc.assign_owner(&admin, "group", "other").await,
            Err(AppError::Conflict)
        ));

        // the owner passes evaluation and can grant on its object
        f.svc
            .evaluate(&user, "group", Policy::new("", "group", &["g_delete"]))
            .await
            .unwrap();
        f.svc
            .add_policy(&user, Policy::new("friend", "group", &["g_list", "g_update"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn admin_bypasses_rank_check() {
        let f = fixture();
        f.store.save(Policy::new("admin", "object", &["a"])).await.unwrap();
        let token = login(&f.keys, "admin").await;

        f.svc
            .add_policy(&token, Policy::new("friend", "object", &["a", "b", "c"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_missing_policy_is_not_found() {
        let f = fixture();
        let token = login(&f.keys, "caller").await;
        let err = f
            .svc
            .update_policy(&token, Policy::new("x", "y", &["a"]))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn delete_requires_owner_or_admin() {
        let f = fixture();
        f.store.assign_owner("object", "owner").await.unwrap();
        let owner = login(&f.keys, "owner").await;
        let stranger = login(&f.keys, "stranger").await;
        let admin = login(&f.keys, "admin").await;

        for subject in ["s1", "s2"] {
            f.svc
                .add_policy(&owner, Policy::new(subject, "object", &["a"]))
                .await
                .unwrap();
        }

        let err = f
            .svc
            .delete_policy(&stranger, Policy::new("s1", "object", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization));

        f.svc
            .delete_policy(&owner, Policy::new("s1", "object", &[]))
            .await
            .unwrap();
        f.svc
            .delete_policy(&admin, Policy::new("s2", "object", &[]))
            .await
            .unwrap();

        let err = f
            .svc
            .delete_policy(&owner, Policy::new("s1", "object", &[]))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn list_is_filtered_for_non_admins() {
        let f = fixture();
        f.store.assign_owner("object", "owner").await.unwrap();
        let owner = login(&f.keys, "owner").await;
        for subject in ["s1", "s2"] {
            f.svc
                .add_policy(&owner, Policy::new(subject, "object", &["a"]))
                .await
                .unwrap();
        }
        f.store
            .save(Policy::new("unrelated", "elsewhere", &["a"]))
            .await
            .unwrap();

        let page = f.svc.list_policies(&owner, Page::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.limit, 10);

        let s1 = login(&f.keys, "s1").await;
        let page = f.svc.list_policies(&s1, Page::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let admin = login(&f.keys, "admin").await;
        let page = f.svc.list_policies(&admin, Page::default()).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn evaluate_uses_caller_as_subject() {
        let f = fixture();
        f.store.save(Policy::new("user", "group", &["g_list"])).await.unwrap();
        let token = login(&f.keys, "user").await;

        // the subject in the request is ignored
        let req = Policy::new("someone-else", "group", &["g_list"]);
        f.svc.evaluate(&token, "group", req).await.unwrap();

        let req = Policy::new("user", "group", &["g_delete"]);
        let err = f.svc.evaluate(&token, "group", req).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization));

        let req = Policy::new("user", "group", &["g_list"]);
        let err = f.svc.evaluate(&token, "dashboard", req).await.unwrap_err();
        assert!(err.is(ErrorKind::Validation));

        let err = f
            .svc
            .evaluate("bogus", "group", Policy::new("user", "group", &["g_list"]))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Authentication));
    }

    #[tokio::test]
    async fn callback_can_veto_a_granted_evaluation() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::body_partial_json(serde_json::json!({
                "subject": "user",
                "object": "group",
                "permission": "g_list",
            })))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&mock_server)
            .await;

        let callback =
            CallbackAuthorizer::new(reqwest::Client::new(), "POST", &[mock_server.uri()]).unwrap();
        let f = fixture_with(callback);
        f.store.save(Policy::new("user", "group", &["g_list"])).await.unwrap();
        let token = login(&f.keys, "user").await;

        let err = f
            .svc
            .evaluate(&token, "group", Policy::new("", "group", &["g_list"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CallbackDenied { status: 403, .. }));
    }
}
