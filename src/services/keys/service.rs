use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::key_repo::KeyRepository;
use crate::services::keys::codec::TokenCodec;
use crate::services::keys::key::{Identity, Key, KeyType};

/// Recovery keys are valid for five minutes.
pub const RECOVERY_KEY_DURATION_SECONDS: i64 = 5 * 60;

/// Input for [`KeyService::issue`].
///
/// `issuer_id` / `subject` are trusted for login and recovery keys (the caller
/// has already verified credentials) and ignored for API keys, whose owner is
/// the identity behind the presented token.
#[derive(Debug, Clone)]
pub struct KeyRequest {
    pub key_type: KeyType,
    pub issuer_id: String,
    pub subject: String,
    /// API keys only. `None` issues a key that never expires.
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key: Key,
    pub token: String,
}

/// Key lifecycle: issuance, lookup, revocation and bearer identification.
#[derive(Clone)]
pub struct KeyService {
    codec: TokenCodec,
    keys: Arc<dyn KeyRepository>,
    login_duration: Duration,
}

impl std::fmt::Debug for KeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyService")
            .field("codec", &self.codec)
            .field("login_duration", &self.login_duration)
            .finish()
    }
}

// Tokens carry whole-second timestamps, so issued keys are truncated to match.
fn issue_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

impl KeyService {
    pub fn new(codec: TokenCodec, keys: Arc<dyn KeyRepository>, login_duration: Duration) -> Self {
        Self {
            codec,
            keys,
            login_duration,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub async fn issue(&self, token: &str, req: KeyRequest) -> Result<IssuedKey, AppError> {
        match req.key_type {
            KeyType::Login => self.temporary_key(req, self.login_duration),
            KeyType::Recovery => {
                self.temporary_key(req, Duration::seconds(RECOVERY_KEY_DURATION_SECONDS))
            }
            KeyType::Api => self.api_key(token, req.duration).await,
        }
    }

    fn temporary_key(&self, req: KeyRequest, duration: Duration) -> Result<IssuedKey, AppError> {
        if req.issuer_id.trim().is_empty() {
            return Err(AppError::malformed("key issuer id is required"));
        }

        let now = issue_time();
        let key = Key {
            id: Uuid::new_v4().to_string(),
            key_type: req.key_type,
            issuer_id: req.issuer_id,
            subject: req.subject,
            issued_at: now,
            expires_at: Some(now + duration),
        };
        let token = self.codec.issue(&key)?;

        debug!(key_id = %key.id, key_type = ?key.key_type, issuer_id = %key.issuer_id, "issued key");
        Ok(IssuedKey { key, token })
    }

    async fn api_key(&self, token: &str, duration: Option<Duration>) -> Result<IssuedKey, AppError> {
        let identity = self.identify(token).await?;

        let now = issue_time();
        let key = Key {
            id: Uuid::new_v4().to_string(),
            key_type: KeyType::Api,
            issuer_id: identity.id,
            subject: identity.email,
            issued_at: now,
            expires_at: duration.map(|d| now + d),
        };

        self.keys.save(key.clone()).await.map_err(|e| {
            error!(issuer_id = %key.issuer_id, error = %e, "failed to save api key");
            AppError::CreateEntity(e)
        })?;
        let token = self.codec.issue(&key)?;

        debug!(key_id = %key.id, issuer_id = %key.issuer_id, expires_at = ?key.expires_at, "issued api key");
        Ok(IssuedKey { key, token })
    }

    /// Fetch one of the caller's API keys.
    pub async fn retrieve(&self, token: &str, key_id: &str) -> Result<Key, AppError> {
        let identity = self.identify(token).await?;
        self.keys
            .retrieve(&identity.id, key_id)
            .await
            .map_err(AppError::ViewEntity)
    }

    /// Make one of the caller's API keys unusable. Idempotent.
    pub async fn revoke(&self, token: &str, key_id: &str) -> Result<(), AppError> {
        let identity = self.identify(token).await?;
        self.keys
            .remove(&identity.id, key_id)
            .await
            .map_err(|e| {
                error!(issuer_id = %identity.id, key_id, error = %e, "failed to revoke key");
                AppError::RemoveEntity(e)
            })?;

        debug!(issuer_id = %identity.id, key_id, "revoked key");
        Ok(())
    }

    /// Make the key behind `token` unusable. Signature is checked, expiry is
    /// not; revoking an unknown or already revoked key succeeds.
    pub async fn revoke_token(&self, token: &str) -> Result<(), AppError> {
        let key = self.codec.decode(token)?;
        if key.key_type != KeyType::Api {
            // Login and recovery keys are not stored; they lapse on expiry.
            return Ok(());
        }

        self.keys
            .remove(&key.issuer_id, &key.id)
            .await
            .map_err(AppError::RemoveEntity)?;

        debug!(key_id = %key.id, issuer_id = %key.issuer_id, "revoked key by token");
        Ok(())
    }

    /// Resolve a bearer token to the identity behind it.
    ///
    /// An expired API key is deleted from the key store before the expiry
    /// error is returned. A valid API key token whose record is gone does
    /// not authenticate.
    pub async fn identify(&self, token: &str) -> Result<Identity, AppError> {
        let key = self.codec.decode(token)?;

        if key.expired() {
            if key.key_type != KeyType::Api {
                return Err(AppError::KeyExpired);
            }
            match self.keys.remove(&key.issuer_id, &key.id).await {
                Ok(()) => {
                    debug!(key_id = %key.id, issuer_id = %key.issuer_id, "removed expired api key")
                }
                Err(e) => {
                    error!(key_id = %key.id, issuer_id = %key.issuer_id, error = %e, "failed to remove expired api key")
                }
            }
            return Err(AppError::ApiKeyExpired);
        }

        if key.key_type == KeyType::Api
            && let Err(e) = self.keys.retrieve(&key.issuer_id, &key.id).await
        {
            warn!(key_id = %key.id, issuer_id = %key.issuer_id, error = %e, "api key record unavailable");
            return Err(AppError::Authentication);
        }

        Ok(Identity {
            id: key.issuer_id,
            email: key.subject,
        })
    }
}
