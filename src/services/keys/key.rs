use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of credential a [`Key`] describes. The kind decides its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Issued on login; lives for the configured login duration.
    Login,
    /// Issued on password recovery request; lives for a fixed short window.
    Recovery,
    /// Issued explicitly by a user; backed by a stored record.
    Api,
}

/// A short-lived credential descriptor carried inside a signed bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub issuer_id: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    /// `None` means "never" for API keys and "already" for every other kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Key {
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => self.key_type != KeyType::Api,
            Some(expires_at) => now > expires_at,
        }
    }
}

/// Caller identity resolved from a bearer token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn key(key_type: KeyType, expires_at: Option<DateTime<Utc>>) -> Key {
        Key {
            id: "id".to_string(),
            key_type,
            issuer_id: "issuer".to_string(),
            subject: "user@example.com".to_string(),
            issued_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn missing_expiry_expires_every_kind_but_api() {
        assert!(key(KeyType::Login, None).expired());
        assert!(key(KeyType::Recovery, None).expired());
        assert!(!key(KeyType::Api, None).expired());
    }

    #[test]
    fn expiry_is_compared_against_now() {
        let past = Some(Utc::now() - Duration::minutes(1));
        let future = Some(Utc::now() + Duration::minutes(1));

        for kind in [KeyType::Login, KeyType::Recovery, KeyType::Api] {
            assert!(key(kind, past).expired());
            assert!(!key(kind, future).expired());
        }
    }
}
