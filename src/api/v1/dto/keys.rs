/*
 * Responsibility
 * - Keys request/response DTO
 */
use serde::{Deserialize, Serialize};

use crate::services::keys::{IssuedKey, Key, KeyType};

#[derive(Debug, Deserialize)]
pub struct IssueKeyRequest {
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct IssuedKeyResponse {
    #[serde(flatten)]
    pub key: Key,
    pub value: String,
}

impl From<IssuedKey> for IssuedKeyResponse {
    fn from(issued: IssuedKey) -> Self {
        Self {
            key: issued.key,
            value: issued.token,
        }
    }
}
