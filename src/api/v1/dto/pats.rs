/*
 * Responsibility
 * - PAT / scope request DTO
 */
use serde::Deserialize;

use crate::error::AppError;
use crate::services::pats::{EntityType, NewPat, Scope, normalize_operation};

use super::duration_from_seconds;

#[derive(Debug, Deserialize)]
pub struct CreatePatRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub duration_seconds: Option<i64>,
}

impl CreatePatRequest {
    pub fn into_new_pat(self) -> Result<NewPat, AppError> {
        Ok(NewPat {
            name: self.name,
            description: self.description,
            duration: duration_from_seconds(self.duration_seconds)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatDescriptionRequest {
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPatSecretRequest {
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddScopesRequest {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveScopesRequest {
    pub scope_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeListQuery {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizePatRequest {
    pub entity_type: EntityType,
    #[serde(default)]
    pub domain_id: String,
    pub operation: String,
    pub entity_id: String,
}

impl AuthorizePatRequest {
    /// Generic verbs are accepted here as well as on scopes.
    pub fn operation(&self) -> String {
        normalize_operation(self.entity_type, &self.operation)
    }
}
