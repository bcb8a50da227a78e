/*
 * Responsibility
 * - Shared AppError definition for every service in the crate
 * - ErrorKind classification so wrapped errors can be matched without string compares
 * - IntoResponse implementation (HTTP status / JSON error body)
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::repos::error::RepoError;
use crate::services::cache::CacheError;

/// Coarse classification of an error.
///
/// Callers branch on the kind ("log in again" vs "you lack permission")
/// instead of comparing individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to perform authentication over the entity")]
    Authentication,

    #[error("login key expired")]
    KeyExpired,

    #[error("api key expired")]
    ApiKeyExpired,

    #[error("personal access token revoked")]
    PatRevoked,

    #[error("personal access token expired")]
    PatExpired,

    #[error("failed to perform authorization over the entity")]
    Authorization,

    #[error("policy actions exceed the caller's own actions on the object")]
    HigherPolicyRank,

    #[error("callback {url} rejected the request with status {status}")]
    CallbackDenied { url: String, status: u16 },

    #[error("callback {url} request failed")]
    CallbackFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("missing entity id")]
    MissingEntityId,

    #[error("missing domain id")]
    MissingDomainId,

    #[error("invalid query params")]
    InvalidQueryParams,

    #[error("malformed entity: {0}")]
    MalformedEntity(String),

    #[error("status already assigned")]
    StatusAlreadyAssigned,

    #[error("entity already exists")]
    Conflict,

    #[error("failed to create entity")]
    CreateEntity(#[source] RepoError),

    #[error("failed to update entity")]
    UpdateEntity(#[source] RepoError),

    #[error("failed to remove entity")]
    RemoveEntity(#[source] RepoError),

    #[error("failed to view entity")]
    ViewEntity(#[source] RepoError),

    #[error("scope cache failure")]
    Cache(#[from] CacheError),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEntity(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Authentication
            | AppError::KeyExpired
            | AppError::ApiKeyExpired
            | AppError::PatRevoked
            | AppError::PatExpired => ErrorKind::Authentication,
            AppError::Authorization
            | AppError::HigherPolicyRank
            | AppError::CallbackDenied { .. }
            | AppError::CallbackFailed { .. } => ErrorKind::Authorization,
            AppError::MissingEntityId
            | AppError::MissingDomainId
            | AppError::InvalidQueryParams
            | AppError::MalformedEntity(_) => ErrorKind::Validation,
            AppError::Conflict | AppError::StatusAlreadyAssigned => ErrorKind::Conflict,
            AppError::CreateEntity(_)
            | AppError::UpdateEntity(_)
            | AppError::RemoveEntity(_)
            | AppError::ViewEntity(_)
            | AppError::Cache(_)
            | AppError::Internal => ErrorKind::Internal,
        }
    }

    /// The store error this error wraps, if any.
    pub fn repo_source(&self) -> Option<&RepoError> {
        match self {
            AppError::CreateEntity(e)
            | AppError::UpdateEntity(e)
            | AppError::RemoveEntity(e)
            | AppError::ViewEntity(e) => Some(e),
            _ => None,
        }
    }

    /// True when this error or the store error it wraps has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind || self.repo_source().is_some_and(|e| e.kind() == kind)
    }

    // The kind used for transport mapping: a wrapped NotFound/Conflict wins over Internal.
    fn effective_kind(&self) -> ErrorKind {
        match self.repo_source().map(RepoError::kind) {
            Some(inner) if inner != ErrorKind::Internal => inner,
            _ => self.kind(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponseBody {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match self.effective_kind() {
            ErrorKind::Authentication => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ErrorKind::Authorization => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ErrorResponseBody {
            error: ErrorBody {
                code,
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}
