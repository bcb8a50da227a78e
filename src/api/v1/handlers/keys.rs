/*
 * Responsibility
 * - /keys and /identify handlers
 * - Only API keys are issued over HTTP; login and recovery keys are issued
 *   in-process once credentials have been checked
 */
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    api::v1::dto::{
        duration_from_seconds,
        keys::{IssueKeyRequest, IssuedKeyResponse},
    },
    api::v1::extractors::BearerToken,
    error::AppError,
    services::keys::{Identity, Key, KeyRequest, KeyType},
    state::AppState,
};

pub async fn issue_key(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(req): Json<IssueKeyRequest>,
) -> Result<(StatusCode, Json<IssuedKeyResponse>), AppError> {
    if req.key_type != KeyType::Api {
        return Err(AppError::malformed("only api keys can be issued"));
    }

    let issued = state
        .keys
        .issue(
            &token,
            KeyRequest {
                key_type: KeyType::Api,
                issuer_id: String::new(),
                subject: String::new(),
                duration: duration_from_seconds(req.duration_seconds)?,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(issued.into())))
}

pub async fn retrieve_key(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(key_id): Path<String>,
) -> Result<Json<Key>, AppError> {
    let key = state.keys.retrieve(&token, &key_id).await?;
    Ok(Json(key))
}

pub async fn revoke_key(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(key_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.keys.revoke(&token, &key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn identify(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<Identity>, AppError> {
    let identity = state.keys.identify(&token).await?;
    Ok(Json(identity))
}
