/*
 * Responsibility
 * - /policies handlers (evaluate / add / update / delete / list / owners)
 */
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    api::v1::dto::policies::{AssignOwnerRequest, DeletePolicyRequest, EvaluateRequest},
    api::v1::extractors::BearerToken,
    error::AppError,
    services::policies::{Page, Policy, PolicyPage},
    state::AppState,
};

pub async fn list_policies(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Query(page): Query<Page>,
) -> Result<Json<PolicyPage>, AppError> {
    let page = state.policies.list_policies(&token, page).await?;
    Ok(Json(page))
}

pub async fn add_policy(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(policy): Json<Policy>,
) -> Result<(StatusCode, Json<Policy>), AppError> {
    let policy = state.policies.add_policy(&token, policy).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

pub async fn update_policy(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(policy): Json<Policy>,
) -> Result<Json<Policy>, AppError> {
    let policy = state.policies.update_policy(&token, policy).await?;
    Ok(Json(policy))
}

pub async fn delete_policy(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(req): Json<DeletePolicyRequest>,
) -> Result<StatusCode, AppError> {
    state
        .policies
        .delete_policy(&token, req.into_policy())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn evaluate(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(entity_type): Path<String>,
    Json(req): Json<EvaluateRequest>,
) -> Result<StatusCode, AppError> {
    state
        .policies
        .evaluate(&token, &entity_type, req.into_policy())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_owner(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(object): Path<String>,
    Json(req): Json<AssignOwnerRequest>,
) -> Result<StatusCode, AppError> {
    state
        .policies
        .assign_owner(&token, &object, &req.owner_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
