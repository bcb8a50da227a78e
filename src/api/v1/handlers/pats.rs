/*
 * Responsibility
 * - /pats handlers: PAT lifecycle, scopes, and PAT-authenticated authorize
 * - Management endpoints take a key token; /pats/authorize takes a PAT secret
 */
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    api::v1::dto::{
        duration_from_seconds,
        pats::{
            AddScopesRequest, AuthorizePatRequest, CreatePatRequest, RemoveScopesRequest,
            ResetPatSecretRequest, ScopeListQuery, UpdatePatDescriptionRequest,
            UpdatePatNameRequest,
        },
    },
    api::v1::extractors::BearerToken,
    error::AppError,
    services::pats::{PatPageMeta, PatView, PatsPage, Scope, ScopePageMeta, ScopesPage},
    state::AppState,
};

pub async fn create_pat(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(req): Json<CreatePatRequest>,
) -> Result<(StatusCode, Json<PatView>), AppError> {
    let pat = state.pats.create_pat(&token, req.into_new_pat()?).await?;
    Ok((StatusCode::CREATED, Json(pat.into())))
}

pub async fn list_pats(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Query(meta): Query<PatPageMeta>,
) -> Result<Json<PatsPage>, AppError> {
    let page = state.pats.list_pats(&token, meta).await?;
    Ok(Json(page))
}

pub async fn retrieve_pat(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
) -> Result<Json<PatView>, AppError> {
    let pat = state.pats.retrieve_pat(&token, &pat_id).await?;
    Ok(Json(pat.into()))
}

pub async fn delete_pat(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.pats.delete_pat(&token, &pat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_pat_name(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
    Json(req): Json<UpdatePatNameRequest>,
) -> Result<Json<PatView>, AppError> {
    let pat = state
        .pats
        .update_pat_name(&token, &pat_id, &req.name)
        .await?;
    Ok(Json(pat.into()))
}

pub async fn update_pat_description(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
    Json(req): Json<UpdatePatDescriptionRequest>,
) -> Result<Json<PatView>, AppError> {
    let pat = state
        .pats
        .update_pat_description(&token, &pat_id, &req.description)
        .await?;
    Ok(Json(pat.into()))
}

pub async fn reset_pat_secret(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
    req: Option<Json<ResetPatSecretRequest>>,
) -> Result<Json<PatView>, AppError> {
    let Json(req) = req.unwrap_or_default();
    let duration = duration_from_seconds(req.duration_seconds)?;

    let pat = state
        .pats
        .reset_pat_secret(&token, &pat_id, duration)
        .await?;
    Ok(Json(pat.into()))
}

pub async fn revoke_pat_secret(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.pats.revoke_pat_secret(&token, &pat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_scopes(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
    Query(query): Query<ScopeListQuery>,
) -> Result<Json<ScopesPage>, AppError> {
    let meta = ScopePageMeta {
        pat_id,
        offset: query.offset,
        limit: query.limit,
    };
    let page = state.pats.list_scopes(&token, meta).await?;
    Ok(Json(page))
}

pub async fn add_scopes(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
    Json(req): Json<AddScopesRequest>,
) -> Result<(StatusCode, Json<Vec<Scope>>), AppError> {
    let added = state.pats.add_scope(&token, &pat_id, req.scopes).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn remove_scopes(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
    Json(req): Json<RemoveScopesRequest>,
) -> Result<StatusCode, AppError> {
    state
        .pats
        .remove_scope(&token, &pat_id, &req.scope_ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_all_scopes(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(pat_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.pats.remove_pat_all_scope(&token, &pat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn authorize_pat(
    State(state): State<AppState>,
    BearerToken(secret): BearerToken,
    Json(req): Json<AuthorizePatRequest>,
) -> Result<StatusCode, AppError> {
    let pat = state.pats.identify_pat(&secret).await?;
    state
        .pats
        .authorize_pat(
            &pat.user_id,
            &pat.id,
            req.entity_type,
            &req.domain_id,
            &req.operation(),
            &req.entity_id,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
