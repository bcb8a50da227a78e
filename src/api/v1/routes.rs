/*
 * Responsibility
 * - v1 URL layout: /health, /keys, /identify, /policies, /pats
 * - Every route except /health authenticates through the BearerToken extractor
 */
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::state::AppState;

use crate::api::v1::handlers::{
    health::health,
    keys::{identify, issue_key, retrieve_key, revoke_key},
    pats::{
        add_scopes, authorize_pat, create_pat, delete_pat, list_pats, list_scopes,
        remove_all_scopes, remove_scopes, reset_pat_secret, retrieve_pat, revoke_pat_secret,
        update_pat_description, update_pat_name,
    },
    policies::{add_policy, assign_owner, delete_policy, evaluate, list_policies, update_policy},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(key_routes())
        .merge(policy_routes())
        .merge(pat_routes())
}

fn key_routes() -> Router<AppState> {
    Router::new()
        .route("/keys", post(issue_key))
        .route("/keys/{key_id}", get(retrieve_key).delete(revoke_key))
        .route("/identify", get(identify))
}

fn policy_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/policies",
            get(list_policies)
                .post(add_policy)
                .put(update_policy)
                .delete(delete_policy),
        )
        .route("/policies/evaluate/{entity_type}", post(evaluate))
        .route("/policies/owners/{object}", put(assign_owner))
}

fn pat_routes() -> Router<AppState> {
    Router::new()
        .route("/pats", get(list_pats).post(create_pat))
        .route("/pats/authorize", post(authorize_pat))
        .route("/pats/{pat_id}", get(retrieve_pat).delete(delete_pat))
        .route("/pats/{pat_id}/name", patch(update_pat_name))
        .route("/pats/{pat_id}/description", patch(update_pat_description))
        .route("/pats/{pat_id}/secret/reset", patch(reset_pat_secret))
        .route("/pats/{pat_id}/secret/revoke", patch(revoke_pat_secret))
        .route(
            "/pats/{pat_id}/scopes",
            get(list_scopes).post(add_scopes).delete(remove_scopes),
        )
        .route("/pats/{pat_id}/scopes/all", delete(remove_all_scopes))
}
