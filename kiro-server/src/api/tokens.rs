//! Credential pool handlers

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use kiro_core::proxy::{PoolStats, ReloadSummary};
use kiro_types::error::PoolError;
use kiro_types::models::{CredentialStatus, CredentialView};

use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Serialize)]
pub struct TokenListResponse {
    pub credentials: Vec<CredentialView>,
    pub stats: PoolStats,
}

#[derive(Deserialize)]
pub struct ToggleRequest {
    pub id: String,
    pub enabled: bool,
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub id: String,
    pub status: CredentialStatus,
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    pub id: String,
}

fn pool_error(e: &PoolError) -> (StatusCode, String) {
    let status = match e {
        PoolError::NotFound { .. } => StatusCode::NOT_FOUND,
        PoolError::Exhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, e.to_string())
}

pub async fn list_tokens(State(state): State<AppState>) -> Json<TokenListResponse> {
    let pool = state.pool();
    Json(TokenListResponse { credentials: pool.snapshot(), stats: pool.stats() })
}

/// Re-read the credential store into the pool. Unchanged credentials keep
/// their health state.
pub async fn reload_tokens(State(state): State<AppState>) -> ApiResult<ReloadSummary> {
    let credentials =
        state.store().load().await.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let summary = state.pool().reload(credentials).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(summary))
}

pub async fn toggle_token(State(state): State<AppState>, Json(payload): Json<ToggleRequest>) -> ApiResult<ToggleResponse> {
    let status = state.pool().toggle(&payload.id, payload.enabled).map_err(|e| pool_error(&e))?;
    state.persist_credentials().await.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(ToggleResponse { id: payload.id, status }))
}

pub async fn delete_token(State(state): State<AppState>, Json(payload): Json<DeleteRequest>) -> ApiResult<bool> {
    state.pool().delete(&payload.id).map_err(|e| pool_error(&e))?;
    state.persist_credentials().await.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(true))
}
