//! Settings handlers

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;

use kiro_core::modules::config::{apply_settings, save_config, to_settings_map};

use crate::state::AppState;

#[derive(Serialize)]
pub struct SaveSettingsResponse {
    pub success: bool,
    /// Host or port changed; the listener keeps its old address until restart
    pub restart_required: bool,
    pub settings: BTreeMap<String, String>,
}

pub async fn get_settings(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(to_settings_map(&state.config().snapshot()))
}

/// Validate, persist, then swap the new configuration in. In-flight requests
/// finish with the snapshot they started with.
pub async fn save_settings(
    State(state): State<AppState>,
    Json(updates): Json<BTreeMap<String, String>>,
) -> Result<Json<SaveSettingsResponse>, (StatusCode, String)> {
    let handle = state.config();
    let update = apply_settings(&handle.snapshot(), &updates).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    if let Some(path) = handle.path().map(ToOwned::to_owned) {
        let config = update.config.clone();
        match tokio::task::spawn_blocking(move || save_config(&path, &config)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
            Err(e) => {
                return Err((StatusCode::INTERNAL_SERVER_ERROR, format!("spawn_blocking panicked: {e}")));
            },
        }
    }

    state.pool().update_settings(update.config.pool.clone());
    let settings = to_settings_map(&update.config);
    handle.replace(update.config);
    tracing::info!(
        "⚙️ Settings saved ({} keys){}",
        updates.len(),
        if update.restart_required { ", restart required for listener changes" } else { "" }
    );

    Ok(Json(SaveSettingsResponse { success: true, restart_required: update.restart_required, settings }))
}
