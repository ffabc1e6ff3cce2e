//! API Routes
//!
//! Admin endpoints for the credential pool and gateway settings.

mod settings;
mod tokens;

#[cfg(test)]
mod settings_tests;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // Credentials
        .route("/tokens", get(tokens::list_tokens))
        .route("/tokens/reload", post(tokens::reload_tokens))
        .route("/tokens/toggle", post(tokens::toggle_token))
        .route("/tokens/delete", post(tokens::delete_token))
        // Settings
        .route("/settings", get(settings::get_settings).post(settings::save_settings))
}
