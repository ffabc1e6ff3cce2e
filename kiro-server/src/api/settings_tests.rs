use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;

use kiro_core::modules::config::read_config_file;

use super::settings::{get_settings, save_settings};
use crate::test_helpers::{test_app_state, TEST_KEY};

fn updates(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn test_get_settings_masks_client_token() {
    let (state, _store, _tmp) = test_app_state().await;
    let Json(settings) = get_settings(State(state)).await;

    assert_ne!(settings["KIRO_CLIENT_TOKEN"], TEST_KEY);
    assert!(settings["KIRO_CLIENT_TOKEN"].contains('*'));
    assert_eq!(settings["PORT"], "8080");
    assert_eq!(settings["HEADER_STRATEGY"], "real_simulation");
}

#[tokio::test]
async fn test_save_settings_swaps_and_persists() {
    let (state, _store, tmp) = test_app_state().await;
    let Json(masked) = get_settings(State(state.clone())).await;

    let Json(response) = save_settings(
        State(state.clone()),
        Json(updates(&[
            ("KIRO_CLIENT_TOKEN", masked["KIRO_CLIENT_TOKEN"].as_str()),
            ("HEADER_STRATEGY", "off"),
            ("ACQUIRE_WAIT_MS", "100"),
        ])),
    )
    .await
    .unwrap();

    assert!(response.success);
    assert!(!response.restart_required);
    let config = state.config().snapshot();
    assert_eq!(config.server.client_token, TEST_KEY);
    assert_eq!(config.stealth.header_strategy.to_string(), "off");
    assert_eq!(config.pool.acquire_wait_ms, 100);

    let on_disk = read_config_file(&tmp.path().join("settings.json")).unwrap();
    assert_eq!(on_disk, *config);
}

#[tokio::test]
async fn test_port_change_requires_restart() {
    let (state, _store, _tmp) = test_app_state().await;
    let Json(response) = save_settings(State(state), Json(updates(&[("PORT", "9090")]))).await.unwrap();
    assert!(response.restart_required);
    assert_eq!(response.settings["PORT"], "9090");
}

#[tokio::test]
async fn test_invalid_settings_are_rejected_and_not_applied() {
    let (state, _store, tmp) = test_app_state().await;

    let err = save_settings(State(state.clone()), Json(updates(&[("PORT", "not-a-port")]))).await.err().unwrap();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    let err = save_settings(State(state.clone()), Json(updates(&[("NO_SUCH_KEY", "1")]))).await.err().unwrap();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    assert_eq!(state.config().snapshot().server.port, 8080);
    assert!(!tmp.path().join("settings.json").exists());
}
