//! Test helpers for kiro-server unit tests.

use std::sync::Arc;

use tempfile::TempDir;

use kiro_core::modules::credential_store::MemoryStore;
use kiro_types::models::{GatewayConfig, ServerConfig, StoredCredential};

use crate::state::AppState;

pub const TEST_KEY: &str = "admin-test-key";

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        server: ServerConfig { client_token: TEST_KEY.to_string(), ..ServerConfig::default() },
        ..GatewayConfig::default()
    }
}

pub fn test_credentials() -> Vec<StoredCredential> {
    vec![
        StoredCredential::new("secret-alpha-0001").with_id("alpha"),
        StoredCredential::new("secret-bravo-0002").with_id("bravo"),
    ]
}

/// Create an `AppState` over an in-memory store seeded with [`test_credentials`].
///
/// Settings are persisted to a file inside the returned `TempDir`; keep it
/// alive for the test duration.
pub async fn test_app_state() -> (AppState, Arc<MemoryStore>, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let store = Arc::new(MemoryStore::new(test_credentials()));
    let state = AppState::new(test_config(), Some(temp_dir.path().join("settings.json")), store.clone())
        .await
        .expect("failed to create test AppState");
    (state, store, temp_dir)
}
