//! Application State
//!
//! Shared state for the admin API: the gateway (pool, transport, config
//! handle) plus the durable credential store behind the pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use kiro_core::modules::config::ConfigHandle;
use kiro_core::modules::credential_store::CredentialStore;
use kiro_core::proxy::{CredentialPool, Gateway, StealthTransport};
use kiro_core::AppResult;
use kiro_types::models::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub gateway: Arc<Gateway>,
    pub store: Arc<dyn CredentialStore>,
}

impl AppState {
    /// Load credentials from `store` and wire up the gateway.
    pub async fn new(
        config: GatewayConfig,
        config_path: Option<PathBuf>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let credentials = store.load().await?;
        let pool = Arc::new(CredentialPool::load(credentials, config.pool.clone())?);
        let transport = Arc::new(StealthTransport::new(Duration::from_secs(config.upstream.connect_timeout_secs)));
        let handle = Arc::new(ConfigHandle::new(config, config_path));
        let gateway = Arc::new(Gateway::new(pool, transport, handle));
        Ok(Self { inner: Arc::new(AppStateInner { gateway, store }) })
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.inner.gateway
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        self.inner.gateway.pool()
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        self.inner.gateway.config()
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    /// Write the pool's current credential set back to the store.
    pub async fn persist_credentials(&self) -> AppResult<()> {
        self.inner.store.persist(&self.pool().export()).await
    }
}
