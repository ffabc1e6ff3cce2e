
use std::sync::Arc;

use kiro_types::models::{PoolConfig, StoredCredential};

use super::{CredentialPool, ManualClock};

pub(super) fn fast_settings() -> PoolConfig {
    PoolConfig { acquire_wait_ms: 50, ..PoolConfig::default() }
}

pub(super) fn stored(id: &str) -> StoredCredential {
    StoredCredential::new(format!("secret-{id}")).with_id(id)
}

pub(super) fn pool_with(ids: &[&str]) -> (Arc<CredentialPool>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let pool = CredentialPool::load_with_clock(
        ids.iter().map(|id| stored(id)).collect(),
        fast_settings(),
        clock.clone(),
    )
    .expect("non-empty credential set");
    (Arc::new(pool), clock)
}
