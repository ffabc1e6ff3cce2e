//! RAII lease over a pooled credential.

use std::fmt;
use std::sync::Arc;

use kiro_types::models::ReleaseOutcome;

use super::CredentialPool;
use crate::utils::redact::mask_secret;

/// A credential checked out of the pool for one upstream call.
///
/// Reports its outcome exactly once: either through [`release`](Self::release)
/// or, if the lease is dropped first (cancelled request, client disconnect),
/// with the current default outcome.
pub struct CredentialLease {
    pool: Arc<CredentialPool>,
    id: String,
    secret: String,
    generation: u64,
    default_outcome: ReleaseOutcome,
    released: bool,
}

impl CredentialLease {
    pub(super) fn new(pool: Arc<CredentialPool>, id: String, secret: String, generation: u64) -> Self {
        Self { pool, id, secret, generation, default_outcome: ReleaseOutcome::ServerError, released: false }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Outcome reported if the lease is dropped without an explicit release.
    pub fn set_default_outcome(&mut self, outcome: ReleaseOutcome) {
        self.default_outcome = outcome;
    }

    pub fn release(mut self, outcome: ReleaseOutcome) {
        self.released = true;
        self.pool.settle(&self.id, Some(self.generation), outcome);
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(
                "Lease for credential {} dropped unreleased, reporting {}",
                self.id,
                self.default_outcome
            );
            self.pool.settle(&self.id, Some(self.generation), self.default_outcome);
        }
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("id", &self.id)
            .field("secret", &mask_secret(&self.secret))
            .field("default_outcome", &self.default_outcome)
            .finish()
    }
}
