//! Health-tracked rotation over upstream credentials.
//!
//! Every mutation (acquire, release, toggle, delete, reload) runs inside a
//! single `parking_lot::Mutex` critical section that is never held across an
//! `.await`. Cooldown expiry is evaluated lazily on each acquire; there is no
//! timer task.

mod clock;
mod entry;
mod lease;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use kiro_types::error::{ConfigError, PoolError};
use kiro_types::models::{
    CredentialStatus, CredentialView, PoolConfig, ReleaseOutcome, StoredCredential,
};

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{derive_credential_id, rate_limit_backoff};
pub use lease::CredentialLease;

use entry::PooledCredential;

pub struct CredentialPool {
    state: Mutex<PoolState>,
    settings: RwLock<PoolConfig>,
    notify: Notify,
    clock: Arc<dyn Clock>,
}

struct PoolState {
    entries: Vec<PooledCredential>,
    /// Index where the next round-robin scan starts
    cursor: usize,
    next_generation: u64,
}

impl PoolState {
    fn stamp(&mut self, entries: &mut [PooledCredential]) {
        for entry in entries {
            entry.generation = self.next_generation;
            self.next_generation += 1;
        }
    }
}

enum Selection {
    Picked { id: String, secret: String, generation: u64 },
    /// Nothing eligible now; `ready_in` is the shortest remaining cooldown
    Wait { ready_in: Option<Duration> },
    /// Nothing outside the exclusion set can ever become eligible without an admin action
    Unavailable,
}

/// Counts per status, for the admin API.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub cooling_down: usize,
    pub invalid: usize,
    pub disabled: usize,
}

/// What a reload changed.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReloadSummary {
    pub total: usize,
    pub retained: usize,
    pub added: usize,
    pub removed: usize,
}

impl CredentialPool {
    /// Build a pool from a credential set. Fails on an empty set.
    pub fn load(
        credentials: Vec<StoredCredential>,
        settings: PoolConfig,
    ) -> Result<Self, ConfigError> {
        Self::load_with_clock(credentials, settings, Arc::new(SystemClock))
    }

    pub fn load_with_clock(
        credentials: Vec<StoredCredential>,
        settings: PoolConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let mut entries = build_entries(&credentials)?;
        let mut state = PoolState { entries: Vec::new(), cursor: 0, next_generation: 0 };
        state.stamp(&mut entries);
        state.entries = entries;
        tracing::info!("🔑 Credential pool loaded with {} credentials", state.entries.len());
        Ok(Self {
            state: Mutex::new(state),
            settings: RwLock::new(settings),
            notify: Notify::new(),
            clock,
        })
    }

    /// Lease the next eligible credential in round-robin order.
    ///
    /// Waits up to `acquire_wait_ms` for a cooldown to expire or a release to
    /// free something up, then fails with [`PoolError::Exhausted`].
    pub async fn acquire(self: &Arc<Self>, model_hint: &str) -> Result<CredentialLease, PoolError> {
        self.acquire_excluding(model_hint, &HashSet::new()).await
    }

    /// Like [`acquire`](Self::acquire) but never returns a credential in `exclude`.
    /// Used when retrying an upstream call on a different credential.
    pub async fn acquire_excluding(
        self: &Arc<Self>,
        model_hint: &str,
        exclude: &HashSet<String>,
    ) -> Result<CredentialLease, PoolError> {
        let wait = Duration::from_millis(self.settings.read().acquire_wait_ms);
        let started = Instant::now();
        let deadline = started + wait;

        loop {
            // Register interest before inspecting state so a release between
            // the check and the wait is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready_in = match self.try_select(exclude) {
                Selection::Picked { id, secret, generation } => {
                    tracing::debug!("Leased credential {} for model {}", id, model_hint);
                    return Ok(CredentialLease::new(Arc::clone(self), id, secret, generation));
                },
                Selection::Unavailable if !exclude.is_empty() => {
                    return Err(PoolError::Exhausted { waited_ms: elapsed_ms(started) });
                },
                Selection::Unavailable => None,
                Selection::Wait { ready_in } => ready_in,
            };

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "⚠️ Credential pool exhausted for model {} after {}ms",
                    model_hint,
                    elapsed_ms(started)
                );
                return Err(PoolError::Exhausted { waited_ms: elapsed_ms(started) });
            }

            let wake_at = match ready_in {
                Some(ready_in) => deadline.min(now + ready_in),
                None => deadline,
            };

            tokio::select! {
                () = &mut notified => {},
                () = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    fn try_select(&self, exclude: &HashSet<String>) -> Selection {
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let len = state.entries.len();

        let mut ready_in: Option<Duration> = None;
        let mut recoverable = false;

        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            let entry = &mut state.entries[idx];
            entry.refresh(now);

            if exclude.contains(&entry.id) {
                continue;
            }

            match entry.status() {
                CredentialStatus::Active => {
                    entry.last_used_at = Some(now);
                    entry.in_flight = entry.in_flight.saturating_add(1);
                    let picked = Selection::Picked {
                        id: entry.id.clone(),
                        secret: entry.secret.clone(),
                        generation: entry.generation,
                    };
                    state.cursor = (idx + 1) % len;
                    return picked;
                },
                CredentialStatus::CoolingDown => {
                    recoverable = true;
                    if let Some(until) = entry.cooldown_until {
                        let remaining = (until - now).to_std().unwrap_or(Duration::ZERO);
                        ready_in = Some(ready_in.map_or(remaining, |r| r.min(remaining)));
                    }
                },
                CredentialStatus::Invalid | CredentialStatus::Disabled => {},
            }
        }

        if recoverable {
            Selection::Wait { ready_in }
        } else {
            Selection::Unavailable
        }
    }

    /// Report how a credential's call ended. Unknown ids (deleted while in
    /// flight) are ignored.
    pub fn release(&self, id: &str, outcome: ReleaseOutcome) {
        self.settle(id, None, outcome);
    }

    /// Release on behalf of a lease. With a `generation`, an entry that was
    /// replaced since the lease was taken (reload with a new secret, delete
    /// and re-add) is left untouched.
    fn settle(&self, id: &str, generation: Option<u64>, outcome: ReleaseOutcome) {
        let settings = self.settings.read().clone();
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) else {
                tracing::debug!("Release for unknown credential {} ignored", id);
                return;
            };
            if generation.is_some_and(|g| g != entry.generation) {
                tracing::debug!("Release for replaced credential {} ignored ({})", id, outcome);
                return;
            }
            entry.in_flight = entry.in_flight.saturating_sub(1);
            entry.apply_outcome(outcome, now, &settings);

            match outcome {
                ReleaseOutcome::Success => {},
                ReleaseOutcome::AuthFailure => {
                    tracing::error!("❌ Credential {} rejected by upstream, marked invalid", id);
                },
                ReleaseOutcome::RateLimited | ReleaseOutcome::ServerError => {
                    tracing::warn!(
                        "Credential {} released with {} (failures: {}, cooldown until: {:?})",
                        id,
                        outcome,
                        entry.failure_count,
                        entry.cooldown_until
                    );
                },
            }
        }
        self.notify.notify_waiters();
    }

    /// Enable or disable a credential. Returns the resulting status; a
    /// re-enabled credential stays `invalid` if upstream rejected it.
    pub fn toggle(&self, id: &str, enabled: bool) -> Result<CredentialStatus, PoolError> {
        let status = {
            let mut state = self.state.lock();
            let entry = state
                .entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| PoolError::NotFound { id: id.to_string() })?;
            entry.disabled = !enabled;
            entry.status_at(self.clock.now())
        };
        tracing::info!("Credential {} {} ({})", id, if enabled { "enabled" } else { "disabled" }, status);
        self.notify.notify_waiters();
        Ok(status)
    }

    /// Remove a credential. Leases already out complete normally; their
    /// release becomes a no-op.
    pub fn delete(&self, id: &str) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.id != id);
        if state.entries.len() == before {
            return Err(PoolError::NotFound { id: id.to_string() });
        }
        tracing::info!("🗑️ Credential {} deleted ({} remaining)", id, state.entries.len());
        Ok(())
    }

    /// Atomically replace the credential set. Entries whose id and secret are
    /// unchanged keep their health state and outstanding leases; missing
    /// entries are dropped.
    pub fn reload(&self, credentials: Vec<StoredCredential>) -> Result<ReloadSummary, ConfigError> {
        let mut fresh = build_entries(&credentials)?;
        let summary = {
            let mut state = self.state.lock();
            state.stamp(&mut fresh);
            let previous: HashMap<&str, &PooledCredential> =
                state.entries.iter().map(|e| (e.id.as_str(), e)).collect();

            let mut retained = 0;
            for entry in &mut fresh {
                if let Some(old) = previous.get(entry.id.as_str()) {
                    if old.secret == entry.secret {
                        entry.inherit(old);
                        retained += 1;
                    }
                }
            }
            let kept_ids: HashSet<&str> = fresh.iter().map(|e| e.id.as_str()).collect();
            let removed = state.entries.iter().filter(|e| !kept_ids.contains(e.id.as_str())).count();

            let summary = ReloadSummary {
                total: fresh.len(),
                retained,
                added: fresh.len() - retained,
                removed,
            };
            state.cursor %= fresh.len();
            state.entries = fresh;
            summary
        };
        tracing::info!(
            "🔄 Credential pool reloaded: {} total, {} retained, {} added, {} removed",
            summary.total,
            summary.retained,
            summary.added,
            summary.removed
        );
        self.notify.notify_waiters();
        Ok(summary)
    }

    pub fn update_settings(&self, settings: PoolConfig) {
        *self.settings.write() = settings;
    }

    /// Consistent, masked view of every credential.
    pub fn snapshot(&self) -> Vec<CredentialView> {
        let now = self.clock.now();
        self.state.lock().entries.iter().map(|e| e.view(now)).collect()
    }

    pub fn stats(&self) -> PoolStats {
        let now = self.clock.now();
        let state = self.state.lock();
        let mut stats = PoolStats { total: state.entries.len(), ..PoolStats::default() };
        for entry in &state.entries {
            match entry.status_at(now) {
                CredentialStatus::Active => stats.active += 1,
                CredentialStatus::CoolingDown => stats.cooling_down += 1,
                CredentialStatus::Invalid => stats.invalid += 1,
                CredentialStatus::Disabled => stats.disabled += 1,
            }
        }
        stats
    }

    /// Durable form of the current set, for the credential store.
    pub fn export(&self) -> Vec<StoredCredential> {
        self.state.lock().entries.iter().map(PooledCredential::to_stored).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_entries(credentials: &[StoredCredential]) -> Result<Vec<PooledCredential>, ConfigError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(credentials.len());
    for stored in credentials {
        if stored.token.trim().is_empty() {
            tracing::warn!("Skipping credential entry with an empty token");
            continue;
        }
        let entry = PooledCredential::from_stored(stored);
        if !seen.insert(entry.id.clone()) {
            tracing::warn!("Skipping duplicate credential {}", entry.id);
            continue;
        }
        entries.push(entry);
    }
    if entries.is_empty() {
        return Err(ConfigError::EmptyCredentialSet);
    }
    Ok(entries)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
