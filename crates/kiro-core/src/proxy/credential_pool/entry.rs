//! Per-credential health record.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use kiro_types::models::{
    CredentialStatus, CredentialView, PoolConfig, ReleaseOutcome, StoredCredential,
};

use crate::utils::redact::mask_secret;

/// Health as observed from upstream responses. Kept apart from the
/// administrative `disabled` flag so that re-enabling never hides an
/// invalidation that happened while the credential was disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Health {
    Active,
    CoolingDown,
    Invalid,
}

#[derive(Debug, Clone)]
pub(crate) struct PooledCredential {
    pub(crate) id: String,
    pub(crate) secret: String,
    pub(crate) health: Health,
    pub(crate) disabled: bool,
    pub(crate) failure_count: u32,
    pub(crate) cooldown_until: Option<DateTime<Utc>>,
    pub(crate) last_used_at: Option<DateTime<Utc>>,
    pub(crate) in_flight: u32,
    /// Stamped by the pool when the entry is created; leases carry it back on release
    pub(crate) generation: u64,
}

/// Stable identifier for a secret without an explicit id: first 12 hex digits of its SHA-256.
pub fn derive_credential_id(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

impl PooledCredential {
    pub(crate) fn from_stored(stored: &StoredCredential) -> Self {
        let id = stored
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| derive_credential_id(&stored.token));
        Self {
            id,
            secret: stored.token.clone(),
            health: Health::Active,
            disabled: stored.disabled,
            failure_count: 0,
            cooldown_until: None,
            last_used_at: None,
            in_flight: 0,
            generation: 0,
        }
    }

    pub(crate) fn status(&self) -> CredentialStatus {
        if self.disabled {
            return CredentialStatus::Disabled;
        }
        match self.health {
            Health::Active => CredentialStatus::Active,
            Health::CoolingDown => CredentialStatus::CoolingDown,
            Health::Invalid => CredentialStatus::Invalid,
        }
    }

    /// Status as of `now`, treating an elapsed cooldown as active without mutating.
    pub(crate) fn status_at(&self, now: DateTime<Utc>) -> CredentialStatus {
        if self.cooldown_elapsed(now) && !self.disabled {
            return CredentialStatus::Active;
        }
        self.status()
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.health == Health::CoolingDown && self.cooldown_until.map_or(true, |until| until <= now)
    }

    /// Lazily return an expired cooldown to active. Failure count is kept so
    /// that the next rate limit continues the backoff sequence.
    pub(crate) fn refresh(&mut self, now: DateTime<Utc>) {
        if self.cooldown_elapsed(now) {
            self.health = Health::Active;
            self.cooldown_until = None;
        }
    }

    pub(crate) fn apply_outcome(
        &mut self,
        outcome: ReleaseOutcome,
        now: DateTime<Utc>,
        settings: &PoolConfig,
    ) {
        match outcome {
            ReleaseOutcome::Success => {
                self.failure_count = 0;
                self.cooldown_until = None;
                if self.health == Health::CoolingDown {
                    self.health = Health::Active;
                }
            },
            ReleaseOutcome::AuthFailure => {
                self.health = Health::Invalid;
                self.cooldown_until = None;
            },
            ReleaseOutcome::RateLimited => {
                if self.health == Health::Invalid {
                    return;
                }
                self.failure_count = self.failure_count.saturating_add(1);
                let backoff = rate_limit_backoff(
                    self.failure_count,
                    settings.rate_limit_base_secs,
                    settings.rate_limit_max_secs,
                );
                self.cool_down(now + backoff);
            },
            ReleaseOutcome::ServerError => {
                if self.health == Health::Invalid {
                    return;
                }
                self.failure_count = self.failure_count.saturating_add(1);
                if self.failure_count >= settings.server_error_threshold {
                    self.cool_down(now + bounded_seconds(settings.server_error_cooldown_secs));
                }
            },
        }
    }

    fn cool_down(&mut self, until: DateTime<Utc>) {
        // Concurrent failures never shorten an existing cooldown
        let until = match self.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        };
        self.health = Health::CoolingDown;
        self.cooldown_until = Some(until);
    }

    /// Copy health bookkeeping from the previous generation of the same credential.
    pub(crate) fn inherit(&mut self, previous: &PooledCredential) {
        self.health = previous.health;
        self.failure_count = previous.failure_count;
        self.cooldown_until = previous.cooldown_until;
        self.last_used_at = previous.last_used_at;
        self.in_flight = previous.in_flight;
        self.generation = previous.generation;
    }

    pub(crate) fn view(&self, now: DateTime<Utc>) -> CredentialView {
        let status = self.status_at(now);
        CredentialView {
            id: self.id.clone(),
            masked_token: mask_secret(&self.secret),
            status,
            failure_count: self.failure_count,
            cooldown_until: if status == CredentialStatus::CoolingDown {
                self.cooldown_until
            } else {
                None
            },
            last_used_at: self.last_used_at,
            in_flight: self.in_flight,
        }
    }

    pub(crate) fn to_stored(&self) -> StoredCredential {
        StoredCredential {
            id: Some(self.id.clone()),
            token: self.secret.clone(),
            disabled: self.disabled,
        }
    }
}

/// `min(base * 2^(failures - 1), cap)` seconds.
pub fn rate_limit_backoff(failure_count: u32, base_secs: u64, cap_secs: u64) -> Duration {
    let exponent = failure_count.saturating_sub(1);
    let factor = 2_u64.checked_pow(exponent).unwrap_or(u64::MAX);
    bounded_seconds(base_secs.saturating_mul(factor).min(cap_secs))
}

// One year; keeps `DateTime + Duration` far from overflow for absurd settings.
const MAX_COOLDOWN_SECS: u64 = 365 * 24 * 3600;

fn bounded_seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_COOLDOWN_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        assert_eq!(rate_limit_backoff(1, 5, 300), Duration::seconds(5));
        assert_eq!(rate_limit_backoff(2, 5, 300), Duration::seconds(10));
        assert_eq!(rate_limit_backoff(4, 5, 300), Duration::seconds(40));
        assert_eq!(rate_limit_backoff(7, 5, 300), Duration::seconds(300));
        assert_eq!(rate_limit_backoff(200, 5, 300), Duration::seconds(300));
    }

    #[test]
    fn test_derived_id_is_stable_and_short() {
        let a = derive_credential_id("secret-one");
        assert_eq!(a.len(), 12);
        assert_eq!(a, derive_credential_id("secret-one"));
        assert_ne!(a, derive_credential_id("secret-two"));
    }

    #[test]
    fn test_blank_explicit_id_falls_back_to_digest() {
        let stored = StoredCredential::new("tok").with_id("  ");
        let entry = PooledCredential::from_stored(&stored);
        assert_eq!(entry.id, derive_credential_id("tok"));
    }
}
