//! Durable credential storage.
//!
//! The pool owns live health state; the store only keeps what must survive a
//! restart: the secret, its id and the administrative disable flag.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use kiro_types::error::ConfigError;
use kiro_types::models::StoredCredential;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> AppResult<Vec<StoredCredential>>;
    async fn persist(&self, credentials: &[StoredCredential]) -> AppResult<()>;
}

/// JSON file store with atomic writes.
///
/// When the file does not exist yet, `load` returns the seed set (typically
/// parsed from `KIRO_AUTH_TOKEN`); the first `persist` materializes it.
pub struct JsonFileStore {
    path: PathBuf,
    seed: Vec<StoredCredential>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, seed: Vec::new() }
    }

    pub fn with_seed(mut self, seed: Vec<StoredCredential>) -> Self {
        self.seed = seed;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn load(&self) -> AppResult<Vec<StoredCredential>> {
        if !tokio::fs::try_exists(&self.path).await? {
            tracing::info!(
                "Credential file {} not found, using {} seeded credentials",
                self.path.display(),
                self.seed.len()
            );
            return Ok(self.seed.clone());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_credential_list(&content)?)
    }

    async fn persist(&self, credentials: &[StoredCredential]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(credentials)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        tracing::debug!("Persisted {} credentials to {}", credentials.len(), self.path.display());
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    credentials: Mutex<Vec<StoredCredential>>,
}

impl MemoryStore {
    pub fn new(credentials: Vec<StoredCredential>) -> Self {
        Self { credentials: Mutex::new(credentials) }
    }

    pub fn replace(&self, credentials: Vec<StoredCredential>) {
        *self.credentials.lock() = credentials;
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> AppResult<Vec<StoredCredential>> {
        Ok(self.credentials.lock().clone())
    }

    async fn persist(&self, credentials: &[StoredCredential]) -> AppResult<()> {
        self.replace(credentials.to_vec());
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialEntry {
    Plain(String),
    Detailed {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "accessToken", alias = "refreshToken")]
        token: String,
        #[serde(default)]
        disabled: bool,
    },
}

impl From<CredentialEntry> for StoredCredential {
    fn from(entry: CredentialEntry) -> Self {
        match entry {
            CredentialEntry::Plain(token) => StoredCredential::new(token),
            CredentialEntry::Detailed { id, token, disabled } => {
                StoredCredential { id, token, disabled }
            },
        }
    }
}

/// Parse a credential list: a JSON array of strings and/or objects, or a
/// comma-separated list of raw secrets.
pub fn parse_credential_list(raw: &str) -> Result<Vec<StoredCredential>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        let entries: Vec<CredentialEntry> =
            serde_json::from_str(trimmed).map_err(|e| ConfigError::parse("credential list", &e))?;
        return Ok(entries.into_iter().map(StoredCredential::from).collect());
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(StoredCredential::new)
        .collect())
}

/// Credentials supplied through `KIRO_AUTH_TOKEN`, if set.
pub fn credentials_from_env() -> Result<Vec<StoredCredential>, AppError> {
    match std::env::var("KIRO_AUTH_TOKEN") {
        Ok(raw) => Ok(parse_credential_list(&raw)?),
        Err(_) => Ok(Vec::new()),
    }
}
