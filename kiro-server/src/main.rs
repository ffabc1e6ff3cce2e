//! Kiro Gateway Server - Headless Daemon
//!
//! A pure Rust HTTP server that:
//! - Serves the Anthropic and OpenAI dialects on /v1/*, backed by a rotating
//!   pool of Kiro credentials
//! - Provides an admin REST API for credentials and settings on /api/*
//!
//! Access via: http://localhost:8080

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

mod api;
mod cli;
mod router;
mod state;
#[cfg(test)]
mod test_helpers;

use cli::{Cli, Commands, FileArgs, ServeArgs};
use kiro_core::modules::config::{default_config_path, default_credentials_path, load_config, validate_config};
use kiro_core::modules::credential_store::{credentials_from_env, CredentialStore, JsonFileStore};
use kiro_core::modules::logger::init_logging;
use kiro_core::proxy::CredentialPool;
use kiro_types::models::GatewayConfig;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::CheckConfig(files)) => check_config(&files).await,
        Some(Commands::Serve(args)) => serve(args).await,
        None => serve(cli.serve).await,
    }
}

fn config_path(files: &FileArgs) -> Result<PathBuf> {
    match &files.config {
        Some(path) => Ok(path.clone()),
        None => default_config_path().context("Failed to resolve settings path"),
    }
}

/// Credentials file store, seeded from `KIRO_AUTH_TOKEN` until the file exists.
fn open_store(files: &FileArgs) -> Result<JsonFileStore> {
    let path = match &files.credentials {
        Some(path) => path.clone(),
        None => default_credentials_path().context("Failed to resolve credentials path")?,
    };
    Ok(JsonFileStore::new(path).with_seed(credentials_from_env()?))
}

fn load_serve_config(args: &ServeArgs, path: &std::path::Path) -> Result<GatewayConfig> {
    let mut config = load_config(path).with_context(|| format!("Invalid settings in {}", path.display()))?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    validate_config(&config)?;
    Ok(config)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let path = config_path(&args.files)?;
    let config = load_serve_config(&args, &path)?;
    let _log_guard = init_logging(&config.logging)?;

    info!("🚀 Kiro Gateway starting...");

    let store = open_store(&args.files)?;
    info!("🔑 Credentials file: {}", store.path().display());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, Some(path), Arc::new(store)).await?;

    let stats = state.pool().stats();
    info!("✅ Application state initialized");
    info!("📊 {} credentials loaded ({} active)", stats.total, stats.active);

    let app = router::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🌐 Server listening on http://{}", addr);
    info!("🔌 Admin API at http://{}/api/", addr);
    info!("🔀 Proxy endpoints at http://{}/v1/", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn check_config(files: &FileArgs) -> Result<()> {
    let path = config_path(files)?;
    let config = load_config(&path).with_context(|| format!("Invalid settings in {}", path.display()))?;
    println!("{} Settings OK: {}", "✓".green(), path.display());
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Upstream: {}", config.upstream.base_url);
    println!("  Stealth: {} / {}", config.stealth.header_strategy, config.stealth.http2_mode);
    if config.server.client_token.is_empty() {
        println!("{} KIRO_CLIENT_TOKEN is empty; every /v1 and /api request will be rejected", "!".yellow());
    }

    let store = open_store(files)?;
    let credentials = store.load().await?;
    let pool = CredentialPool::load(credentials, config.pool.clone())
        .with_context(|| format!("No usable credentials in {} or KIRO_AUTH_TOKEN", store.path().display()))?;
    let stats = pool.stats();
    println!(
        "{} Credentials OK: {} total, {} enabled",
        "✓".green(),
        stats.total,
        stats.total - stats.disabled
    );
    Ok(())
}
