//! Configuration, credential storage and logging.

pub mod config;
pub mod credential_store;
pub mod logger;
