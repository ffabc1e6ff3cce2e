//! Proxy module - request path from public dialects to the upstream

pub mod credential_pool;
pub mod gateway;
pub mod handlers;
pub mod mappers;
pub mod middleware;
pub mod server;
pub mod upstream;


pub use credential_pool::{CredentialLease, CredentialPool, PoolStats, ReloadSummary};
pub use gateway::{Gateway, GatewayResponse};
pub use server::{build_proxy_router, ProxyState};
pub use upstream::StealthTransport;
