//! Gateway configuration models.

mod enums;
mod gateway;

pub use enums::{HeaderStrategy, Http2Mode};
pub use gateway::{
    GatewayConfig, LoggingConfig, PoolConfig, ServerConfig, StealthProfile, UpstreamConfig,
};
