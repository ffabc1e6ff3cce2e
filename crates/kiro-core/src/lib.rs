//! # Kiro Core
//!
//! Gateway logic for Kiro Gateway.
//!
//! ## Architecture
//!
//! ```text
//! kiro-core/src/
//! ├── modules/                  # config, credential store, logging
//! ├── proxy/
//! │   ├── credential_pool/      # health-tracked round-robin over credentials
//! │   ├── mappers/              # anthropic / openai <-> canonical <-> codewhisperer
//! │   ├── upstream/             # stealth transport + event-stream framing
//! │   ├── gateway/              # per-request orchestration and stream relay
//! │   ├── handlers/             # axum handlers for /v1/*
//! │   ├── middleware/           # client auth gate
//! │   └── server.rs             # proxy router
//! └── utils/                    # secret masking, data paths
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "Mutex guards are scoped explicitly around the critical sections"
)]
#![allow(clippy::module_name_repetitions, reason = "Names mirror the protocol vocabulary")]
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::indexing_slicing
    )
)]

pub mod error;
pub mod modules;
pub mod proxy;
pub mod utils;

pub use error::{AppError, AppResult};
