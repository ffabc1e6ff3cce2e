//! Upstream module - stealth transport and event-stream decoding

pub mod client;
pub mod eventstream;
pub mod stealth;

pub use client::{endpoint_url, CallCredential, StealthTransport, UpstreamResponse};
pub use eventstream::{decode_events, EventStreamDecoder, Frame, UpstreamEventStream};
