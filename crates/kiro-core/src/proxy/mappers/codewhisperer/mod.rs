//! CodeWhisperer (`generateAssistantResponse`) upstream protocol.

pub mod events;
pub mod models;
pub mod request;
pub mod stream;

pub use events::UpstreamEvent;
pub use models::GenerateAssistantRequest;
pub use request::{build_upstream_request, UpstreamOptions};
pub use stream::{stream_error_type, CanonicalStreamBuilder};
