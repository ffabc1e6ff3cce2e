//! Small shared helpers.

pub mod paths;
pub mod redact;
