//! Configuration enums for outbound connection shaping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which outbound header set the transport sends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeaderStrategy {
    /// Minimal neutral header set
    Off,
    /// Ordered header set mirroring the reference IDE client
    #[default]
    RealSimulation,
}

impl fmt::Display for HeaderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Off => write!(f, "off"),
            Self::RealSimulation => write!(f, "real_simulation"),
        }
    }
}

impl HeaderStrategy {
    /// Parse from string. Unknown values fall back to the default strategy.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::RealSimulation,
        }
    }
}

/// HTTP version policy for upstream connections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Http2Mode {
    /// Let ALPN negotiation decide
    #[default]
    Auto,
    /// Always speak HTTP/2
    ForceH2,
    /// Always speak HTTP/1.1
    ForceH1,
}

impl fmt::Display for Http2Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Auto => write!(f, "auto"),
            Self::ForceH2 => write!(f, "force_h2"),
            Self::ForceH1 => write!(f, "force_h1"),
        }
    }
}

impl Http2Mode {
    /// Parse from string. Unknown values fall back to `auto`.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "force_h2" | "h2" | "http2" => Self::ForceH2,
            "force_h1" | "h1" | "http1" => Self::ForceH1,
            _ => Self::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_display() {
        for mode in [Http2Mode::Auto, Http2Mode::ForceH2, Http2Mode::ForceH1] {
            assert_eq!(Http2Mode::from_string(&mode.to_string()), mode);
        }
        for strategy in [HeaderStrategy::Off, HeaderStrategy::RealSimulation] {
            assert_eq!(HeaderStrategy::from_string(&strategy.to_string()), strategy);
        }
    }

    #[test]
    fn test_unknown_values_fall_back() {
        assert_eq!(Http2Mode::from_string("quic"), Http2Mode::Auto);
        assert_eq!(HeaderStrategy::from_string("bogus"), HeaderStrategy::RealSimulation);
    }
}
