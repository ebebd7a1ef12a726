//! CLI/env configuration blocks for the airport Flight server binary.
//!
//! Each field doubles as its own `--help` text and accepts the matching
//! `AIRPORT_*` environment variable, following the CLI conventions of the
//! rest of this workspace.

use std::net::SocketAddr;

use clap::Parser;
use serde::Serialize;

/// Configuration accepted by the airport Flight server on startup.
#[derive(Debug, Clone, PartialEq, Parser, Serialize)]
pub struct FlightServerConfig {
    /// Address to bind the Arrow Flight gRPC endpoint to.
    #[clap(
        long = "airport-bind-address",
        env = "AIRPORT_BIND_ADDRESS",
        default_value = "0.0.0.0:8815"
    )]
    pub bind_address: SocketAddr,

    /// Require a valid bearer token on every request. Disable only for local
    /// development; the server still runs without an `Authenticator` wired
    /// up if this is left on, which will reject all traffic.
    #[clap(long = "airport-require-auth", env = "AIRPORT_REQUIRE_AUTH")]
    pub require_auth: bool,

    /// ZStandard compression level applied to serialized catalog metadata
    /// payloads, 1 (fastest) through 22 (smallest). 0 disables compression.
    #[clap(
        long = "airport-compression-level",
        env = "AIRPORT_COMPRESSION_LEVEL",
        default_value = "3"
    )]
    pub compression_level: i32,

    /// Name of the catalog used when a request's `airport-catalog` header
    /// is absent or empty.
    #[clap(
        long = "airport-default-catalog",
        env = "AIRPORT_DEFAULT_CATALOG",
        default_value = ""
    )]
    pub default_catalog: String,
}

impl Default for FlightServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8815".parse().unwrap(),
            require_auth: false,
            compression_level: 3,
            default_catalog: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_parsing_no_args() {
        let config = FlightServerConfig::parse_from(["airport"]);
        assert_eq!(config, FlightServerConfig::default());
    }

    #[test]
    fn compression_level_is_overridable_by_flag() {
        let config =
            FlightServerConfig::parse_from(["airport", "--airport-compression-level", "9"]);
        assert_eq!(config.compression_level, 9);
    }
}
