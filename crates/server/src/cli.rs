//! Command-line arguments.

use clap::Parser;
use common::ServerConfig;

/// WebTransport echo server with a self-signed, fingerprint-pinned certificate.
#[derive(Parser, Debug)]
#[command(name = "wtecho-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// API bind address formatted as <host>:<port>
    #[arg(long = "api-address", env = "WTECHO_API_ADDRESS", default_value = "0.0.0.0:8000")]
    pub api_address: String,

    /// WebTransport bind address formatted as <host>:<port>
    #[arg(
        long = "web-transport-address",
        env = "WTECHO_WEB_TRANSPORT_ADDRESS",
        default_value = "0.0.0.0:4443"
    )]
    pub web_transport_address: String,
}

impl Cli {
    pub fn into_config(self) -> ServerConfig {
        ServerConfig::new(self.api_address, self.web_transport_address)
    }
}
