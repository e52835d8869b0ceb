//! Configuration types for server and client.

use std::net::{Ipv4Addr, SocketAddr};

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` the fingerprint API listens on (TCP).
    pub api_addr: String,
    /// `host:port` the WebTransport endpoint listens on (UDP).
    pub webtransport_addr: String,
    /// QUIC idle timeout in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_addr: "0.0.0.0:8000".to_string(),
            webtransport_addr: "0.0.0.0:4443".to_string(),
            idle_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn new(api_addr: impl Into<String>, webtransport_addr: impl Into<String>) -> Self {
        Self {
            api_addr: api_addr.into(),
            webtransport_addr: webtransport_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }
}

/// Client configuration options.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL of the fingerprint API.
    pub api_url: String,
    /// WebTransport server address to connect to.
    pub server_addr: SocketAddr,
    /// Server name for TLS (SNI).
    pub server_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".to_string(),
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 4443)),
            server_name: "localhost".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(
        api_url: impl Into<String>,
        server_addr: SocketAddr,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            server_addr,
            server_name: server_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.api_addr, "0.0.0.0:8000");
        assert_eq!(config.webtransport_addr, "0.0.0.0:4443");
        assert_eq!(config.idle_timeout_secs, 30);
    }

    #[test]
    fn test_server_builder() {
        let config = ServerConfig::new("127.0.0.1:0", "localhost:0").with_idle_timeout(5);
        assert_eq!(config.api_addr, "127.0.0.1:0");
        assert_eq!(config.webtransport_addr, "localhost:0");
        assert_eq!(config.idle_timeout_secs, 5);
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr.port(), 4443);
        assert_eq!(config.server_name, "localhost");
    }
}
