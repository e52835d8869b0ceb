//! Runs the fingerprint API and the WebTransport endpoint side by side.
//!
//! Both servers are bound before either starts serving, sharing one
//! [`Identity`]. Whichever server stops first decides the outcome: there is
//! no draining of the other one and no restart.

use crate::fingerprint::FingerprintServer;
use crate::server::EchoServer;
use anyhow::Context;
use common::{CertificateFingerprint, Identity, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::info;

/// Why the process has to stop.
#[derive(Error, Debug)]
pub enum ServerExit {
    /// The server's accept loop failed
    #[error("{server} server closed: {cause:#}")]
    Failed {
        server: &'static str,
        cause: anyhow::Error,
    },

    /// The server's accept loop ended without an error
    #[error("{server} server closed")]
    Stopped { server: &'static str },

    /// The server's task panicked or was cancelled
    #[error("{server} server task aborted: {cause}")]
    Panicked {
        server: &'static str,
        cause: JoinError,
    },
}

impl ServerExit {
    fn from_task(server: &'static str, result: Result<anyhow::Result<()>, JoinError>) -> Self {
        match result {
            Ok(Ok(())) => Self::Stopped { server },
            Ok(Err(cause)) => Self::Failed { server, cause },
            Err(cause) => Self::Panicked { server, cause },
        }
    }

    pub fn server(&self) -> &'static str {
        match self {
            Self::Failed { server, .. }
            | Self::Stopped { server }
            | Self::Panicked { server, .. } => server,
        }
    }
}

/// Both servers, bound and sharing one identity.
pub struct Supervisor {
    fingerprint: CertificateFingerprint,
    api: FingerprintServer,
    echo: EchoServer,
}

impl Supervisor {
    /// Generate the identity and bind both servers. Any failure here is fatal.
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let identity = Identity::generate().context("failed to generate TLS certificate")?;
        info!("Certificate fingerprint: {}", identity.fingerprint());

        let api = FingerprintServer::bind(&config.api_addr, &identity)
            .await
            .with_context(|| format!("failed to bind API server on {}", config.api_addr))?;

        let echo_addr = resolve(&config.webtransport_addr).await?;
        let echo = EchoServer::bind(
            echo_addr,
            &identity,
            Duration::from_secs(config.idle_timeout_secs),
        )?;

        Ok(Self {
            fingerprint: identity.fingerprint().clone(),
            api,
            echo,
        })
    }

    pub fn fingerprint(&self) -> &CertificateFingerprint {
        &self.fingerprint
    }

    pub fn api_addr(&self) -> std::io::Result<SocketAddr> {
        self.api.local_addr()
    }

    pub fn webtransport_addr(&self) -> std::io::Result<SocketAddr> {
        self.echo.local_addr()
    }

    /// Serve both until the first one stops, and report why.
    pub async fn wait(self) -> ServerExit {
        let mut api = tokio::spawn(self.api.serve());
        let mut echo = tokio::spawn(self.echo.serve());

        tokio::select! {
            result = &mut api => ServerExit::from_task("API", result),
            result = &mut echo => ServerExit::from_task("WebTransport", result),
        }
    }
}

/// Bind both servers and serve until one of them stops.
///
/// Only ever returns an error.
pub async fn run(config: &ServerConfig) -> anyhow::Result<()> {
    let supervisor = Supervisor::bind(config).await?;
    Err(supervisor.wait().await.into())
}

async fn resolve(addr: &str) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("failed to resolve {addr}"))?
        .next()
        .with_context(|| format!("{addr} did not resolve to any address"))
}
