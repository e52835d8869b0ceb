//! Certificate pinning client
//!
//! Does what a browser does before opening a WebTransport session with
//! `serverCertificateHashes`:
//! - Fetches the certificate fingerprint from the API endpoint
//! - Performs a QUIC handshake that only trusts that fingerprint
//! - Confirms the certificate presented in the handshake hashes to it

use anyhow::Context;
use clap::Parser;
use common::{install_crypto_provider, pinned_client_config, CertificateFingerprint, ClientConfig};
use quinn::Endpoint;
use rustls::pki_types::CertificateDer;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Verify a WebTransport echo server's pinned certificate.
#[derive(Parser, Debug)]
#[command(name = "wtecho-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// URL of the fingerprint API
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    api_url: String,

    /// WebTransport server address
    #[arg(long, default_value = "127.0.0.1:4443")]
    server_addr: SocketAddr,

    /// Server name sent in the TLS handshake
    #[arg(long, default_value = "localhost")]
    server_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    install_crypto_provider();

    let cli = Cli::parse();
    let config = ClientConfig::new(cli.api_url, cli.server_addr, cli.server_name);

    let pinned = fetch_fingerprint(&config.api_url).await?;
    info!("Pinned fingerprint: {}", pinned);

    let client_config = quinn::ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(pinned_client_config(pinned.clone()))?,
    ));

    let mut endpoint = Endpoint::client("0.0.0.0:0".parse()?)?;
    endpoint.set_default_client_config(client_config);

    info!("Connecting to {}...", config.server_addr);

    let conn = endpoint
        .connect(config.server_addr, &config.server_name)?
        .await
        .context("pinned handshake failed")?;

    let presented = presented_fingerprint(&conn)?;
    let matched = presented == pinned;
    if matched {
        info!("Handshake certificate matches: {}", presented);
    } else {
        error!("Handshake certificate {} does not match pin {}", presented, pinned);
    }

    conn.close(0u32.into(), b"done");
    endpoint.wait_idle().await;

    anyhow::ensure!(matched, "server certificate does not match the published fingerprint");
    info!("Connection closed cleanly");

    Ok(())
}

/// Fetch and parse the fingerprint published by the API endpoint.
async fn fetch_fingerprint(api_url: &str) -> anyhow::Result<CertificateFingerprint> {
    info!("GET {}", api_url);
    let response = reqwest::get(api_url)
        .await
        .with_context(|| format!("failed to reach {api_url}"))?
        .error_for_status()?;
    let body = response.text().await?;
    Ok(CertificateFingerprint::parse(&body)?)
}

/// Fingerprint of the end-entity certificate the server presented.
fn presented_fingerprint(conn: &quinn::Connection) -> anyhow::Result<CertificateFingerprint> {
    let chain = conn
        .peer_identity()
        .context("server presented no certificate")?
        .downcast::<Vec<CertificateDer<'static>>>()
        .map_err(|_| anyhow::anyhow!("unexpected peer identity type"))?;
    let leaf = chain.first().context("server presented an empty chain")?;
    Ok(CertificateFingerprint::of(leaf))
}
