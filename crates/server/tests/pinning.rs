//! End-to-end tests for certificate pinning.
//!
//! The fingerprint fetched over HTTP must be exactly the digest of the
//! certificate the WebTransport endpoint presents in its QUIC handshake.

use common::{
    install_crypto_provider, pinned_client_config, CertificateFingerprint, Identity, ServerConfig,
};
use quinn::crypto::rustls::QuicClientConfig;
use rustls::pki_types::CertificateDer;
use server::Supervisor;
use std::net::SocketAddr;
use std::sync::Arc;

// =============================================================================
// Test Helpers
// =============================================================================

/// Bind both servers on ephemeral loopback ports and start serving.
async fn start() -> (SocketAddr, SocketAddr, CertificateFingerprint) {
    install_crypto_provider();
    let supervisor = Supervisor::bind(&ServerConfig::new("127.0.0.1:0", "127.0.0.1:0"))
        .await
        .expect("servers bind");
    let api = supervisor.api_addr().unwrap();
    let webtransport = supervisor.webtransport_addr().unwrap();
    let fingerprint = supervisor.fingerprint().clone();
    tokio::spawn(supervisor.wait());
    (api, webtransport, fingerprint)
}

async fn connect(
    addr: SocketAddr,
    pin: CertificateFingerprint,
) -> Result<(quinn::Endpoint, quinn::Connection), quinn::ConnectionError> {
    let tls = pinned_client_config(pin);
    let client_config =
        quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(tls).unwrap()));
    let mut endpoint = quinn::Endpoint::client("127.0.0.1:0".parse().unwrap()).unwrap();
    endpoint.set_default_client_config(client_config);

    let conn = endpoint.connect(addr, "localhost").unwrap().await?;
    Ok((endpoint, conn))
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn presented_certificate(conn: &quinn::Connection) -> CertificateDer<'static> {
    let identity = conn.peer_identity().expect("server presented certificates");
    let chain = identity
        .downcast::<Vec<CertificateDer<'static>>>()
        .expect("rustls certificate chain");
    chain[0].clone()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_http_fingerprint_matches_handshake_certificate() {
    let (api, webtransport, fingerprint) = start().await;

    let body = http_client()
        .get(format!("http://{api}/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, fingerprint.as_str());

    let pin = CertificateFingerprint::parse(&body).unwrap();
    let (endpoint, conn) = connect(webtransport, pin).await.expect("pinned handshake");

    let presented = presented_certificate(&conn);
    assert_eq!(CertificateFingerprint::of(&presented).as_str(), body);
    assert_eq!(
        conn.handshake_data()
            .and_then(|data| data.downcast::<quinn::crypto::rustls::HandshakeData>().ok())
            .and_then(|data| data.protocol),
        Some(b"h3".to_vec())
    );

    conn.close(0u32.into(), b"done");
    endpoint.wait_idle().await;
}

#[tokio::test]
async fn test_fingerprint_stable_across_requests() {
    let (api, _, fingerprint) = start().await;
    let client = http_client();

    for path in ["/", "/fingerprint", "/a/b/c"] {
        let response = client.get(format!("http://{api}{path}")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.text().await.unwrap(), fingerprint.as_str());
    }

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("http://{api}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 200);
    for name in [
        "access-control-allow-origin",
        "access-control-allow-methods",
        "access-control-allow-headers",
    ] {
        assert_eq!(preflight.headers()[name], "*");
    }
    assert!(preflight.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_pin_is_rejected() {
    let (_, webtransport, _) = start().await;
    let stranger = Identity::generate().unwrap();

    let result = connect(webtransport, stranger.fingerprint().clone()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_api_bind_conflict_is_fatal() {
    install_crypto_provider();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let result = server::run(&ServerConfig::new(addr, "127.0.0.1:0")).await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("failed to bind API server"));
}

#[tokio::test]
async fn test_unresolvable_webtransport_address_is_fatal() {
    install_crypto_provider();
    let result = server::run(&ServerConfig::new("127.0.0.1:0", "no port here")).await;
    assert!(result.is_err());
}
