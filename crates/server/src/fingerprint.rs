//! Plain HTTP endpoint publishing the certificate fingerprint.
//!
//! Browsers fetch the fingerprint from here and pass it as
//! `serverCertificateHashes` when opening the WebTransport session, so every
//! response allows any origin, method and header.

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::Router;
use common::{CertificateFingerprint, Identity};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the fingerprint router. Every path and method is served.
pub fn router(fingerprint: CertificateFingerprint) -> Router {
    let any = HeaderValue::from_static("*");

    Router::new()
        .fallback(serve_fingerprint)
        .with_state(fingerprint)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            any.clone(),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            any.clone(),
        ))
        .layer(SetResponseHeaderLayer::overriding(header::ACCESS_CONTROL_ALLOW_HEADERS, any))
}

async fn serve_fingerprint(
    State(fingerprint): State<CertificateFingerprint>,
    method: Method,
) -> (StatusCode, String) {
    if method == Method::OPTIONS {
        return (StatusCode::OK, String::new());
    }
    (StatusCode::OK, fingerprint.to_string())
}

/// The fingerprint API, bound and ready to serve.
pub struct FingerprintServer {
    listener: TcpListener,
    router: Router,
}

impl FingerprintServer {
    pub async fn bind(addr: &str, identity: &Identity) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: router(identity.fingerprint().clone()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the listener fails. Never returns `Ok`.
    pub async fn serve(self) -> anyhow::Result<()> {
        info!("API server listening on: {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        anyhow::bail!("API server stopped accepting connections")
    }
}
