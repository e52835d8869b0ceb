//! HTTP/3 endpoint that upgrades connections to WebTransport sessions.

use crate::webtransport;
use anyhow::Context;
use bytes::Bytes;
use common::{Identity, ALPN_H3};
use h3::error::{ConnectionError, LocalError};
use h3::ext::Protocol;
use h3::quic::ConnectionErrorIncoming;
use h3::server::RequestStream;
use h3_webtransport::server::WebTransportSession;
use http::{Method, Request, Response, StatusCode};
use quinn::{Endpoint, ServerConfig as QuinnServerConfig};
use rustls::ServerConfig as TlsServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The WebTransport echo endpoint, bound and ready to serve.
pub struct EchoServer {
    endpoint: Endpoint,
}

impl EchoServer {
    /// Bind a QUIC endpoint presenting `identity`'s certificate.
    pub fn bind(
        addr: SocketAddr,
        identity: &Identity,
        idle_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut tls_config = TlsServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(identity.cert_chain(), identity.private_key())?;
        tls_config.alpn_protocols = vec![ALPN_H3.to_vec()];

        let mut server_config = QuinnServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)?,
        ));

        let mut transport_config = quinn::TransportConfig::default();
        transport_config.max_idle_timeout(Some(idle_timeout.try_into()?));
        server_config.transport_config(Arc::new(transport_config));

        let endpoint = Endpoint::server(server_config, addr)
            .with_context(|| format!("failed to bind WebTransport endpoint on {addr}"))?;

        Ok(Self { endpoint })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Accept connections until the endpoint shuts down. Never returns `Ok`.
    pub async fn serve(self) -> anyhow::Result<()> {
        info!("WebTransport server listening on: {}", self.endpoint.local_addr()?);

        while let Some(incoming) = self.endpoint.accept().await {
            tokio::spawn(async move {
                match incoming.await {
                    Ok(conn) => {
                        let remote = conn.remote_address();
                        debug!("New connection from {}", remote);

                        if let Err(e) = handle_connection(conn).await {
                            error!("Connection error from {}: {:?}", remote, e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {:?}", e);
                    }
                }
            });
        }

        anyhow::bail!("WebTransport endpoint closed")
    }
}

/// Drive one QUIC connection: wait for the WebTransport upgrade, then hand
/// the connection over to the session.
async fn handle_connection(conn: quinn::Connection) -> anyhow::Result<()> {
    let remote = conn.remote_address();
    let mut h3_conn = h3::server::builder()
        .enable_webtransport(true)
        .enable_extended_connect(true)
        .enable_datagram(true)
        .max_webtransport_sessions(1)
        .send_grease(true)
        .build(h3_quinn::Connection::new(conn))
        .await?;

    loop {
        match h3_conn.accept().await {
            Ok(Some(resolver)) => {
                let (req, stream) = match resolver.resolve_request().await {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        error!("Failed to resolve request from {}: {:?}", remote, e);
                        continue;
                    }
                };

                // Origin is not checked: every peer may open a session.
                if is_webtransport_upgrade(&req) {
                    info!("connection accepted: {}", remote);
                    let session = WebTransportSession::accept(req, stream, h3_conn).await?;
                    webtransport::handle_session(session, remote).await;
                    return Ok(());
                }

                warn!(
                    "connection upgrade failed for {}: {} {} is not a WebTransport request",
                    remote,
                    req.method(),
                    req.uri()
                );
                tokio::spawn(async move {
                    if let Err(e) = reject(stream).await {
                        debug!("Failed to send rejection: {:?}", e);
                    }
                });
            }
            Ok(None) => {
                // Client closed connection gracefully (GOAWAY)
                debug!("Connection closed by client: {}", remote);
                break;
            }
            Err(e) => {
                log_connection_end(remote, &e);
                break;
            }
        }
    }

    Ok(())
}

fn is_webtransport_upgrade<T>(req: &Request<T>) -> bool {
    req.method() == Method::CONNECT
        && req.extensions().get::<Protocol>() == Some(&Protocol::WEB_TRANSPORT)
}

/// Answer a request that cannot be upgraded with a bare 500.
async fn reject(
    mut stream: RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>,
) -> anyhow::Result<()> {
    let response = Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(())?;

    stream.send_response(response).await?;
    stream.finish().await?;

    Ok(())
}

/// Log why a connection went away: routine closes at debug, the rest as errors.
pub(crate) fn log_connection_end(remote: SocketAddr, e: &ConnectionError) {
    if e.is_h3_no_error() {
        debug!("Connection closed gracefully: {}", remote);
        return;
    }
    match e {
        ConnectionError::Timeout { .. }
        | ConnectionError::Remote {
            0: ConnectionErrorIncoming::Timeout,
            ..
        } => debug!("Connection timed out: {}", remote),
        ConnectionError::Local {
            error: LocalError::Closing { .. },
            ..
        } => debug!("Connection closing: {}", remote),
        // Browsers close sessions with application codes of their own
        ConnectionError::Remote {
            0: ConnectionErrorIncoming::ApplicationClose { error_code },
            ..
        } => debug!("Connection closed by {} with code {:#x}", remote, error_code),
        _ => error!("Connection error from {}: {}", remote, e),
    }
}
