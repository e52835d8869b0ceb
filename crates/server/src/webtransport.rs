//! WebTransport session handling.
//!
//! Every bidirectional stream the peer opens is echoed back on itself in its
//! own task, so a failing or idle stream never holds up its siblings.

use crate::server::log_connection_end;
use bytes::Bytes;
use h3::error::StreamError;
use h3::quic::BidiStream;
use h3_webtransport::server::{AcceptedBi, WebTransportSession};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Size of the copy buffer used per stream.
pub const ECHO_BUFFER_SIZE: usize = 100;

/// Accept streams on a session until it ends, echoing each one.
///
/// Only connection-level failures end the session. A stream the peer resets
/// or abandons before its header arrives is skipped.
pub async fn handle_session(
    session: WebTransportSession<h3_quinn::Connection, Bytes>,
    remote: SocketAddr,
) {
    let session_id = session.session_id();
    info!("WebTransport session established: {:?}", session_id);

    loop {
        match session.accept_bi().await {
            Ok(Some(AcceptedBi::BidiStream(id, stream))) => {
                debug!("Accepted bidi stream on session {:?}", id);
                let (send, recv) = BidiStream::split(stream);
                tokio::spawn(async move {
                    match echo_stream(recv, send).await {
                        Ok(echoed) => debug!("Bidi stream finished after {} bytes", echoed),
                        Err(e) => debug!("Bidi stream echo error: {:?}", e),
                    }
                });
            }
            Ok(Some(AcceptedBi::Request(req, _stream))) => {
                debug!("Ignoring HTTP request inside session: {:?}", req.uri());
            }
            Ok(None) => {
                debug!("No more bidi streams");
                break;
            }
            Err(StreamError::ConnectionError { 0: e, .. }) => {
                log_connection_end(remote, &e);
                break;
            }
            Err(StreamError::RemoteClosing { .. }) => {
                debug!("Peer is closing the connection: {}", remote);
                break;
            }
            Err(e) => {
                debug!("Skipping failed incoming stream: {}", e);
            }
        }
    }

    info!("WebTransport session ended: {:?}", session_id);
}

/// Copy everything read from `recv` back into `send`, in order.
///
/// Finishes `send` once `recv` reaches end of stream and returns the number of
/// bytes echoed. Bytes already written stay written if a later read or write
/// fails.
pub async fn echo_stream<R, S>(mut recv: R, mut send: S) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    S: AsyncWrite + Unpin,
{
    let mut buf = [0u8; ECHO_BUFFER_SIZE];
    let mut echoed = 0u64;

    loop {
        let n = recv.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        send.write_all(&buf[..n]).await?;
        send.flush().await?;
        echoed += n as u64;
    }

    send.shutdown().await?;
    Ok(echoed)
}
