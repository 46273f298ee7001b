//! Transport connection seam and the built-in framed TCP carrier.
//!
//! The obfuscated wire protocol is supplied by the embedder through
//! [`TransportDialer`]; this module ships the clear-mode carrier only,
//! which is the message codec over a plain TCP stream.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{ServerEndpoint, TransportMode};
use crate::error::{Error, Result};
use crate::message::Message;

/// A message-oriented, ordered, reliable channel to the remote endpoint.
///
/// Implementations must make `close()` idempotent and must unblock a
/// concurrently pending `receive()`, which then reports end of stream.
/// That is what makes bridge teardown complete in bounded time.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// Submit one message for sending.
    async fn send(&self, message: Message) -> Result<()>;

    /// Read the next message. `None` signals end of stream.
    async fn receive(&self) -> Option<Message>;

    /// Close the channel.
    async fn close(&self);
}

/// Opens transport connections for the lifecycle machine.
#[async_trait]
pub trait TransportDialer: Send + Sync {
    async fn open(&self, endpoint: &ServerEndpoint) -> Result<Arc<dyn TransportConnection>>;
}

/// The message codec over a plain TCP stream.
pub struct TcpTransport {
    reader: Mutex<ReadState>,
    writer: Mutex<OwnedWriteHalf>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

struct ReadState {
    half: OwnedReadHalf,
    buf: BytesMut,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            reader: Mutex::new(ReadState {
                half: read_half,
                buf: BytesMut::with_capacity(64 * 1024),
            }),
            writer: Mutex::new(write_half),
            closed_tx,
            closed_rx,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    async fn next_frame(&self) -> Result<Option<Message>> {
        let mut guard = self.reader.lock().await;
        let state = &mut *guard;
        loop {
            if let Some(message) = Message::decode(&mut state.buf)? {
                return Ok(Some(message));
            }
            let read = state
                .half
                .read_buf(&mut state.buf)
                .await
                .map_err(|e| Error::transport_io(format!("receive failed: {e}")))?;
            if read == 0 {
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl TransportConnection for TcpTransport {
    async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(Error::transport_io("transport is closed"));
        }
        let frame = message.encode();
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| Error::transport_io(format!("send failed: {e}")))
    }

    async fn receive(&self) -> Option<Message> {
        let mut closed = self.closed_rx.clone();
        if *closed.borrow() {
            return None;
        }
        let next = tokio::select! {
            _ = closed.changed() => return None,
            frame = self.next_frame() => frame,
        };
        match next {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "transport stream corrupted, treating as closed");
                None
            }
        }
    }

    async fn close(&self) {
        if self.closed_tx.send_replace(true) {
            return;
        }
        // Skip the graceful FIN when a send is mid-flight; waiting on the
        // writer lock could stall close behind a full send buffer. The
        // socket closes once the last handle drops.
        if let Ok(mut writer) = self.writer.try_lock() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "socket shutdown failed");
            }
        }
    }
}

/// Dialer for the clear transport mode.
///
/// Obfuscated mode requires an externally injected dialer; this one
/// refuses it rather than shipping stub cryptography.
#[derive(Debug, Default)]
pub struct TcpDialer;

impl TcpDialer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportDialer for TcpDialer {
    async fn open(&self, endpoint: &ServerEndpoint) -> Result<Arc<dyn TransportConnection>> {
        if endpoint.mode != TransportMode::Clear {
            return Err(Error::transport_open(
                "no obfuscated transport is registered for this build",
            ));
        }

        info!(server = %endpoint.host, port = endpoint.port, "opening transport connection");

        let stream = timeout(
            endpoint.connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| {
            Error::transport_open(format!(
                "connect to {}:{} timed out",
                endpoint.host, endpoint.port
            ))
        })?
        .map_err(|e| {
            Error::transport_open(format!(
                "connect to {}:{} failed: {e}",
                endpoint.host, endpoint.port
            ))
        })?;

        stream
            .set_nodelay(true)
            .map_err(|e| Error::transport_open(format!("socket setup failed: {e}")))?;

        debug!("transport connection established");
        Ok(Arc::new(TcpTransport::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpTransport, TcpTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (server, _) = accepted.unwrap();
        (
            TcpTransport::new(client.unwrap()),
            TcpTransport::new(server),
        )
    }

    #[tokio::test]
    async fn test_send_receive_over_loopback() {
        let (client, server) = tcp_pair().await;

        client
            .send(Message::Ipv4Data(Bytes::from_static(&[0x45, 0, 0, 40])))
            .await
            .unwrap();
        client
            .send(Message::AddressAssignV4(Ipv4Addr::new(10, 0, 0, 2)))
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(2), server.receive())
            .await
            .unwrap();
        assert_eq!(
            first,
            Some(Message::Ipv4Data(Bytes::from_static(&[0x45, 0, 0, 40])))
        );

        let second = timeout(Duration::from_secs(2), server.receive())
            .await
            .unwrap();
        assert_eq!(
            second,
            Some(Message::AddressAssignV4(Ipv4Addr::new(10, 0, 0, 2)))
        );
    }

    #[tokio::test]
    async fn test_local_close_unblocks_pending_receive() {
        let (client, _server) = tcp_pair().await;
        let client = Arc::new(client);

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.receive().await })
        };

        // Let the receive suspend before closing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.close().await;

        let received = timeout(Duration::from_secs(2), pending)
            .await
            .expect("receive must unblock after close")
            .unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn test_peer_shutdown_yields_end_of_stream() {
        let (client, server) = tcp_pair().await;

        client.close().await;
        let received = timeout(Duration::from_secs(2), server.receive())
            .await
            .unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (client, _server) = tcp_pair().await;
        client.close().await;
        let result = client
            .send(Message::Ipv6Data(Bytes::from_static(&[0x60])))
            .await;
        assert!(matches!(result, Err(Error::TransportIo(_))));
    }

    #[tokio::test]
    async fn test_dialer_refuses_obfuscated_mode() {
        let endpoint = ServerEndpoint {
            host: "127.0.0.1".to_string(),
            port: 1,
            public_identity: b"key".to_vec(),
            mode: TransportMode::Obfuscated,
            connect_timeout: Duration::from_secs(1),
        };
        let result = TcpDialer::new().open(&endpoint).await;
        assert!(matches!(result, Err(Error::TransportOpen(_))));
    }
}
