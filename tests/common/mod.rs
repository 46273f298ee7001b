//! In-memory doubles for the transport and packet interface seams.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use veiltun::{
    ClientConfig, ConnectAnimation, Error, Message, PacketInterface, Result, ServerEndpoint,
    TaggedPacket, TransportConnection, TransportDialer, TransportMode,
};

/// In-memory transport endpoint; the far end is driven by the test.
pub struct MemoryTransport {
    to_remote: mpsc::UnboundedSender<Message>,
    from_remote: Mutex<mpsc::UnboundedReceiver<Message>>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

/// Far-end handles for a [`MemoryTransport`]. Dropping `outgoing`
/// simulates the server closing the connection.
pub struct RemoteEnd {
    /// Messages the client submitted for sending.
    pub incoming: mpsc::UnboundedReceiver<Message>,
    /// Messages delivered to the client.
    pub outgoing: mpsc::UnboundedSender<Message>,
}

impl MemoryTransport {
    pub fn pair() -> (Arc<MemoryTransport>, RemoteEnd) {
        let (to_remote, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_remote) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        (
            Arc::new(MemoryTransport {
                to_remote,
                from_remote: Mutex::new(from_remote),
                closed_tx,
                closed_rx,
            }),
            RemoteEnd { incoming, outgoing },
        )
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

#[async_trait]
impl TransportConnection for MemoryTransport {
    async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(Error::transport_io("transport is closed"));
        }
        self.to_remote
            .send(message)
            .map_err(|_| Error::transport_io("remote end dropped"))
    }

    async fn receive(&self) -> Option<Message> {
        let mut closed = self.closed_rx.clone();
        if *closed.borrow() {
            return None;
        }
        let mut rx = self.from_remote.lock().await;
        tokio::select! {
            _ = closed.changed() => None,
            message = rx.recv() => message,
        }
    }

    async fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

/// Packet interface fed and observed through channels.
pub struct ChannelInterface {
    batches: Mutex<mpsc::UnboundedReceiver<Vec<TaggedPacket>>>,
    injected: mpsc::UnboundedSender<TaggedPacket>,
}

/// Test-side handles for a [`ChannelInterface`].
pub struct InterfaceDriver {
    /// Batches the interface will hand to the outbound pump.
    pub batches: mpsc::UnboundedSender<Vec<TaggedPacket>>,
    /// Packets the inbound pump injected.
    pub injected: mpsc::UnboundedReceiver<TaggedPacket>,
}

impl ChannelInterface {
    pub fn pair() -> (Arc<ChannelInterface>, InterfaceDriver) {
        let (batches_tx, batches_rx) = mpsc::unbounded_channel();
        let (injected_tx, injected_rx) = mpsc::unbounded_channel();
        (
            Arc::new(ChannelInterface {
                batches: Mutex::new(batches_rx),
                injected: injected_tx,
            }),
            InterfaceDriver {
                batches: batches_tx,
                injected: injected_rx,
            },
        )
    }
}

#[async_trait]
impl PacketInterface for ChannelInterface {
    async fn read_batch(&self) -> Result<Vec<TaggedPacket>> {
        let mut rx = self.batches.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| Error::transport_io("packet interface closed"))
    }

    async fn write_batch(&self, packets: Vec<TaggedPacket>) -> Result<()> {
        for packet in packets {
            self.injected
                .send(packet)
                .map_err(|_| Error::transport_io("packet interface closed"))?;
        }
        Ok(())
    }
}

pub enum DialOutcome {
    Connect(Arc<MemoryTransport>),
    Fail(String),
}

/// Dialer that replays scripted outcomes and counts open attempts.
#[derive(Default)]
pub struct ScriptedDialer {
    outcomes: StdMutex<VecDeque<DialOutcome>>,
    opens: AtomicUsize,
}

impl ScriptedDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_connect(&self, transport: Arc<MemoryTransport>) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(DialOutcome::Connect(transport));
    }

    pub fn push_failure(&self, message: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(DialOutcome::Fail(message.to_string()));
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportDialer for ScriptedDialer {
    async fn open(&self, _endpoint: &ServerEndpoint) -> Result<Arc<dyn TransportConnection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().unwrap().pop_front() {
            Some(DialOutcome::Connect(transport)) => Ok(transport),
            Some(DialOutcome::Fail(message)) => Err(Error::transport_open(message)),
            None => Err(Error::transport_open("no scripted connection available")),
        }
    }
}

/// Animation double counting start/stop calls.
#[derive(Default)]
pub struct CountingAnimation {
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
}

impl CountingAnimation {
    pub fn starts(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl ConnectAnimation for CountingAnimation {
    fn start(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// A valid configuration pointing at a scripted dialer.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        host: "vpn.test.example".to_string(),
        port: 443,
        // base64 of "test-identity-key"
        server_public_key: "dGVzdC1pZGVudGl0eS1rZXk=".to_string(),
        mode: TransportMode::Clear,
        connect_timeout_secs: 5,
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).without_time())
        .try_init();
}

/// Poll `condition` until it holds or two seconds elapse.
pub async fn eventually<F: Fn() -> bool>(condition: F, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time: {what}");
}
