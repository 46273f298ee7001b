//! Packet/message bridge.
//!
//! Two independent pumps run for the lifetime of one tunnel session:
//! the outbound pump drains packet batches from the local interface and
//! submits them as transport messages, and the inbound pump turns
//! transport messages back into injected packets. The pumps communicate
//! only through the shared transport and interface, never directly, so
//! teardown stays explicit: a stop signal wakes the outbound pump out of
//! a pending read, and closing the transport unblocks the inbound pump.
//!
//! A new bridge is created per connection attempt; no pump state
//! survives across sessions.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::adapter::{AddressFamily, PacketInterface, TaggedPacket};
use crate::message::Message;
use crate::session::SessionHandle;
use crate::transport::TransportConnection;

/// How long `shutdown` waits for a pump to finish before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The address granted to the client for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressAssignment {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl fmt::Display for AddressAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressAssignment::V4(address) => write!(f, "{address}"),
            AddressAssignment::V6(address) => write!(f, "{address}"),
        }
    }
}

/// Per-session traffic counters.
#[derive(Debug, Default)]
pub struct TunnelStats {
    /// Packets submitted to the transport.
    pub packets_sent: AtomicU64,
    /// Packets injected into the local interface.
    pub packets_received: AtomicU64,
    /// Payload bytes submitted to the transport.
    pub bytes_sent: AtomicU64,
    /// Payload bytes injected into the local interface.
    pub bytes_received: AtomicU64,
}

/// The pair of pumps translating between packets and transport messages.
pub struct TunnelBridge {
    transport: Arc<dyn TransportConnection>,
    assignment: Arc<Mutex<Option<AddressAssignment>>>,
    stats: Arc<TunnelStats>,
    stop_tx: mpsc::Sender<()>,
    shutting_down: Arc<AtomicBool>,
    closed_rx: Option<oneshot::Receiver<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TunnelBridge {
    /// Spawn both pumps over an established transport connection.
    pub fn start(
        transport: Arc<dyn TransportConnection>,
        interface: Arc<dyn PacketInterface>,
        session: SessionHandle,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (closed_tx, closed_rx) = oneshot::channel();
        let assignment = Arc::new(Mutex::new(None));
        let stats = Arc::new(TunnelStats::default());
        let shutting_down = Arc::new(AtomicBool::new(false));

        let outbound = tokio::spawn(outbound_pump(
            interface.clone(),
            transport.clone(),
            session.clone(),
            stats.clone(),
            stop_rx,
        ));
        let inbound = tokio::spawn(inbound_pump(
            transport.clone(),
            interface,
            session,
            assignment.clone(),
            stats.clone(),
            stop_tx.clone(),
            shutting_down.clone(),
            closed_tx,
        ));

        debug!("tunnel bridge started");
        Self {
            transport,
            assignment,
            stats,
            stop_tx,
            shutting_down,
            closed_rx: Some(closed_rx),
            tasks: vec![outbound, inbound],
        }
    }

    /// The address recorded by the assignment handshake, if any.
    pub fn address_assignment(&self) -> Option<AddressAssignment> {
        *self.assignment.lock().unwrap()
    }

    /// Traffic counters for this session.
    pub fn stats(&self) -> Arc<TunnelStats> {
        self.stats.clone()
    }

    /// One-shot notification fired when the session ends from the far
    /// side (or a mid-session I/O failure), but not on local shutdown.
    pub fn closed_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        self.closed_rx.take()
    }

    /// Stop both pumps and close the transport.
    ///
    /// Completes in bounded time even while a pump is suspended
    /// mid-read: the stop signal wakes the outbound pump, closing the
    /// transport unblocks the inbound pump, and anything still running
    /// after the grace period is aborted.
    pub async fn shutdown(&mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.try_send(());
        self.transport.close().await;

        for mut task in self.tasks.drain(..) {
            if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("bridge pump did not stop in time, aborting");
                task.abort();
            }
        }
        debug!("tunnel bridge stopped");
    }
}

impl Drop for TunnelBridge {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Packets -> messages. Continuously drains the packet interface and
/// submits each packet as a transport message, preserving batch order.
async fn outbound_pump(
    interface: Arc<dyn PacketInterface>,
    transport: Arc<dyn TransportConnection>,
    session: SessionHandle,
    stats: Arc<TunnelStats>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    debug!("outbound pump started");
    'pump: loop {
        if !session.is_tunnel_active() {
            break;
        }
        let batch = tokio::select! {
            _ = stop_rx.recv() => break,
            read = interface.read_batch() => match read {
                Ok(batch) => batch,
                Err(e) => {
                    debug!(error = %e, "packet interface read ended");
                    break;
                }
            },
        };
        for packet in batch {
            let len = packet.payload.len() as u64;
            let message = match packet.family {
                AddressFamily::Ipv4 => Message::Ipv4Data(packet.payload),
                AddressFamily::Ipv6 => Message::Ipv6Data(packet.payload),
                AddressFamily::Unknown(version) => {
                    warn!(version, "dropping packet with unsupported address family");
                    continue;
                }
            };
            if let Err(e) = transport.send(message).await {
                warn!(error = %e, "transport send failed, stopping outbound pump");
                break 'pump;
            }
            stats.packets_sent.fetch_add(1, Ordering::Relaxed);
            stats.bytes_sent.fetch_add(len, Ordering::Relaxed);
        }
    }
    // Tear down the sibling: a closed transport ends its pending receive.
    transport.close().await;
    debug!("outbound pump stopped");
}

/// Messages -> packets. Injects data messages into the local interface
/// and records the first address assignment of the session.
#[allow(clippy::too_many_arguments)]
async fn inbound_pump(
    transport: Arc<dyn TransportConnection>,
    interface: Arc<dyn PacketInterface>,
    session: SessionHandle,
    assignment: Arc<Mutex<Option<AddressAssignment>>>,
    stats: Arc<TunnelStats>,
    stop_tx: mpsc::Sender<()>,
    shutting_down: Arc<AtomicBool>,
    closed_tx: oneshot::Sender<()>,
) {
    debug!("inbound pump started");
    let mut notify_close = false;
    loop {
        if !session.is_tunnel_active() {
            break;
        }
        let Some(message) = transport.receive().await else {
            if !shutting_down.load(Ordering::SeqCst) {
                info!("transport reached end of stream");
                notify_close = true;
            }
            break;
        };
        let inject = match message {
            Message::Ipv4Data(payload) => Some((payload, AddressFamily::Ipv4)),
            Message::Ipv6Data(payload) => Some((payload, AddressFamily::Ipv6)),
            Message::AddressAssignV4(address) => {
                record_assignment(&assignment, AddressAssignment::V4(address));
                None
            }
            Message::AddressAssignV6(address) => {
                record_assignment(&assignment, AddressAssignment::V6(address));
                None
            }
            Message::Unsupported { tag } => {
                warn!(tag, "dropping unsupported transport message");
                None
            }
        };
        if let Some((payload, family)) = inject {
            let len = payload.len() as u64;
            if let Err(e) = interface
                .write_batch(vec![TaggedPacket::new(payload, family)])
                .await
            {
                warn!(error = %e, "packet interface write failed, stopping inbound pump");
                notify_close = !shutting_down.load(Ordering::SeqCst);
                break;
            }
            stats.packets_received.fetch_add(1, Ordering::Relaxed);
            stats.bytes_received.fetch_add(len, Ordering::Relaxed);
        }
    }
    // Stop the sibling even if it is suspended waiting for packets.
    let _ = stop_tx.try_send(());
    transport.close().await;
    if notify_close {
        let _ = closed_tx.send(());
    }
    debug!("inbound pump stopped");
}

/// First assignment wins; later assignments in the same session are
/// logged and discarded.
fn record_assignment(slot: &Mutex<Option<AddressAssignment>>, assignment: AddressAssignment) {
    let mut slot = slot.lock().unwrap();
    match *slot {
        None => {
            info!(address = %assignment, "address assignment received");
            *slot = Some(assignment);
        }
        Some(existing) => {
            warn!(kept = %existing, ignored = %assignment, "duplicate address assignment ignored");
        }
    }
}
