//! Connection lifecycle machine.
//!
//! `VpnClient` owns the session handle and orchestrates connect and
//! disconnect around the injected collaborators: the transport dialer,
//! the packet interface, the connect animation, and the status channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::adapter::PacketInterface;
use crate::bridge::{AddressAssignment, TunnelBridge};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::session::{ConnectionStage, ConnectionState, SessionHandle};
use crate::status::{ConnectAnimation, NoAnimation, StatusReporter, StatusUpdate};
use crate::transport::TransportDialer;

/// The lifecycle machine of one tunnel client.
///
/// Tracks session progress through state/stage pairs, gates which
/// toggle requests are valid, and starts/stops the bridge. One client
/// handles one session at a time; the handle lives for the process and
/// is reset between sessions, never destroyed.
pub struct VpnClient {
    config: ClientConfig,
    dialer: Arc<dyn TransportDialer>,
    interface: Arc<dyn PacketInterface>,
    animation: Arc<dyn ConnectAnimation>,
    session: SessionHandle,
    status: StatusReporter,
    status_rx: Option<mpsc::UnboundedReceiver<StatusUpdate>>,
    bridge: Option<TunnelBridge>,
}

impl VpnClient {
    /// Create a client with the given configuration and collaborators.
    ///
    /// The configuration is validated up front; a missing or malformed
    /// server identity never reaches the dialer.
    pub fn new(
        config: ClientConfig,
        dialer: Arc<dyn TransportDialer>,
        interface: Arc<dyn PacketInterface>,
    ) -> Result<Self> {
        config.validate()?;
        let (status, status_rx) = StatusReporter::channel();
        Ok(Self {
            config,
            dialer,
            interface,
            animation: Arc::new(NoAnimation),
            session: SessionHandle::new(),
            status,
            status_rx: Some(status_rx),
            bridge: None,
        })
    }

    /// Take the receiving end of the status channel. The first caller
    /// becomes the status observer.
    pub fn take_status_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<StatusUpdate>> {
        self.status_rx.take()
    }

    /// Install the connect animation collaborator.
    pub fn set_animation(&mut self, animation: Arc<dyn ConnectAnimation>) {
        self.animation = animation;
    }

    /// A read-only view of the session handle for observers.
    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Current state/stage pairing.
    pub fn state(&self) -> (ConnectionState, ConnectionStage) {
        self.session.snapshot()
    }

    /// Whether a tunnel session is established.
    pub fn is_connected(&self) -> bool {
        self.session.is_tunnel_active()
    }

    /// The address granted for the current session, if one has arrived.
    pub fn address_assignment(&self) -> Option<AddressAssignment> {
        self.bridge.as_ref().and_then(|b| b.address_assignment())
    }

    /// Handle a connect/disconnect toggle request.
    ///
    /// Inspects the current state/stage pairing and dispatches to
    /// `connect` or `disconnect`. Illegal pairings are reported as
    /// internal consistency errors and mutate nothing.
    pub async fn request_toggle(&mut self) -> Result<()> {
        let (state, stage) = self.session.snapshot();
        match (state, stage) {
            (ConnectionState::Idle, ConnectionStage::Start) => self.connect().await,
            (ConnectionState::Idle, stage) => self.reject_toggle(state, stage),
            (ConnectionState::Trying, ConnectionStage::Start) => self.reject_toggle(state, stage),
            (ConnectionState::Trying, _) => self.disconnect().await,
            (ConnectionState::Connected, _) => self.disconnect().await,
            (ConnectionState::Failed, _) => self.connect().await,
        }
    }

    fn reject_toggle(&self, state: ConnectionState, stage: ConnectionStage) -> Result<()> {
        error!(%state, %stage, "illegal state/stage pairing, toggle ignored");
        Err(Error::internal(format!(
            "toggle requested in {state}/{stage}"
        )))
    }

    /// Open the transport connection and start the bridge.
    ///
    /// On failure the attempt is terminal: the session lands in
    /// `(Failed, Start)` and a new connect must be requested explicitly.
    pub async fn connect(&mut self) -> Result<()> {
        // A leftover bridge from an earlier session holds no live pumps,
        // but its transport still needs closing.
        if let Some(mut stale) = self.bridge.take() {
            stale.shutdown().await;
        }

        info!(server = %self.config.host, port = self.config.port, "starting tunnel session");
        self.session
            .set(ConnectionState::Trying, ConnectionStage::DispatcherStarting);
        self.push_status();
        self.animation.start();

        let endpoint = match self.config.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!(error = %e, "configuration rejected");
                self.fail_attempt();
                return Err(e);
            }
        };

        self.session
            .set(ConnectionState::Trying, ConnectionStage::ManagementHandshake);
        self.push_status();

        let transport = match self.dialer.open(&endpoint).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, "transport open failed");
                self.fail_attempt();
                return Err(e);
            }
        };

        self.session
            .set(ConnectionState::Connected, ConnectionStage::StatusPolling);
        let mut bridge = TunnelBridge::start(transport, self.interface.clone(), self.session.clone());
        if let Some(closed) = bridge.closed_signal() {
            tokio::spawn(watch_remote_close(
                closed,
                self.session.clone(),
                self.status.clone(),
            ));
        }
        self.bridge = Some(bridge);
        self.push_status();
        self.animation.stop();

        info!("tunnel session established");
        Ok(())
    }

    /// Tear the session down. Best-effort: transport errors never block
    /// a disconnect, and the handle always returns to `(Idle, Start)`.
    pub async fn disconnect(&mut self) -> Result<()> {
        info!("stopping tunnel session");
        if let Some(mut bridge) = self.bridge.take() {
            bridge.shutdown().await;
        }
        self.session.reset();
        self.push_status();
        self.animation.stop();
        Ok(())
    }

    fn fail_attempt(&mut self) {
        self.session
            .set(ConnectionState::Failed, ConnectionStage::Start);
        self.push_status();
        self.animation.stop();
    }

    fn push_status(&self) {
        let (state, _) = self.session.snapshot();
        self.status
            .update(state.reports_connected(), self.session.description());
    }
}

/// Resets the session when the far end closes the transport, so the
/// status label never goes stale and the toggle stays usable.
async fn watch_remote_close(
    closed: oneshot::Receiver<()>,
    session: SessionHandle,
    status: StatusReporter,
) {
    if closed.await.is_err() {
        // Bridge dropped without a remote close; nothing to report.
        return;
    }
    if session.snapshot().0 == ConnectionState::Connected {
        info!("transport closed by remote, resetting session");
        session.reset();
        let (state, _) = session.snapshot();
        status.update(state.reports_connected(), session.description());
    }
}
