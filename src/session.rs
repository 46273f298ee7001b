//! Connection lifecycle state model and status phrases.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Idle,
    /// A connect attempt is in flight.
    Trying,
    /// Tunnel session established.
    Connected,
    /// The last connect attempt failed.
    Failed,
}

impl ConnectionState {
    /// Whether the status channel reports this state with the connected
    /// flag set. A connect attempt in flight already shows as connected
    /// so the toggle control reads "Disconnect".
    pub fn reports_connected(&self) -> bool {
        matches!(self, ConnectionState::Trying | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Trying => write!(f, "Trying"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Where within a state the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStage {
    /// Initial stage; also the terminal stage of a failed attempt.
    Start,
    /// Background dispatcher is being started.
    DispatcherStarting,
    /// Handshaking with the management server.
    ManagementHandshake,
    /// Polling session status.
    StatusPolling,
}

impl fmt::Display for ConnectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStage::Start => write!(f, "Start"),
            ConnectionStage::DispatcherStarting => write!(f, "Dispatcher Starting"),
            ConnectionStage::ManagementHandshake => write!(f, "Management Handshake"),
            ConnectionStage::StatusPolling => write!(f, "Status Polling"),
        }
    }
}

/// Phrase shown for state/stage pairings that should never occur.
pub const STATUS_INTERNAL_ERROR: &str = "Internal Status Error";

/// Total mapping from every state/stage pairing to a user-visible phrase.
///
/// `(Trying, Start)` and `(Connected, Start)` are unreachable pairings
/// and map to [`STATUS_INTERNAL_ERROR`] rather than being omitted.
/// `(Failed, Start)` is the terminal state of a failed connect attempt
/// and carries the connect-failure phrase.
pub fn status_description(state: ConnectionState, stage: ConnectionStage) -> &'static str {
    use ConnectionStage::*;
    use ConnectionState::*;

    match (state, stage) {
        (Idle, Start) => "Not Connected",
        (Idle, _) => STATUS_INTERNAL_ERROR,
        (Trying, Start) => STATUS_INTERNAL_ERROR,
        (Trying, DispatcherStarting) => "Starting Dispatcher",
        (Trying, ManagementHandshake) => "Connecting to the Management Server",
        (Trying, StatusPolling) => "Getting VPN Status",
        (Connected, Start) => STATUS_INTERNAL_ERROR,
        (Connected, DispatcherStarting) => "Started Dispatcher",
        (Connected, ManagementHandshake) => "Connected to the Management Server",
        (Connected, StatusPolling) => "Connected",
        (Failed, Start) | (Failed, StatusPolling) => "Failed to connect to VPN",
        (Failed, DispatcherStarting) => "Failed to start Dispatcher",
        (Failed, ManagementHandshake) => "Failed to Connect to the Management Server",
    }
}

/// Shared handle over the session's state/stage pairing.
///
/// Mutated by the lifecycle machine; read by the bridge pumps (stop
/// check) and by status reporting. All access goes through one mutex.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionInner>>,
}

struct SessionInner {
    state: ConnectionState,
    stage: ConnectionStage,
}

impl SessionHandle {
    /// Create a handle in `(Idle, Start)`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                state: ConnectionState::Idle,
                stage: ConnectionStage::Start,
            })),
        }
    }

    /// Current state/stage pairing.
    pub fn snapshot(&self) -> (ConnectionState, ConnectionStage) {
        let guard = self.inner.lock().unwrap();
        (guard.state, guard.stage)
    }

    /// Move to a new state/stage pairing. Intended for the lifecycle
    /// machine; other holders of the handle are readers.
    pub fn set(&self, state: ConnectionState, stage: ConnectionStage) {
        let mut guard = self.inner.lock().unwrap();
        debug!(
            "session: {:?}/{:?} -> {:?}/{:?}",
            guard.state, guard.stage, state, stage
        );
        guard.state = state;
        guard.stage = stage;
    }

    /// Return to `(Idle, Start)`.
    pub fn reset(&self) {
        self.set(ConnectionState::Idle, ConnectionStage::Start);
    }

    /// Whether a tunnel session is established. The pumps use this as
    /// their keep-running check.
    pub fn is_tunnel_active(&self) -> bool {
        self.snapshot().0 == ConnectionState::Connected
    }

    /// User-visible phrase for the current pairing.
    pub fn description(&self) -> &'static str {
        let (state, stage) = self.snapshot();
        status_description(state, stage)
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}
