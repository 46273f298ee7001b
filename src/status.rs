//! Status notifications shared by the lifecycle machine and the bridge.

use tokio::sync::mpsc;
use tracing::trace;

/// One user-visible status report. Last writer wins; no history is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub connected: bool,
    pub description: String,
}

/// Single sink for status reports.
///
/// Clones share one channel, so reports from the lifecycle machine and
/// from the bridge teardown path all reach the consumer on a single
/// serialized context and cannot interleave into a torn label.
#[derive(Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl StatusReporter {
    /// Create a reporter and the receiving end for the status observer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a status change. Delivery is best-effort; a departed
    /// observer never blocks the core.
    pub fn update(&self, connected: bool, description: impl Into<String>) {
        let description = description.into();
        trace!(connected, %description, "status update");
        let _ = self.tx.send(StatusUpdate {
            connected,
            description,
        });
    }
}

/// Background visual feedback run while a connect attempt is in flight.
/// Rendering lives in the front-end; the core only starts and stops it.
pub trait ConnectAnimation: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Animation collaborator that does nothing.
#[derive(Debug, Default)]
pub struct NoAnimation;

impl ConnectAnimation for NoAnimation {
    fn start(&self) {}
    fn stop(&self) {}
}
