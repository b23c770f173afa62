use beacon_core::{Scope, SessionId};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of a session's outbound buffer, in messages.
pub const OUTBOUND_BUFFER: usize = 256;

/// State for one connected consumer.
///
/// The hub owns the `Session` exclusively while it is registered; the
/// outbound pump holds only the paired [`mpsc::Receiver`] and a clone of
/// the shutdown token. Scope and topic are fixed at creation — a session
/// wanting a different topic must disconnect and reconnect.
pub struct Session {
    pub id: SessionId,
    pub scope: Scope,
    pub topic: String,
    /// Producer side of the bounded outbound buffer. Fan-out enqueues
    /// non-blockingly; only the session's own pump drains it.
    pub(crate) outbound: mpsc::Sender<Bytes>,
    /// Cancelled by the hub on unregistration to tell the pump to flush
    /// a close notification and exit.
    pub(crate) shutdown: CancellationToken,
}

impl Session {
    /// Create a session and the receiving half of its outbound buffer.
    pub fn new(scope: Scope, topic: impl Into<String>) -> (Self, mpsc::Receiver<Bytes>) {
        Self::with_capacity(scope, topic, OUTBOUND_BUFFER)
    }

    /// Like [`Session::new`] with an explicit buffer capacity.
    pub fn with_capacity(
        scope: Scope,
        topic: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let session = Self {
            id: SessionId::new(),
            scope,
            topic: topic.into(),
            outbound: tx,
            shutdown: CancellationToken::new(),
        };
        (session, rx)
    }

    /// Clone of the shutdown token, for the pumps to select on.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
