use std::collections::HashMap;
use std::time::Duration;

use beacon_core::{Scope, SessionId};
use bytes::Bytes;
use metrics::counter;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::session::Session;

/// How long the evictor keeps retrying a congested delivery before the
/// session is force-unregistered.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Capacity of the hub's command channel.
const COMMAND_QUEUE: usize = 1024;

enum Command {
    Register(Session),
    Unregister(SessionId),
    Publish {
        scope: Scope,
        topic: String,
        payload: Bytes,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    HasSubscribers {
        scope: Scope,
        topic: String,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to the broker control loop.
///
/// Cloneable and cheap to share; every method enqueues a command for the
/// single owner task, which serializes all registry mutation and fan-out
/// snapshots. None of the operations here can fail from the caller's
/// point of view — a request to a hub that has already shut down is
/// silently dropped.
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::Sender<Command>,
}

impl Hub {
    /// Spawn the control loop and return a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let weak = tx.downgrade();
        let _ = tokio::spawn(run(rx, weak));
        Self { tx }
    }

    /// Insert a session into the registry. Always succeeds; the session
    /// is observable in subsequent fan-out once this command is
    /// processed, which is ordered before any later `publish`.
    pub async fn register(&self, session: Session) {
        let _ = self.tx.send(Command::Register(session)).await;
    }

    /// Remove a session if present, closing its outbound buffer.
    /// Idempotent: unregistering an absent session is a no-op.
    pub async fn unregister(&self, id: &SessionId) {
        let _ = self.tx.send(Command::Unregister(id.clone())).await;
    }

    /// Fan a payload out to every session registered under
    /// `(scope, topic)`. A topic with no subscribers is not an error.
    pub async fn publish(&self, scope: Scope, topic: &str, payload: Bytes) {
        let _ = self
            .tx
            .send(Command::Publish {
                scope,
                topic: topic.to_owned(),
                payload,
            })
            .await;
    }

    /// Number of currently registered sessions across all scopes.
    pub async fn session_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Count { reply }).await;
        rx.await.unwrap_or(0)
    }

    /// Whether a `(scope, topic)` set currently has any members. Empty
    /// sets are pruned eagerly, so this is equivalent to "the topic
    /// entry exists".
    pub async fn has_subscribers(&self, scope: Scope, topic: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::HasSubscribers {
                scope,
                topic: topic.to_owned(),
                reply,
            })
            .await;
        rx.await.unwrap_or(false)
    }

    /// Unregister every session and stop the control loop. Resolves
    /// once the loop has released every session, so callers may exit
    /// immediately afterwards.
    pub async fn shutdown(&self) {
        let (done, ack) = oneshot::channel();
        let _ = self.tx.send(Command::Shutdown { done }).await;
        let _ = ack.await;
    }
}

type TopicKey = (Scope, String);

#[derive(Default)]
struct Registry {
    /// `(scope, topic)` → session set. Invariant: an entry exists iff
    /// its set is non-empty.
    topics: HashMap<TopicKey, HashMap<SessionId, Session>>,
    /// Reverse index so unregistration does not scan every topic.
    index: HashMap<SessionId, TopicKey>,
}

impl Registry {
    fn register(&mut self, session: Session) {
        let key = (session.scope, session.topic.clone());
        debug!(session_id = %session.id, scope = %key.0, topic = %key.1, "session registered");
        let _ = self.index.insert(session.id.clone(), key.clone());
        let _ = self
            .topics
            .entry(key)
            .or_default()
            .insert(session.id.clone(), session);
    }

    fn unregister(&mut self, id: &SessionId) {
        let Some(key) = self.index.remove(id) else {
            return;
        };
        if let Some(set) = self.topics.get_mut(&key) {
            if let Some(session) = set.remove(id) {
                session.shutdown.cancel();
                debug!(session_id = %id, scope = %key.0, topic = %key.1, "session unregistered");
            }
            if set.is_empty() {
                let _ = self.topics.remove(&key);
            }
        }
    }
}

async fn run(mut rx: mpsc::Receiver<Command>, hub: mpsc::WeakSender<Command>) {
    let mut registry = Registry::default();
    let mut ack = None;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Register(session) => registry.register(session),
            Command::Unregister(id) => registry.unregister(&id),
            Command::Publish {
                scope,
                topic,
                payload,
            } => fan_out(&registry, &hub, scope, topic, &payload),
            Command::Count { reply } => {
                let _ = reply.send(registry.index.len());
            }
            Command::HasSubscribers {
                scope,
                topic,
                reply,
            } => {
                let _ = reply.send(registry.topics.contains_key(&(scope, topic)));
            }
            Command::Shutdown { done } => {
                ack = Some(done);
                break;
            }
        }
    }

    let ids: Vec<SessionId> = registry.index.keys().cloned().collect();
    for id in &ids {
        registry.unregister(id);
    }
    if let Some(done) = ack {
        let _ = done.send(());
    }
    info!(sessions = ids.len(), "hub stopped");
}

/// Snapshot the `(scope, topic)` set and attempt a non-blocking delivery
/// to each member. A full buffer hands that one session off to the
/// evictor and moves on immediately, so one congested consumer never
/// delays any other.
fn fan_out(
    registry: &Registry,
    hub: &mpsc::WeakSender<Command>,
    scope: Scope,
    topic: String,
    payload: &Bytes,
) {
    counter!("hub_publish_total").increment(1);
    let key = (scope, topic);
    let Some(set) = registry.topics.get(&key) else {
        debug!(scope = %key.0, topic = %key.1, "publish to topic with no subscribers");
        return;
    };
    for session in set.values() {
        match session.outbound.try_send(payload.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(payload)) => {
                counter!("hub_delivery_full_total").increment(1);
                let _ = tokio::spawn(evict_after_grace(
                    hub.clone(),
                    session.id.clone(),
                    session.outbound.clone(),
                    payload,
                ));
            }
            Err(TrySendError::Closed(_)) => {
                // Pump already exited; the connection teardown path will
                // unregister this session.
            }
        }
    }
    debug!(scope = %key.0, topic = %key.1, recipients = set.len(), "fan-out");
}

/// Bounded-time retry for one congested delivery. Succeeds as soon as
/// the session's pump drains space; otherwise the session is
/// force-unregistered and its stream closed via the shutdown signal.
async fn evict_after_grace(
    hub: mpsc::WeakSender<Command>,
    id: SessionId,
    outbound: mpsc::Sender<Bytes>,
    payload: Bytes,
) {
    match tokio::time::timeout(GRACE_PERIOD, outbound.send(payload)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            // Buffer closed while we waited; session is already gone.
        }
        Err(_) => {
            counter!("hub_evictions_total").increment(1);
            warn!(session_id = %id, "disconnecting slow consumer");
            if let Some(tx) = hub.upgrade() {
                let _ = tx.send(Command::Unregister(id)).await;
            }
        }
    }
}
