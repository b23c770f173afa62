//! Per-session pumps between the hub and one WebSocket.
//!
//! The outbound pump is the sole reader of the session's buffer; the
//! inbound pump enforces liveness and protocol limits. Either pump
//! exiting tears the session down; unregistration is idempotent so the
//! paths may overlap.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use beacon_core::{Scope, SessionId};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use beacon_hub::{Hub, Session};

/// Interval between keepalive probes when no message is pending.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Deadline applied to every write attempt.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Deadline for the next inbound frame, refreshed on every frame
/// (keepalive acknowledgments included).
const READ_DEADLINE: Duration = Duration::from_secs(60);
/// Maximum accepted inbound frame size, in bytes.
const MAX_INBOUND_BYTES: usize = 512;

/// Drive one upgraded socket for its whole lifetime: register with the
/// hub, run both pumps, and unregister when either side finishes.
pub async fn serve(socket: WebSocket, scope: Scope, topic: String, hub: Hub) {
    let (session, outbound_rx) = Session::new(scope, topic);
    let id = session.id.clone();
    let shutdown = session.shutdown_signal();
    info!(session_id = %id, scope = %session.scope, topic = %session.topic, "session connected");
    hub.register(session).await;

    let (ws_tx, ws_rx) = socket.split();
    let mut outbound = tokio::spawn(outbound_pump(ws_tx, outbound_rx, shutdown, id.clone()));
    let mut inbound = tokio::spawn(inbound_pump(ws_rx, hub.clone(), id.clone()));

    tokio::select! {
        _ = &mut outbound => {}
        _ = &mut inbound => {}
    }

    hub.unregister(&id).await;
    outbound.abort();
    inbound.abort();
    info!(session_id = %id, "session closed");
}

/// Drain the outbound buffer onto the wire, batching already-queued
/// messages into the frame being written, and probe the peer on a fixed
/// interval. Exits on buffer close, write error, or write deadline.
async fn outbound_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
    id: SessionId,
) {
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = timeout(WRITE_DEADLINE, ws_tx.send(Message::Close(None))).await;
                break;
            }
            maybe = rx.recv() => {
                let Some(first) = maybe else {
                    let _ = timeout(WRITE_DEADLINE, ws_tx.send(Message::Close(None))).await;
                    break;
                };
                let frame = coalesce(first, &mut rx);
                match timeout(WRITE_DEADLINE, ws_tx.send(Message::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(session_id = %id, error = %e, "write failed");
                        break;
                    }
                    Err(_) => {
                        debug!(session_id = %id, "write deadline exceeded");
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                match timeout(WRITE_DEADLINE, ws_tx.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }

    let _ = ws_tx.close().await;
}

/// Merge messages already queued when the flush starts into one frame,
/// preserving their enqueue order. The drain is bounded by the queue
/// depth at entry; arrivals during the drain wait for the next frame.
fn coalesce(first: Bytes, rx: &mut mpsc::Receiver<Bytes>) -> String {
    let mut buf = first.to_vec();
    for _ in 0..rx.len() {
        let Ok(next) = rx.try_recv() else { break };
        buf.push(b'\n');
        buf.extend_from_slice(&next);
    }
    // Payloads are validated JSON upstream, so this is already UTF-8.
    String::from_utf8_lossy(&buf).into_owned()
}

/// Consume inbound frames as liveness signals only. Oversized frames,
/// read errors, and deadline expiry all terminate the session.
async fn inbound_pump(mut ws_rx: SplitStream<WebSocket>, hub: Hub, id: SessionId) {
    loop {
        match timeout(READ_DEADLINE, ws_rx.next()).await {
            Err(_) => {
                debug!(session_id = %id, "read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!(session_id = %id, error = %e, "websocket read error");
                break;
            }
            Ok(Some(Ok(msg))) => match msg {
                Message::Text(text) if text.len() > MAX_INBOUND_BYTES => {
                    warn!(session_id = %id, len = text.len(), "oversized inbound frame");
                    break;
                }
                Message::Binary(data) if data.len() > MAX_INBOUND_BYTES => {
                    warn!(session_id = %id, len = data.len(), "oversized inbound frame");
                    break;
                }
                Message::Close(_) => {
                    debug!(session_id = %id, "peer closed");
                    break;
                }
                // Pings are answered by the protocol layer; pongs and
                // in-limit payloads only refresh the read deadline.
                _ => {}
            },
        }
    }

    hub.unregister(&id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_preserves_order_and_separates_messages() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.try_send(Bytes::from_static(b"{\"n\":2}")).unwrap();
        tx.try_send(Bytes::from_static(b"{\"n\":3}")).unwrap();

        let frame = coalesce(Bytes::from_static(b"{\"n\":1}"), &mut rx);
        assert_eq!(frame, "{\"n\":1}\n{\"n\":2}\n{\"n\":3}");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn coalesce_drain_is_bounded_by_queue_depth_at_entry() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.try_send(Bytes::from_static(b"{\"n\":2}")).unwrap();

        let frame = coalesce(Bytes::from_static(b"{\"n\":1}"), &mut rx);
        assert_eq!(frame, "{\"n\":1}\n{\"n\":2}");

        // A message enqueued after the flush began belongs to the next
        // frame, not this one.
        tx.try_send(Bytes::from_static(b"{\"n\":3}")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"{\"n\":3}"));
    }

    #[test]
    fn coalesce_single_message_has_no_separator() {
        let (_tx, mut rx) = mpsc::channel::<Bytes>(1);
        let frame = coalesce(Bytes::from_static(b"{\"n\":1}"), &mut rx);
        assert_eq!(frame, "{\"n\":1}");
    }

}
