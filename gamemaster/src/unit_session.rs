//! One connected unit's session: a FIFO outbound sender plus a latency
//! sampler, generalizing Carbonfreezer's `Unit` (queue + `_send` task)
//! shape to the JSON-framed protocol and an explicit ping/pong RTT
//! estimate instead of a transport-level latency field.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::ActuatorCommand;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::engine::{EngineEvent, UnitHandle};

const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Builds the outbound channel and shared latency cell for a freshly
/// registered unit, returning the Engine-facing [`UnitHandle`] and the
/// receiver the session's sender task drains.
pub fn new_session(id: u64) -> (UnitHandle, mpsc::UnboundedReceiver<ActuatorCommand>, Arc<AtomicU64>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let latency = Arc::new(AtomicU64::new(0));
    (UnitHandle::new(id, tx, latency.clone()), rx, latency)
}

/// Drains `outbound` and writes each command as one JSON text frame.
/// Runs until the channel closes (the Engine dropped the handle) or the
/// socket write fails.
pub async fn run_sender(
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    mut outbound: mpsc::UnboundedReceiver<ActuatorCommand>,
) {
    while let Some(command) = outbound.recv().await {
        let text = match serde_json::to_string(&command) {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "failed to encode outbound actuator command");
                continue;
            }
        };
        let mut sink = sink.lock().await;
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
}

/// Sends a `Ping` every [`PING_INTERVAL`], recording the send instant in
/// `ping_sent_at` immediately beforehand so `run_receiver`'s `Pong` handler
/// can halve the round trip into a one-way latency estimate.
pub async fn run_pinger(
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    ping_sent_at: Arc<Mutex<Option<std::time::Instant>>>,
) {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    loop {
        ticker.tick().await;
        let now = std::time::Instant::now();
        let nonce = now.elapsed().as_nanos() as u64;
        *ping_sent_at.lock().await = Some(now);
        let mut sink = sink.lock().await;
        if sink
            .send(Message::Ping(Bytes::copy_from_slice(&nonce.to_be_bytes())))
            .await
            .is_err()
        {
            return;
        }
    }
}

/// Parses inbound frames into [`EngineEvent`]s and forwards them, and
/// updates `latency` on every `Pong`. Returns when the connection ends
/// (cleanly, or on a protocol error, which the caller turns into a
/// close frame with code 1002).
pub async fn run_receiver(
    mut stream: SplitStream<WebSocket>,
    uid: u64,
    events: mpsc::UnboundedSender<EngineEvent>,
    latency: Arc<AtomicU64>,
    ping_sent_at: Arc<Mutex<Option<std::time::Instant>>>,
) -> Result<(), crate::error::TransportError> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|_| crate::error::TransportError::ConnectionLost)?;
        match frame {
            Message::Text(text) => {
                let message: protocol::UnitMessage = serde_json::from_str(&text)
                    .map_err(|_| crate::error::TransportError::InvalidJson)?;
                match message {
                    protocol::UnitMessage::Register { .. } => {
                        // Re-registration mid-session is handled by the
                        // transport layer's outer loop, not here.
                    }
                    protocol::UnitMessage::ButtonPressed => {
                        let _ = events.send(EngineEvent::Press { uid });
                    }
                    protocol::UnitMessage::ButtonReleased => {
                        let _ = events.send(EngineEvent::Release { uid });
                    }
                    protocol::UnitMessage::Unregister => {
                        let _ = events.send(EngineEvent::Unregister { uid });
                        return Ok(());
                    }
                }
            }
            Message::Pong(payload) => {
                if let Some(sent_at) = *ping_sent_at.lock().await {
                    let rtt = sent_at.elapsed();
                    latency.store((rtt.as_micros() / 2) as u64, Ordering::Relaxed);
                }
                debug!(len = payload.len(), "pong received");
            }
            Message::Close(_) => return Ok(()),
            Message::Binary(_) => return Err(crate::error::TransportError::InvalidJson),
            Message::Ping(_) => {}
        }
    }
    Ok(())
}
