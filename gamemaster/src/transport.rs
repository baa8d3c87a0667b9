//! The combined HTTP / WebSocket transport layer (spec.md §4.4): accepts
//! unit connections on the unit port (active role only) and serves peer
//! probes / peer `GM_FAIL` notifications on the peer port.
//!
//! Grounded in `relay-server::main`'s single-`axum::Router`-multiple-routes
//! layout: one router per port, state shared through `Arc`, a WebSocket
//! upgrade route plus plain HTTP routes living side by side. An incoming
//! connection with `Upgrade: websocket` is dispatched to the unit-session
//! handler; any other path on the peer port is dispatched to the election
//! endpoints — axum's router already does this path-based dispatch for us,
//! so there is no need to hand-inspect headers the way spec.md §4.4
//! describes for a from-scratch implementation.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::election::Election;
use crate::engine::{EngineEvent, UnitHandle};
use crate::unit_session;

/// Shared state for the unit-facing router: only the Engine's event
/// channel, since unit session state itself lives in the Engine.
#[derive(Clone)]
pub struct UnitTransportState {
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

/// Builds the unit-facing router (spec.md §4.4 port 8001, active role
/// only). A fresh TCP listener is bound for every term the process becomes
/// active, and dropped (closing all unit connections) when it yields.
pub fn unit_router(state: UnitTransportState) -> Router {
    Router::new()
        .route("/", get(unit_ws_handler))
        .with_state(state)
}

async fn unit_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<UnitTransportState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_unit_socket(socket, state))
}

/// Services one unit's connection end to end: waits for the initial
/// `REGISTER`, wires up its session (sender + pinger + receiver tasks),
/// and on any termination path sends exactly one `Unregister` to the
/// Engine (spec.md §4.1 "Failure").
async fn handle_unit_socket(socket: WebSocket, state: UnitTransportState) {
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));

    let uid = match await_register(&mut stream).await {
        Some(uid) => uid,
        None => return,
    };

    info!(unit = format_args!("{uid:#x}"), "unit connected and registered");

    let (handle, outbound_rx, latency) = unit_session::new_session(uid);
    if state.events.send(EngineEvent::Register { uid, handle }).is_err() {
        warn!("engine event channel closed, dropping unit connection");
        return;
    }

    let sender_task = tokio::spawn(unit_session::run_sender(sink.clone(), outbound_rx));
    let ping_sent_at = Arc::new(Mutex::new(None));
    let pinger_task = tokio::spawn(unit_session::run_pinger(sink.clone(), ping_sent_at.clone()));

    let receive_result = unit_session::run_receiver(
        stream,
        uid,
        state.events.clone(),
        latency,
        ping_sent_at,
    )
    .await;

    pinger_task.abort();
    sender_task.abort();

    if let Err(err) = receive_result {
        warn!(unit = format_args!("{uid:#x}"), %err, "unit connection ended with a protocol error");
    }
    // Every termination path (clean UNREGISTER already sent one, or a
    // transport error here) must still guarantee exactly one Unregister:
    // the Engine's `on_unregister` is idempotent against an unknown uid via
    // its `active.remove` no-op, so sending a second one is harmless.
    let _ = state.events.send(EngineEvent::Unregister { uid });
}

/// Blocks on inbound frames until a `REGISTER` message is seen (or the
/// connection ends first), parsing its hex unit id per spec.md §6.
async fn await_register(
    stream: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Option<u64> {
    while let Some(frame) = stream.next().await {
        let Ok(Message::Text(text)) = frame else {
            continue;
        };
        let Ok(protocol::UnitMessage::Register { id }) = serde_json::from_str(&text) else {
            continue;
        };
        match protocol::unit::parse_unit_id(&id) {
            Ok(uid) => return Some(uid),
            Err(err) => {
                warn!(id, %err, "malformed REGISTER unit id");
                return None;
            }
        }
    }
    None
}

/// Shared state for the peer-facing router: the election FSM plus the
/// event channel peers use to signal `GM_FAIL` back into it.
#[derive(Clone)]
pub struct PeerTransportState {
    pub election: Arc<Mutex<Election>>,
    pub known_active: Arc<Mutex<String>>,
}

/// Builds the peer-facing router (spec.md §4.4 port 8002): the three
/// election HTTP endpoints plus a WebSocket route for the `GM_FAIL`
/// notification channel. Unmatched paths fall through to axum's default
/// 404, satisfying spec.md's "non-matching paths return 404".
pub fn peer_router(state: PeerTransportState) -> Router {
    Router::new()
        .route("/gamemaster", get(gamemaster_handler))
        .route("/request_gamemaster", get(request_gamemaster_handler))
        .route("/alive", get(alive_handler))
        .route("/", get(peer_notification_handler))
        .with_state(state)
}

async fn gamemaster_handler(State(state): State<PeerTransportState>) -> impl IntoResponse {
    let election = state.election.lock().await;
    let (status, body) = election.handle_gamemaster_probe();
    (status, body)
}

async fn request_gamemaster_handler(State(state): State<PeerTransportState>) -> impl IntoResponse {
    let election = state.election.lock().await;
    let status = election.handle_request_gamemaster();
    let body = format!("{}\n", election.priority());
    (status, body)
}

async fn alive_handler(State(state): State<PeerTransportState>) -> impl IntoResponse {
    let election = state.election.lock().await;
    let known_active = state.known_active.lock().await;
    let (status, body) = election.handle_alive(&known_active);
    (status, body)
}

async fn peer_notification_handler(
    ws: WebSocketUpgrade,
    State(state): State<PeerTransportState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_peer_notification(socket, state))
}

/// Reads exactly one `PeerMessage` frame and, if it's `GM_FAIL`, forwards
/// it to the election FSM. Matches the original's bare receive-one-frame
/// handler at the peer notification socket.
async fn handle_peer_notification(socket: WebSocket, state: PeerTransportState) {
    let (_sink, mut stream) = socket.split();
    while let Some(frame) = stream.next().await {
        let Ok(Message::Text(text)) = frame else {
            continue;
        };
        if let Ok(protocol::PeerMessage::GmFail) = serde_json::from_str(&text) {
            state.election.lock().await.on_gm_fail_notification();
            return;
        }
    }
}
