//! Shared integration-test scaffolding, grounded in
//! `AndrewAltimit-breakpoint`'s `tests/common/mod.rs`: a `TestServer` that
//! binds an ephemeral port, spawns the real router, and exposes its base
//! URL, plus small helpers for driving a simulated unit over a WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use gamemaster::clock::FakeClock;
use gamemaster::election::{Election, ElectionConfig};
use gamemaster::engine::{Durations, EngineEvent, GameEngine};
use gamemaster::transport::{self, PeerTransportState, UnitTransportState};
use protocol::ActuatorCommand;

/// A running unit-facing transport plus the Engine it feeds, all on an
/// ephemeral port, torn down when dropped.
pub struct UnitTestServer {
    pub addr: SocketAddr,
    _engine_task: tokio::task::JoinHandle<()>,
    _listener_task: tokio::task::JoinHandle<()>,
}

impl UnitTestServer {
    /// Spawns a Game Engine over a `FakeClock` plus its unit-facing router,
    /// on an ephemeral port. Uses the production (unscaled) `Durations` so
    /// the attract-mode loop's periodic ticks never race a test's own
    /// wire-level assertions; tests that need a timer to actually fire
    /// drive the Engine directly instead (see `engine::tests`).
    pub async fn start() -> (Self, Arc<FakeClock>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let clock = FakeClock::new();
        let engine = GameEngine::new(clock.clone(), Durations::default(), events_tx.clone());
        let engine_task = tokio::spawn(engine.run(events_rx));

        let state = UnitTransportState { events: events_tx };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = transport::unit_router(state);
        let listener_task = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;

        (
            Self {
                addr,
                _engine_task: engine_task,
                _listener_task: listener_task,
            },
            clock,
        )
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

/// A running peer-facing transport wrapping a caller-supplied `Election`.
pub struct PeerTestServer {
    pub addr: SocketAddr,
    _listener_task: tokio::task::JoinHandle<()>,
}

impl PeerTestServer {
    pub async fn start(election: Election) -> Self {
        let state = PeerTransportState {
            election: Arc::new(Mutex::new(election)),
            known_active: Arc::new(Mutex::new(String::new())),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = transport::peer_router(state);
        let listener_task = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        Self {
            addr,
            _listener_task: listener_task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub fn test_election_config(url: &str, priority: i64, peer_urls: Vec<String>) -> ElectionConfig {
    ElectionConfig {
        url: url.to_string(),
        priority,
        peer_urls,
        peer_port: 8002,
    }
}

pub type UnitWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects a simulated unit and sends its `REGISTER` frame.
pub async fn connect_and_register(url: &str, unit_id: u64) -> UnitWsStream {
    let (mut stream, _response) = tokio_tungstenite::connect_async(url).await.unwrap();
    let register = serde_json::json!({"type": "REGISTER", "id": format!("{unit_id:#x}")});
    stream
        .send(Message::Text(register.to_string().into()))
        .await
        .unwrap();
    stream
}

pub async fn press(stream: &mut UnitWsStream) {
    send_event(stream, "BUTTON_PRESSED").await;
}

pub async fn release(stream: &mut UnitWsStream) {
    send_event(stream, "BUTTON_RELEASED").await;
}

async fn send_event(stream: &mut UnitWsStream, kind: &str) {
    let frame = serde_json::json!({"type": kind});
    stream
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Reads the next actuator command addressed to this unit (5s timeout).
pub async fn read_command(stream: &mut UnitWsStream) -> ActuatorCommand {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).expect("valid actuator command JSON");
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(other)) => panic!("unexpected frame: {other:?}"),
                Some(Err(err)) => panic!("websocket error: {err}"),
                None => panic!("stream ended before a command arrived"),
            }
        }
    })
    .await
    .expect("timed out waiting for an actuator command")
}
