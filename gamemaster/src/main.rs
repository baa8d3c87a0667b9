use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gamemaster::clock::SystemClock;
use gamemaster::election::{Election, ElectionConfig};
use gamemaster::engine::{Durations, GameEngine};
use gamemaster::transport::{self, PeerTransportState, UnitTransportState};

/// CLI surface (spec.md §6): the whole of the coordinator's configuration.
/// TLS paths are accepted and stored but never opened — TLS material
/// loading is an explicit Non-goal (spec.md §1).
#[derive(Parser, Debug)]
#[command(name = "gamemaster", about = "Button-unit game coordinator")]
struct Args {
    /// This coordinator's own URL/hostname, as the peer set knows it.
    #[arg(short = 'u', long)]
    url: String,

    /// Election priority; lower wins. Must be unique across the cluster.
    #[arg(short = 'p', long)]
    priority: i64,

    /// Full peer set, including self. Repeatable.
    #[arg(short = 'g', long = "gamemaster-urls", required = true)]
    gamemaster_urls: Vec<String>,

    /// TLS private key path. Accepted and ignored (Non-goal).
    #[arg(short = 'k', long)]
    key: String,

    /// TLS certificate path. Accepted and ignored (Non-goal).
    #[arg(short = 'r', long = "certificate")]
    certificate: String,

    /// TLS CA certificate path. Accepted and ignored (Non-goal).
    #[arg(long = "ca-certificate", visible_alias = "ca")]
    ca_certificate: String,

    /// Peer HTTP / notification port.
    #[arg(long, default_value_t = protocol::DEFAULT_PEER_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let args = Args::parse();
    tracing::info!(
        key = args.key,
        certificate = args.certificate,
        ca_certificate = args.ca_certificate,
        "TLS material paths accepted and ignored (Non-goal per spec)"
    );

    let election = Arc::new(Mutex::new(Election::new(ElectionConfig {
        url: args.url.clone(),
        priority: args.priority,
        peer_urls: args.gamemaster_urls.clone(),
        peer_port: args.port,
    })));
    let known_active = Arc::new(Mutex::new(args.url.clone()));

    let peer_state = PeerTransportState {
        election: election.clone(),
        known_active: known_active.clone(),
    };
    let peer_listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    let peer_router = transport::peer_router(peer_state);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(peer_listener, peer_router).await {
            tracing::error!(%err, "peer transport exited with an error");
        }
    });
    tracing::info!(port = args.port, "peer transport listening");

    run_coordinator_loop(election, known_active, args.url).await;
    Ok(())
}

/// Owns the supervisor loop: steps the election FSM, and starts/stops the
/// Game Engine plus the unit-facing listener in step with whether we are
/// currently the active coordinator (spec.md §2: "The Game Engine runs
/// only when the local process is the active coordinator").
async fn run_coordinator_loop(
    election: Arc<Mutex<Election>>,
    known_active: Arc<Mutex<String>>,
    own_url: String,
) {
    let mut active_run: Option<ActiveRun> = None;

    loop {
        let (sleep_for, is_active, discovered_peer) = {
            let mut election = election.lock().await;
            let sleep_for = election.step().await;
            let discovered_peer = election.known_active_peer().map(str::to_string);
            (sleep_for, election.is_active(), discovered_peer)
        };

        match (is_active, &active_run) {
            (true, None) => {
                tracing::info!("became active, starting Game Engine and unit transport");
                *known_active.lock().await = own_url.clone();
                active_run = Some(start_active_run().await);
            }
            (false, Some(_)) => {
                tracing::info!("no longer active, tearing down Game Engine and unit transport");
                if let Some(run) = active_run.take() {
                    run.shutdown();
                }
            }
            (false, None) => {
                if let Some(peer) = discovered_peer {
                    *known_active.lock().await = peer;
                }
            }
            _ => {}
        }

        tokio::time::sleep(sleep_for).await;
    }
}

/// The Engine task and unit-port listener task, torn down together when
/// the local coordinator yields the active role.
struct ActiveRun {
    engine_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
}

impl ActiveRun {
    fn shutdown(self) {
        self.engine_task.abort();
        self.listener_task.abort();
    }
}

async fn start_active_run() -> ActiveRun {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let clock = Arc::new(SystemClock);
    let game_engine = GameEngine::new(clock, Durations::default(), events_tx.clone());
    let engine_task = tokio::spawn(game_engine.run(events_rx));

    let unit_state = UnitTransportState { events: events_tx };
    let listener_task = tokio::spawn(async move {
        match tokio::net::TcpListener::bind(("0.0.0.0", protocol::UNIT_PORT)).await {
            Ok(listener) => {
                tracing::info!(port = protocol::UNIT_PORT, "unit transport listening");
                if let Err(err) = axum::serve(listener, transport::unit_router(unit_state)).await {
                    tracing::error!(%err, "unit transport exited with an error");
                }
            }
            Err(err) => {
                tracing::error!(%err, "failed to bind unit transport port");
            }
        }
    });

    ActiveRun {
        engine_task,
        listener_task,
    }
}
