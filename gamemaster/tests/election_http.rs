//! Peer-facing election endpoints (spec.md §8 S6, §4.3) driven over real
//! HTTP and a real WebSocket against `peer_router`, in the shape of
//! `AndrewAltimit-breakpoint`'s HTTP integration tests.

mod common;

use futures_util::SinkExt;
use gamemaster::election::Election;
use protocol::PeerMessage;

use common::{test_election_config, PeerTestServer};

/// A lone coordinator (its own peer list contains only itself, so
/// `ElectionConfig::peers()` is empty) always wins its own contest: no
/// peer can refuse a `/request_gamemaster` that is never sent.
#[tokio::test]
async fn solo_coordinator_becomes_active_and_serves_probes() {
    let config = test_election_config("http://self", 1, vec!["http://self".to_string()]);
    let mut election = Election::new(config);
    election.step().await; // Initial -> Gamemaster, no peers to contest.
    assert!(election.is_active());

    let server = PeerTestServer::start(election).await;
    let client = reqwest::Client::new();
    let base = server.base_url();

    let resp = client
        .get(format!("{base}/gamemaster"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FOUND);
    assert_eq!(resp.text().await.unwrap(), "1\n");

    let resp = client
        .get(format!("{base}/alive"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FOUND);
    assert_eq!(resp.text().await.unwrap(), "http://self\n");

    let resp = client
        .get(format!("{base}/request_gamemaster"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FOUND);
}

/// A `GM_FAIL` notification over the peer WebSocket resets an active
/// coordinator back to `Initial`, visible on the next `/gamemaster` probe.
#[tokio::test]
async fn gm_fail_notification_demotes_active_coordinator() {
    let config = test_election_config("http://self", 1, vec!["http://self".to_string()]);
    let mut election = Election::new(config);
    election.step().await;
    assert!(election.is_active());

    let server = PeerTestServer::start(election).await;
    let ws_url = format!("ws://{}/", server.addr);
    let (mut socket, _response) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let payload = serde_json::to_string(&PeerMessage::GmFail).unwrap();
    socket
        .send(tokio_tungstenite::tungstenite::Message::Text(
            payload.into(),
        ))
        .await
        .unwrap();
    drop(socket);

    // Give the server a moment to process the notification.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/gamemaster", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "1\n");
}

/// Unmatched paths on the peer router fall through to axum's default 404.
#[tokio::test]
async fn unmatched_path_returns_404() {
    let config = test_election_config("http://self", 1, vec!["http://self".to_string()]);
    let election = Election::new(config);
    let server = PeerTestServer::start(election).await;

    let resp = reqwest::get(format!("{}/not_a_route", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}
