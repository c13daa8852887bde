//! Full socket-based integration tests for viewer ↔ room communication.

use std::time::Duration;

use arena_client::client::{ClientState, GameClient, Incoming};
use arena_client::input::PointerInput;
use arena_shared::net::ServerEvent;
use arena_tests::{eventually, init_tracing, test_config, TestServer};

const WAIT: Duration = Duration::from_secs(3);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn viewer_receives_snapshots_and_adds_circles() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config()).await?;
    let mut client = GameClient::connect(&server.client("r1", "balls")).await?;

    let empty = client.wait_for_snapshot(WAIT, |c| c.is_empty()).await?;
    assert!(empty.is_some(), "no empty snapshot arrived");
    assert_eq!(client.state, ClientState::Viewing);

    client.add_circle(100.0, 120.0).await?;
    let frame = client
        .wait_for_snapshot(WAIT, |c| c.len() == 1)
        .await?
        .expect("snapshot with the new circle");
    let c = frame[0];
    assert!(c.radius >= 10.0 && c.radius <= 60.0);
    // One or two ticks may have moved it by at most 2 units each.
    assert!(c.x.abs_diff(100) <= 10 && c.y.abs_diff(120) <= 10);

    client.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clicks_are_clamped_into_the_arena() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config()).await?;
    let mut client = GameClient::connect(&server.client("clicks", "balls")).await?;
    assert!(client.wait_for_snapshot(WAIT, |c| c.is_empty()).await?.is_some());

    assert!(!client.click(PointerInput::default()).await?);
    let sent = client
        .click(PointerInput {
            x: 950.0,
            y: 300.0,
            clicked: true,
        })
        .await?;
    assert!(sent);

    let frame = client
        .wait_for_snapshot(WAIT, |c| !c.is_empty())
        .await?
        .expect("snapshot with the clicked circle");
    assert_eq!(frame.len(), 1, "an unclicked pointer must not spawn");
    assert!(frame[0].x.abs_diff(800) <= 10 && frame[0].y.abs_diff(300) <= 10);

    let out = client.exec_console("add 10 20").await?;
    assert_eq!(out, vec!["Requested circle at (10, 20)".to_string()]);
    assert!(client.wait_for_snapshot(WAIT, |c| c.len() == 2).await?.is_some());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn username_is_acknowledged_over_the_socket() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config()).await?;
    let mut cfg = server.client("names", "balls");
    cfg.player_name = Some("ada".into());
    let mut client = GameClient::connect(&cfg).await?;

    let event = client.wait_for_event(WAIT).await?;
    assert!(
        matches!(&event, Some(ServerEvent::UsernameAccepted(p)) if p.name == "ada"),
        "unexpected event: {event:?}"
    );
    assert_eq!(client.accepted_name.as_deref(), Some("ada"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_text_keeps_the_connection_open() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config()).await?;
    let mut client = GameClient::connect(&server.client("junk", "balls")).await?;

    client.send_text("not json").await?;
    client.send_text(r#"{"type":"teleport","payload":{}}"#).await?;
    client.add_circle(50.0, 50.0).await?;

    let frame = client.wait_for_snapshot(WAIT, |c| c.len() == 1).await?;
    assert!(frame.is_some(), "connection dropped after malformed input");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_game_gets_an_error_and_no_room() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config()).await?;
    let mut client = GameClient::connect(&server.client("nope", "chess")).await?;

    let event = client.wait_for_event(WAIT).await?;
    assert!(matches!(event, Some(ServerEvent::Error(_))), "got {event:?}");
    assert!(matches!(
        client.recv_timeout(WAIT).await?,
        Some(Incoming::Closed) | None
    ));
    assert!(server.registry.get("nope").is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duel_room_turns_away_a_third_player() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config()).await?;
    let mut a = GameClient::connect(&server.client("d1", "duel")).await?;
    let mut b = GameClient::connect(&server.client("d1", "duel")).await?;
    assert!(a.wait_for_snapshot(WAIT, |_| true).await?.is_some());
    assert!(b.wait_for_snapshot(WAIT, |_| true).await?.is_some());

    let mut c = GameClient::connect(&server.client("d1", "duel")).await?;
    let event = c.wait_for_event(WAIT).await?;
    assert!(matches!(event, Some(ServerEvent::Error(_))), "got {event:?}");

    let room = server.registry.get("d1").expect("duel room");
    assert_eq!(room.status().clients, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn last_viewer_leaving_removes_the_room() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config()).await?;
    let mut a = GameClient::connect(&server.client("shared", "balls")).await?;
    let mut b = GameClient::connect(&server.client("shared", "balls")).await?;
    assert!(a.wait_for_snapshot(WAIT, |_| true).await?.is_some());
    assert!(b.wait_for_snapshot(WAIT, |_| true).await?.is_some());

    let room = server.registry.get("shared").expect("room exists");
    assert_eq!(room.status().clients, 2);

    a.close().await?;
    let r = &room;
    assert!(eventually(WAIT, move || async move { r.status().clients == 1 }).await);
    assert!(server.registry.get("shared").is_some());

    b.close().await?;
    tokio::time::timeout(WAIT, room.stopped()).await?;
    assert!(server.registry.get("shared").is_none());
    Ok(())
}
