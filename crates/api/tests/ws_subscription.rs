//! Live WebSocket tests for `/ws?jobId=...` against a served router.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{post_json, project_json, wait_for_status};
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr, job_id: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws?jobId={job_id}"))
        .await
        .expect("WebSocket handshake failed");
    client
}

/// Next status frame, or `Err(close code)` once the server closes.
async fn next_frame(client: &mut Client) -> Result<Value, Option<u16>> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("no message within 10s");
        match msg {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(frame))) => return Err(frame.map(|f| u16::from(f.code))),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return Err(None),
        }
    }
}

/// Every status frame until the server closes, plus the close code.
async fn collect_frames(client: &mut Client) -> (Vec<Value>, Option<u16>) {
    let mut frames = Vec::new();
    loop {
        match next_frame(client).await {
            Ok(frame) => frames.push(frame),
            Err(code) => return (frames, code),
        }
    }
}

// ---------------------------------------------------------------------------
// Test: a finished job yields exactly one terminal frame and a normal close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finished_job_yields_single_frame_then_normal_close() {
    let app = common::build_test_app();
    post_json(app.router.clone(), "/projects/p1/build", project_json("p1")).await;
    wait_for_status(&app.router, "p1", "completed").await;
    let addr = common::spawn_server(app.router.clone()).await;

    let mut client = connect(addr, "p1").await;
    let (frames, close) = collect_frames(&mut client).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["jobId"], "p1");
    assert_eq!(frames[0]["status"], "completed");
    assert_eq!(frames[0]["progress"], 100);
    assert_eq!(close, Some(1000));
}

// ---------------------------------------------------------------------------
// Test: a live job streams ordered progress up to the terminal frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_job_streams_progress_until_completed() {
    let app = common::build_gated_test_app(|_| {});
    post_json(app.router.clone(), "/projects/p1/build", project_json("p1")).await;
    let addr = common::spawn_server(app.router.clone()).await;

    let mut client = connect(addr, "p1").await;
    let first = next_frame(&mut client).await.unwrap();
    assert_matches!(first["status"].as_str(), Some("pending" | "running"));

    app.open_gate();
    let (rest, close) = collect_frames(&mut client).await;

    let progress: Vec<u64> = std::iter::once(&first)
        .chain(&rest)
        .map(|f| f["progress"].as_u64().unwrap())
        .collect();
    assert!(
        progress.windows(2).all(|w| w[0] <= w[1]),
        "progress must not go backwards: {progress:?}"
    );

    let last = rest.last().expect("terminal frame");
    assert_eq!(last["status"], "completed");
    assert_eq!(last["progress"], 100);
    assert_eq!(last["message"], "Build completed successfully");
    assert_eq!(close, Some(1000));
}

// ---------------------------------------------------------------------------
// Test: two observers of the same job both see the terminal frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_observers_are_independent() {
    let app = common::build_gated_test_app(|_| {});
    post_json(app.router.clone(), "/projects/p1/build", project_json("p1")).await;
    let addr = common::spawn_server(app.router.clone()).await;

    let mut a = connect(addr, "p1").await;
    let mut b = connect(addr, "p1").await;
    next_frame(&mut a).await.unwrap();
    next_frame(&mut b).await.unwrap();
    assert_eq!(app.state.ws_manager.subscriber_count("p1").await, 2);

    // One observer leaving does not disturb the other or the job.
    drop(a);
    app.open_gate();

    let (frames, close) = collect_frames(&mut b).await;
    assert_eq!(frames.last().unwrap()["status"], "completed");
    assert_eq!(close, Some(1000));
    wait_for_status(&app.router, "p1", "completed").await;
}

// ---------------------------------------------------------------------------
// Test: an idle job ends the stream with a failure frame and close 1011
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_subscription_times_out_with_failure_frame() {
    let app = common::build_gated_test_app(|config| {
        config.build.subscription_idle_timeout = Duration::from_millis(300);
    });
    post_json(app.router.clone(), "/projects/p1/build", project_json("p1")).await;
    let addr = common::spawn_server(app.router.clone()).await;

    let mut client = connect(addr, "p1").await;
    let (frames, close) = collect_frames(&mut client).await;

    let last = frames.last().expect("timeout frame");
    assert_eq!(last["status"], "failed");
    assert_eq!(last["message"], "Connection timeout");
    assert_eq!(close, Some(1011));

    // The job itself keeps running.
    let job = app.state.builds.status("p1").await.unwrap();
    assert!(job.status.is_active());
}

// ---------------------------------------------------------------------------
// Test: server shutdown closes open streams with going-away
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_closes_streams_with_going_away() {
    let app = common::build_gated_test_app(|_| {});
    post_json(app.router.clone(), "/projects/p1/build", project_json("p1")).await;
    let addr = common::spawn_server(app.router.clone()).await;

    let mut client = connect(addr, "p1").await;
    next_frame(&mut client).await.unwrap();

    app.state.ws_manager.shutdown_all().await;

    let (_, close) = collect_frames(&mut client).await;
    assert_eq!(close, Some(1001));
}

// ---------------------------------------------------------------------------
// Test: unknown job and missing jobId are rejected before the upgrade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_rejected_before_upgrade() {
    let app = common::build_test_app();
    let addr = common::spawn_server(app.router.clone()).await;

    let err = connect_async(format!("ws://{addr}/ws?jobId=missing"))
        .await
        .unwrap_err();

    assert_matches!(err, WsError::Http(response) if response.status().as_u16() == 404);
}

#[tokio::test]
async fn missing_job_id_is_rejected_before_upgrade() {
    let app = common::build_test_app();
    let addr = common::spawn_server(app.router.clone()).await;

    let err = connect_async(format!("ws://{addr}/ws")).await.unwrap_err();

    assert_matches!(err, WsError::Http(response) if response.status().as_u16() == 400);
}
