//! Integration tests for [`ProtocolSession`] against a fake Builder.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{closed_port, FakeBuilder};
use tokio::sync::oneshot;
use wise_builder::protocol::{OP_FIRE_WEATHER_INDEX, OP_JOB_DEFAULTS, OP_SOLAR};
use wise_builder::{
    BuilderClient, CompletionPolicy, ProtocolSession, SessionError, SessionRequest,
    SessionResponse, SessionState,
};
use wise_core::{Endpoint, EndpointRegistry};

fn solar_request() -> SessionRequest {
    SessionRequest::new(OP_SOLAR, CompletionPolicy::SinglePacket)
        .with_parameters(["53.5", "-113.5", "2024-06-21"])
}

// ---------------------------------------------------------------------------
// Test: wire framing and single-packet response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_packet_exchange_frames_request_and_shutdown() {
    let builder = FakeBuilder::spawn(3, vec!["05:06|21:58|13:32"]).await;
    let session = ProtocolSession::new(builder.registry());

    let response = session.execute(solar_request()).await.unwrap();

    assert_eq!(response, SessionResponse::Packet("05:06|21:58|13:32".into()));
    assert_eq!(response.fields(), vec!["05:06", "21:58", "13:32"]);
    assert_eq!(session.state(), SessionState::Succeeded);

    let observed = builder.finish().await;
    assert_eq!(
        observed.lines,
        vec![
            "STARTUP",
            "SOLAR_CALCULATE",
            "53.5|-113.5|2024-06-21",
            "SHUTDOWN",
        ]
    );
}

// ---------------------------------------------------------------------------
// Test: marker-terminated accumulation over several packets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn marker_terminated_exchange_collects_complete_records() {
    let builder = FakeBuilder::spawn(2, vec!["a|b|c\r\n", "d|e|f\r\ng|h", "COMPLETE"]).await;
    let session = ProtocolSession::new(builder.registry());

    let request = SessionRequest::new(OP_JOB_DEFAULTS, CompletionPolicy::MarkerTerminated);
    let response = session.execute(request).await.unwrap();

    let records = match response {
        SessionResponse::Records(records) => records,
        other => panic!("expected records, got {other:?}"),
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], vec!["a", "b", "c"]);
    assert_eq!(records[1], vec!["d", "e", "f"]);

    let observed = builder.finish().await;
    assert_eq!(observed.lines.last().map(String::as_str), Some("SHUTDOWN"));
}

#[tokio::test]
async fn stream_closed_before_marker_fails_the_session() {
    let builder = FakeBuilder::spawn_hang_up(2, vec!["a|b|c\r\n"]).await;
    let session = ProtocolSession::new(builder.registry());

    let request = SessionRequest::new(OP_JOB_DEFAULTS, CompletionPolicy::MarkerTerminated);
    let result = session.execute(request).await;

    assert_matches!(
        result,
        Err(SessionError::Closed { .. }) | Err(SessionError::Transport { .. })
    );
    assert_eq!(session.state(), SessionState::Failed);
    builder.finish().await;
}

#[tokio::test]
async fn peer_closing_before_reading_the_request_fails_the_session() {
    let builder = FakeBuilder::spawn_drop_on_accept().await;
    let session = ProtocolSession::new(builder.registry());

    let result = session.execute(solar_request()).await;

    assert_matches!(
        result,
        Err(SessionError::Closed { .. }) | Err(SessionError::Transport { .. })
    );
    assert_eq!(session.state(), SessionState::Failed);
    builder.finish().await;

    let builder = FakeBuilder::spawn(3, vec!["after"]).await;
    let session = ProtocolSession::new(builder.registry());
    let response = session.execute(solar_request()).await.unwrap();
    assert_eq!(response, SessionResponse::Packet("after".into()));
    builder.finish().await;
}

#[tokio::test]
async fn failed_exchange_closes_the_socket_without_shutdown_token() {
    let builder = FakeBuilder::spawn_half_close(2, vec!["a|b|c\r\n"]).await;
    let session = ProtocolSession::new(builder.registry());

    let request = SessionRequest::new(OP_JOB_DEFAULTS, CompletionPolicy::MarkerTerminated);
    let result = session.execute(request).await;
    assert_matches!(result, Err(SessionError::Closed { .. }));
    assert_eq!(session.state(), SessionState::Failed);

    // The fake only finishes once the client has closed its end.
    let observed = tokio::time::timeout(Duration::from_secs(2), builder.finish())
        .await
        .expect("client socket left open after failure");
    assert_eq!(observed.lines, vec!["STARTUP", "GET_DEFAULTS"]);
}

#[tokio::test]
async fn packet_ending_inside_a_multibyte_character_is_read_whole() {
    let mut packet = "a".repeat(8 * 1024 - 1);
    packet.push_str("\u{00e9}|done");
    let builder = FakeBuilder::spawn(3, vec![packet.clone()]).await;
    let session = ProtocolSession::new(builder.registry());

    let response = session.execute(solar_request()).await.unwrap();

    let text = match response {
        SessionResponse::Packet(text) => text,
        other => panic!("expected packet, got {other:?}"),
    };
    assert!(packet.starts_with(&text));
    assert!(!text.contains('\u{fffd}'));
    assert_eq!(session.state(), SessionState::Succeeded);

    let observed = builder.finish().await;
    assert_eq!(observed.lines.last().map(String::as_str), Some("SHUTDOWN"));
}

// ---------------------------------------------------------------------------
// Test: single-flight enforcement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_request_is_rejected_without_disturbing_the_first() {
    let mut builder = FakeBuilder::spawn_held(3, vec!["1|2|3"]).await;
    let session = ProtocolSession::new(builder.registry());

    let first = session.begin(solar_request()).unwrap();
    assert_eq!(session.state(), SessionState::InFlight);

    let second = session.begin(solar_request());
    assert_matches!(second, Err(SessionError::ConcurrentRequest));
    let third = session.execute(solar_request()).await;
    assert_matches!(third, Err(SessionError::ConcurrentRequest));
    assert_eq!(session.state(), SessionState::InFlight);

    builder.release();
    let response = first.wait().await.unwrap();
    assert_eq!(response, SessionResponse::Packet("1|2|3".into()));
    assert_eq!(session.state(), SessionState::Succeeded);

    let observed = builder.finish().await;
    assert!(!observed.extra_connection, "rejected calls must not connect");
}

#[tokio::test]
async fn cloned_handles_share_the_single_flight_rule() {
    let mut builder = FakeBuilder::spawn_held(3, vec!["ok"]).await;
    let session = ProtocolSession::new(builder.registry());
    let other = session.clone();

    let first = session.begin(solar_request()).unwrap();
    assert_matches!(other.begin(solar_request()), Err(SessionError::ConcurrentRequest));

    builder.release();
    first.wait().await.unwrap();
    builder.finish().await;
}

// ---------------------------------------------------------------------------
// Test: sequential reuse after failure and success
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_is_reusable_after_failure_and_success() {
    let registry = Arc::new(EndpointRegistry::new(Endpoint::new(
        "127.0.0.1",
        closed_port().await,
    )));
    let session = ProtocolSession::new(Arc::clone(&registry));

    let failed = session.execute(solar_request()).await;
    assert_matches!(failed, Err(SessionError::Transport { .. }));
    assert_eq!(session.state(), SessionState::Failed);

    let builder = FakeBuilder::spawn(3, vec!["first"]).await;
    registry.set(builder.endpoint());
    let response = session.execute(solar_request()).await.unwrap();
    assert_eq!(response, SessionResponse::Packet("first".into()));
    assert_eq!(session.state(), SessionState::Succeeded);
    builder.finish().await;

    let builder = FakeBuilder::spawn(3, vec!["second"]).await;
    registry.set(builder.endpoint());
    let response = session.execute(solar_request()).await.unwrap();
    assert_eq!(response, SessionResponse::Packet("second".into()));
    builder.finish().await;
}

#[tokio::test]
async fn registry_update_does_not_redirect_an_exchange_in_flight() {
    let mut builder = FakeBuilder::spawn_held(3, vec!["pinned"]).await;
    let registry = builder.registry();
    let session = ProtocolSession::new(Arc::clone(&registry));

    let pending = session.begin(solar_request()).unwrap();
    registry.set_port(closed_port().await);
    builder.release();

    let response = pending.wait().await.unwrap();
    assert_eq!(response, SessionResponse::Packet("pinned".into()));
    builder.finish().await;
}

// ---------------------------------------------------------------------------
// Test: callback adapter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn callback_adapter_delivers_the_exchange_result() {
    let builder = FakeBuilder::spawn(3, vec!["12.1|0.4"]).await;
    let session = ProtocolSession::new(builder.registry());
    let (tx, rx) = oneshot::channel();

    let request = SessionRequest::new(OP_FIRE_WEATHER_INDEX, CompletionPolicy::SinglePacket)
        .with_parameters([85, 6, 15]);
    session
        .execute_with_callback(request, move |result| {
            let _ = tx.send(result);
        })
        .unwrap();

    let result = rx.await.expect("callback invoked");
    assert_eq!(result.unwrap(), SessionResponse::Packet("12.1|0.4".into()));
    builder.finish().await;
}

#[tokio::test]
async fn callback_adapter_rejects_concurrent_request_synchronously() {
    let mut builder = FakeBuilder::spawn_held(3, vec!["x"]).await;
    let session = ProtocolSession::new(builder.registry());

    let first = session.begin(solar_request()).unwrap();
    let rejected = session.execute_with_callback(solar_request(), |_| {
        panic!("callback must not run for a rejected request");
    });
    assert_matches!(rejected, Err(SessionError::ConcurrentRequest));

    builder.release();
    first.wait().await.unwrap();
    builder.finish().await;
}

// ---------------------------------------------------------------------------
// Test: BuilderClient facade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_reads_job_defaults() {
    let builder =
        FakeBuilder::spawn(2, vec!["fuel|C-2\r\nffmc|85\r\n", "dmc|25\r\nCOMPLETE"]).await;
    let client = BuilderClient::new(builder.registry());

    let defaults = client.job_defaults().await.unwrap().expect("decoded defaults");
    assert_eq!(defaults.len(), 3);
    assert_eq!(defaults.get("fuel"), Some("C-2"));
    assert_eq!(defaults.get("dmc"), Some("25"));

    let observed = builder.finish().await;
    assert_eq!(observed.lines[..2], ["STARTUP", "GET_DEFAULTS"]);
}

#[tokio::test]
async fn client_reports_unexpected_shape_as_not_calculated() {
    let builder = FakeBuilder::spawn(2, vec!["fuel|C-2|extra\nCOMPLETE"]).await;
    let client = BuilderClient::new(builder.registry());

    let defaults = client.job_defaults().await.unwrap();
    assert!(defaults.is_none());
    builder.finish().await;
}
