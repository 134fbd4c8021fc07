//! Fan-out behavior between real client sessions: rewrite-and-forward,
//! self-echo suppression, kick-old and IGate filter precedence.

mod common;

use std::time::Duration;

use aprshub::config::ListenerMode;
use aprshub::passcode::passcode;
use common::{SERVER_ID, TestClient, start_server};

/// A verified packet is rewritten with this server's q construct and
/// delivered to every other session exactly once; never back to its writer.
#[tokio::test]
async fn verified_publish_fans_out() {
    let server = start_server(ListenerMode::Fullfeed, "").await.unwrap();

    let mut a = TestClient::login(server.addr, "CS1", passcode("CS1"), "")
        .await
        .unwrap();
    let mut b = TestClient::login(server.addr, "CS2", passcode("CS2"), "")
        .await
        .unwrap();

    a.send_line("CS1>APRS::HELLO    :hi{1").await.unwrap();

    let received = b.read_line().await.unwrap();
    assert_eq!(received, format!("CS1>APRS,qAC,{}::HELLO    :hi{{1", SERVER_ID));

    // Exactly once for B, never for the writer
    b.expect_silence(Duration::from_millis(300)).await.unwrap();
    a.expect_silence(Duration::from_millis(300)).await.unwrap();
}

/// A packet gated for a third station gets qAR with the gate's callsign.
#[tokio::test]
async fn gated_packet_gets_qar() {
    let server = start_server(ListenerMode::Fullfeed, "").await.unwrap();

    let mut gate = TestClient::login(server.addr, "GATE1", passcode("GATE1"), "")
        .await
        .unwrap();
    let mut observer = TestClient::login(server.addr, "CS2", passcode("CS2"), "")
        .await
        .unwrap();

    gate.send_line("MOBILE-9>APRS,WIDE2-2:>on the move")
        .await
        .unwrap();

    let received = observer.read_line().await.unwrap();
    assert_eq!(received, "MOBILE-9>APRS,WIDE2-2,qAR,GATE1:>on the move");
}

/// A second login with the same callsign closes the older session.
#[tokio::test]
async fn same_callsign_kicks_older_session() {
    let server = start_server(ListenerMode::Fullfeed, "").await.unwrap();

    let mut a = TestClient::login(server.addr, "CS1", passcode("CS1"), "")
        .await
        .unwrap();
    let _b = TestClient::login(server.addr, "CS1", passcode("CS1"), "")
        .await
        .unwrap();

    a.expect_eof(Duration::from_secs(2)).await.unwrap();
}

/// Different callsigns coexist.
#[tokio::test]
async fn different_callsigns_are_left_alone() {
    let server = start_server(ListenerMode::Fullfeed, "").await.unwrap();

    let mut a = TestClient::login(server.addr, "CS1", passcode("CS1"), "")
        .await
        .unwrap();
    let _b = TestClient::login(server.addr, "CS2", passcode("CS2"), "")
        .await
        .unwrap();

    a.expect_silence(Duration::from_millis(500)).await.unwrap();
}

/// IGate mode with a listener filter: the filter decides, the session's own
/// filter is ignored while the listener has one.
#[tokio::test]
async fn igate_listener_filter() {
    let server = start_server(ListenerMode::Igate, "p/CS").await.unwrap();

    let mut x = TestClient::login(server.addr, "RXONLY", passcode("RXONLY"), "")
        .await
        .unwrap();
    let mut y = TestClient::login(server.addr, "CS9ABC", passcode("CS9ABC"), "")
        .await
        .unwrap();

    y.send_line("CS9ABC>APRS:>hi").await.unwrap();
    let received = x.read_line().await.unwrap();
    assert!(received.starts_with("CS9ABC>APRS,qAC,"), "got {}", received);

    y.send_line("W1AW>APRS:>hi").await.unwrap();
    x.expect_silence(Duration::from_millis(400)).await.unwrap();
}

/// IGate mode without a listener filter falls back to the session's login
/// filter.
#[tokio::test]
async fn igate_session_filter_fallback() {
    let server = start_server(ListenerMode::Igate, "").await.unwrap();

    let mut x = TestClient::login(
        server.addr,
        "RXONLY",
        passcode("RXONLY"),
        "filter b/CS9*",
    )
    .await
    .unwrap();
    let mut y = TestClient::login(server.addr, "CS9ABC", passcode("CS9ABC"), "")
        .await
        .unwrap();

    y.send_line("CS9ABC>APRS:>match").await.unwrap();
    let received = x.read_line().await.unwrap();
    assert!(received.contains(":>match"), "got {}", received);

    y.send_line("W1AW>APRS:>no match").await.unwrap();
    x.expect_silence(Duration::from_millis(400)).await.unwrap();
}

/// IGate mode with neither a listener nor a session filter forwards nothing.
#[tokio::test]
async fn igate_without_filters_forwards_nothing() {
    let server = start_server(ListenerMode::Igate, "").await.unwrap();

    let mut x = TestClient::login(server.addr, "RXONLY", passcode("RXONLY"), "")
        .await
        .unwrap();
    let mut y = TestClient::login(server.addr, "CS9ABC", passcode("CS9ABC"), "")
        .await
        .unwrap();

    y.send_line("CS9ABC>APRS:>hi").await.unwrap();
    x.expect_silence(Duration::from_millis(400)).await.unwrap();
}

/// Fullfeed delivers everything not self-originated, even to unverified
/// (but logged-in) sessions.
#[tokio::test]
async fn fullfeed_delivers_to_unverified_listeners() {
    let server = start_server(ListenerMode::Fullfeed, "").await.unwrap();

    let mut rx = TestClient::login(server.addr, "N0CALL", -1, "").await.unwrap();
    let mut tx = TestClient::login(server.addr, "CS1", passcode("CS1"), "")
        .await
        .unwrap();

    tx.send_line("CS1>APRS:>to everyone").await.unwrap();
    let received = rx.read_line().await.unwrap();
    assert!(received.contains(":>to everyone"));
}
