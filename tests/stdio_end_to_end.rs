//! End-to-end scenarios over the stdio dispatcher (§8), exercised through an
//! in-memory duplex pipe rather than a real stdin/stdout pair.

mod common;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Scenario 1: initialize, then a tool call, happy path.
#[tokio::test]
async fn initialize_then_tool_call_round_trips() {
    let harness = common::stdio_harness();
    let dispatcher = harness.dispatcher.clone();
    let run_handle = tokio::spawn(dispatcher.run());

    let (client_read, mut client_write) = tokio::io::split(harness.client);
    let mut client_read = BufReader::new(client_read);

    client_write
        .write_all(br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#)
        .await
        .unwrap();
    client_write.write_all(b"\n").await.unwrap();

    let mut line = String::new();
    client_read.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["result"]["protocolVersion"], "2025-06-18");

    line.clear();
    client_write
        .write_all(br#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"text":"hello"}}}"#)
        .await
        .unwrap();
    client_write.write_all(b"\n").await.unwrap();
    client_read.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["result"]["content"][0]["text"], "hello");

    harness.cancel.cancel();
    let _ = run_handle.await;
}

/// Scenario 2: an unknown method surfaces as a JSON-RPC method-not-found
/// error, not a tool-shaped `isError` result.
#[tokio::test]
async fn unknown_method_is_protocol_error() {
    let harness = common::stdio_harness();
    let dispatcher = harness.dispatcher.clone();
    let run_handle = tokio::spawn(dispatcher.run());

    let (client_read, mut client_write) = tokio::io::split(harness.client);
    let mut client_read = BufReader::new(client_read);

    client_write
        .write_all(br#"{"jsonrpc":"2.0","id":7,"method":"nonexistent/method","params":{}}"#)
        .await
        .unwrap();
    client_write.write_all(b"\n").await.unwrap();

    let mut line = String::new();
    client_read.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert!(response.get("error").is_some());
    assert_eq!(response["error"]["code"], -32601);

    harness.cancel.cancel();
    let _ = run_handle.await;
}

/// A tool call whose body returns an error result (rather than an envelope
/// rejection) still comes back as a JSON-RPC success with `isError: true`,
/// per §7's "tool failures are not protocol failures" rule.
#[tokio::test]
async fn failing_tool_body_is_rpc_success_with_is_error() {
    let harness = common::stdio_harness();
    let dispatcher = harness.dispatcher.clone();
    let run_handle = tokio::spawn(dispatcher.run());

    let (client_read, mut client_write) = tokio::io::split(harness.client);
    let mut client_read = BufReader::new(client_read);

    client_write
        .write_all(br#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"always_fails","arguments":{}}}"#)
        .await
        .unwrap();
    client_write.write_all(b"\n").await.unwrap();

    let mut line = String::new();
    client_read.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);

    harness.cancel.cancel();
    let _ = run_handle.await;
}

/// The cancellation token interrupts the message pump even with no pending
/// activity on the transport.
#[tokio::test]
async fn cancellation_stops_the_pump() {
    let harness = common::stdio_harness();
    let dispatcher = harness.dispatcher.clone();
    harness.cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), dispatcher.run())
        .await
        .expect("dispatcher should exit promptly once cancelled");
    assert_eq!(
        common::exit_outcome_name(outcome),
        common::exit_outcome_name(browservisor::dispatcher::ExitOutcome::Cancelled)
    );
}
