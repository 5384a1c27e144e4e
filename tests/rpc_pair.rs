//! End-to-end RPC exchanges between two endpoints wired back to back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use ocpp_stack::rpc::{CallError, OcppFrame, RpcEndpoint, RpcListener, RpcSpy};

struct ServerListener;

#[async_trait::async_trait]
impl RpcListener for ServerListener {
    async fn call_received(&self, action: &str, _payload: Value) -> Result<Value, CallError> {
        match action {
            "Heartbeat" => Ok(serde_json::json!({
                "currentTime": chrono::Utc::now().to_rfc3339()
            })),
            other => Err(CallError::not_implemented(other)),
        }
    }
}

struct TapSpy {
    frames: std::sync::Mutex<Vec<String>>,
}

impl RpcSpy for TapSpy {
    fn message_sent(&self, message: &str) {
        self.frames.lock().unwrap().push(format!(">{}", message));
    }
    fn message_received(&self, message: &str) {
        self.frames.lock().unwrap().push(format!("<{}", message));
    }
}

/// Two endpoints whose outbound channels feed the peer's inbound path.
fn connected_pair() -> (Arc<RpcEndpoint>, Arc<RpcEndpoint>) {
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<String>();

    let client = Arc::new(RpcEndpoint::new("client", client_tx));
    let server = Arc::new(RpcEndpoint::new("server", server_tx));
    server.register_listener(Arc::new(ServerListener));
    client.start();
    server.start();

    {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            while let Some(text) = client_rx.recv().await {
                server.process_incoming(&text);
            }
        });
    }
    {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            while let Some(text) = server_rx.recv().await {
                client.process_incoming(&text);
            }
        });
    }

    (client, server)
}

#[tokio::test]
async fn heartbeat_round_trip() {
    let (client, _server) = connected_pair();
    let payload = client
        .call("Heartbeat", serde_json::json!({}), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(payload.get("currentTime").is_some());
}

#[tokio::test]
async fn unknown_action_is_not_implemented() {
    let (client, _server) = connected_pair();
    let error = client
        .call("FlyToMoon", serde_json::json!({}), Duration::from_secs(5))
        .await
        .unwrap_err();
    match error {
        ocpp_stack::RpcError::CallError { code, .. } => assert_eq!(code, "NotImplemented"),
        other => panic!("expected CallError, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_frame_gets_protocol_error_and_connection_survives() {
    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<String>();
    let server = Arc::new(RpcEndpoint::new("server", server_tx));
    server.register_listener(Arc::new(ServerListener));
    let spy = Arc::new(TapSpy {
        frames: std::sync::Mutex::new(Vec::new()),
    });
    server.register_spy(spy.clone());
    server.start();

    server.process_incoming("not-json");
    let reply = server_rx.recv().await.unwrap();
    match OcppFrame::parse(&reply).unwrap() {
        OcppFrame::CallError {
            unique_id,
            error_code,
            ..
        } => {
            assert_eq!(unique_id, "");
            assert_eq!(error_code, "ProtocolError");
        }
        other => panic!("expected CallError, got {:?}", other),
    }

    // The endpoint keeps serving after the framing error.
    server.process_incoming(r#"[2,"0","Heartbeat",{}]"#);
    let reply = server_rx.recv().await.unwrap();
    let frame = OcppFrame::parse(&reply).unwrap();
    assert!(frame.is_call_result());
    assert_eq!(frame.unique_id(), "0");

    // The spy observed every frame, inbound before the matching reply.
    let frames = spy.frames.lock().unwrap();
    assert_eq!(frames.len(), 4);
    assert!(frames[0].starts_with("<not-json"));
    assert!(frames[1].starts_with(">[4"));
    server.stop().await;
}

#[tokio::test(start_paused = true)]
async fn call_timeout_is_within_the_expected_window() {
    // A peer that never answers: the outbound channel is open but nothing
    // pumps responses back.
    let (client_tx, _client_rx) = mpsc::unbounded_channel::<String>();
    let client = Arc::new(RpcEndpoint::new("client", client_tx));
    client.start();

    let started = Instant::now();
    let result = client
        .call("Heartbeat", serde_json::json!({}), Duration::from_millis(100))
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(ocpp_stack::RpcError::Timeout)));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(200));
    client.stop().await;
}

#[tokio::test]
async fn concurrent_calls_are_serialized_and_both_complete() {
    let (client, _server) = connected_pair();

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .call("Heartbeat", serde_json::json!({}), Duration::from_secs(5))
                .await
        })
    };
    let second = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .call("Heartbeat", serde_json::json!({}), Duration::from_secs(5))
                .await
        })
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
}

#[tokio::test]
async fn reply_echoes_the_call_unique_id() {
    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<String>();
    let server = Arc::new(RpcEndpoint::new("server", server_tx));
    server.register_listener(Arc::new(ServerListener));
    server.start();

    server.process_incoming(r#"[2,"id-with-◆-bytes","Heartbeat",{}]"#);
    let reply = server_rx.recv().await.unwrap();
    assert_eq!(
        OcppFrame::parse(&reply).unwrap().unique_id(),
        "id-with-◆-bytes"
    );
    server.stop().await;
}
