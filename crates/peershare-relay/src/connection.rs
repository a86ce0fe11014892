//! Per-connection handler: read the hello, register, then route envelopes.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{RelayHello, RelayResponse};
use crate::registry::UserRegistry;

type WsStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// How long a new connection may take to send its hello.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WsStream,
    addr: SocketAddr,
    registry: UserRegistry,
    hello_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. Read the hello message to identify this client.
    let user_id = match read_hello(&mut stream, addr, hello_timeout).await {
        Ok(user_id) => user_id,
        Err(Some(message)) => {
            let _ = send_response(&mut sink, &RelayResponse::error(message)).await;
            return;
        }
        Err(None) => return,
    };

    // 2. Create our receive channel and register.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let conn_id = registry.register(&user_id, tx).await;

    tracing::info!(peer = %addr, user = %user_id, conn = conn_id, "Client registered");

    if send_response(
        &mut sink,
        &RelayResponse::Registered {
            user_id: user_id.clone(),
        },
    )
    .await
    .is_err()
    {
        registry.unregister(&user_id, conn_id).await;
        return;
    }

    // 3. Forwarding loop.
    loop {
        tokio::select! {
            // Envelopes routed to us -> this client's WebSocket
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    // Registry dropped our sender: a newer connection took over.
                    break;
                };
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            // Frames from this client -> the addressed user
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match prepare_forward(&text, &user_id) {
                        Ok((target, json)) => forward(&registry, &user_id, &target, json).await,
                        Err(message) => {
                            tracing::debug!(user = %user_id, reason = %message, "Rejected frame");
                            let _ = send_response(&mut sink, &RelayResponse::error(message)).await;
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 4. Cleanup.
    let removed = registry.unregister(&user_id, conn_id).await;
    tracing::info!(
        peer = %addr,
        user = %user_id,
        conn = conn_id,
        removed,
        "Client disconnected"
    );
}

async fn forward(registry: &UserRegistry, from: &str, target: &str, json: String) {
    match registry.get(target).await {
        Some(peer) => {
            if peer.send(json).await.is_err() {
                tracing::debug!(from = %from, to = %target, "Target channel closed");
            }
        }
        None => {
            tracing::debug!(from = %from, to = %target, "Target not connected, dropping");
        }
    }
}

/// Validate an envelope from `from` and stamp its sender. Returns the
/// target user id and the JSON text to deliver.
pub(crate) fn prepare_forward(text: &str, from: &str) -> Result<(String, String), String> {
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| "envelope is not a JSON object".to_string())?;

    if obj.contains_key("type") {
        return Err("unexpected control frame".to_string());
    }

    let target = match obj.get("toUserId") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err("missing toUserId".to_string()),
    };

    obj.insert("fromUserId".to_string(), Value::String(from.to_string()));

    Ok((target, value.to_string()))
}

/// Read and parse the first message as a hello. `Err(Some(msg))` asks the
/// caller to report `msg` to the client before closing.
async fn read_hello(
    stream: &mut futures_util::stream::SplitStream<WsStream>,
    addr: SocketAddr,
    hello_timeout: Duration,
) -> Result<String, Option<String>> {
    let frame = tokio::time::timeout(hello_timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<RelayHello>(&text) {
            Ok(RelayHello::Hello { user_id }) => {
                let user_id = user_id.trim();
                if user_id.is_empty() {
                    tracing::warn!(peer = %addr, "Hello with empty user_id");
                    Err(Some("user_id must not be empty".to_string()))
                } else {
                    Ok(user_id.to_string())
                }
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid hello message");
                Err(Some("expected hello".to_string()))
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text hello, got binary");
            Err(None)
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during hello");
            Err(None)
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before hello");
            Err(None)
        }
        Err(_) => {
            tracing::warn!(peer = %addr, timeout = ?hello_timeout, "Hello timeout");
            Err(None)
        }
    }
}

/// Send a RelayResponse as a JSON text frame.
async fn send_response(
    sink: &mut futures_util::stream::SplitSink<WsStream, Message>,
    response: &RelayResponse,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    sink.send(Message::Text(response.to_json().into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_sender_and_finds_target() {
        let text = r#"{"fromUserId":"mallory","toUserId":"bob","kind":"share-stopped"}"#;
        let (target, json) = prepare_forward(text, "alice").unwrap();
        assert_eq!(target, "bob");

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["fromUserId"], "alice");
        assert_eq!(value["kind"], "share-stopped");
    }

    #[test]
    fn numeric_target_is_accepted() {
        let (target, _) = prepare_forward(r#"{"toUserId":42,"kind":"offer"}"#, "7").unwrap();
        assert_eq!(target, "42");
    }

    #[test]
    fn rejects_bad_frames() {
        assert!(prepare_forward("not json", "alice").unwrap_err().starts_with("invalid JSON"));
        assert_eq!(prepare_forward("[1,2]", "alice").unwrap_err(), "envelope is not a JSON object");
        assert_eq!(
            prepare_forward(r#"{"kind":"offer"}"#, "alice").unwrap_err(),
            "missing toUserId"
        );
        assert_eq!(
            prepare_forward(r#"{"toUserId":"  ","kind":"offer"}"#, "alice").unwrap_err(),
            "missing toUserId"
        );
        assert_eq!(
            prepare_forward(r#"{"type":"hello","user_id":"alice"}"#, "alice").unwrap_err(),
            "unexpected control frame"
        );
    }

    // -----------------------------------------------------------------------
    // End to end
    // -----------------------------------------------------------------------

    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_relay(hello_timeout: Duration) -> (SocketAddr, UserRegistry) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = UserRegistry::new();
        let accept_registry = registry.clone();
        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let registry = accept_registry.clone();
                tokio::spawn(async move {
                    if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                        handle_connection(ws, peer, registry, hello_timeout).await;
                    }
                });
            }
        });
        (addr, registry)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        client
    }

    async fn send_json(client: &mut Client, value: Value) {
        client
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    async fn next_json(client: &mut Client) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame before timeout");
        match frame {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    async fn register(addr: SocketAddr, user_id: &str) -> Client {
        let mut client = connect(addr).await;
        send_json(&mut client, json!({"type": "hello", "user_id": user_id})).await;
        assert_eq!(
            next_json(&mut client).await,
            json!({"type": "registered", "user_id": user_id})
        );
        client
    }

    #[tokio::test]
    async fn forwards_to_online_target_with_stamped_sender() {
        let (addr, registry) = start_relay(HELLO_TIMEOUT).await;
        let mut alice = register(addr, "alice").await;
        let mut bob = register(addr, "bob").await;
        assert_eq!(registry.count().await, 2);

        // Nobody is registered as carol: dropped without a reply.
        send_json(
            &mut alice,
            json!({"fromUserId": "alice", "toUserId": "carol", "kind": "share-stopped"}),
        )
        .await;
        send_json(
            &mut alice,
            json!({"fromUserId": "mallory", "toUserId": "bob", "kind": "offer",
                   "payload": {"type": "offer", "sdp": "v=0"}}),
        )
        .await;

        let received = next_json(&mut bob).await;
        assert_eq!(received["fromUserId"], "alice");
        assert_eq!(received["toUserId"], "bob");
        assert_eq!(received["payload"]["sdp"], "v=0");

        // The first frame alice gets back answers this one, so the envelope
        // for carol produced nothing.
        alice.send(Message::Text("not json".into())).await.unwrap();
        let reply = next_json(&mut alice).await;
        assert_eq!(reply["type"], "error");
        assert!(reply["message"].as_str().unwrap().starts_with("invalid JSON"));
    }

    #[tokio::test]
    async fn envelope_without_target_gets_error_reply() {
        let (addr, _) = start_relay(HELLO_TIMEOUT).await;
        let mut alice = register(addr, "alice").await;

        send_json(&mut alice, json!({"fromUserId": "alice", "kind": "offer"})).await;
        assert_eq!(
            next_json(&mut alice).await,
            json!({"type": "error", "message": "missing toUserId"})
        );
    }

    #[tokio::test]
    async fn empty_user_id_is_refused() {
        let (addr, registry) = start_relay(HELLO_TIMEOUT).await;
        let mut client = connect(addr).await;
        send_json(&mut client, json!({"type": "hello", "user_id": "  "})).await;

        assert_eq!(
            next_json(&mut client).await,
            json!({"type": "error", "message": "user_id must not be empty"})
        );
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn connection_without_hello_is_dropped() {
        let (addr, registry) = start_relay(Duration::from_millis(100)).await;
        let mut client = connect(addr).await;

        let end = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("relay closes the connection");
        assert!(!matches!(end, Some(Ok(Message::Text(_)))));
        assert_eq!(registry.count().await, 0);
    }
}
