//! Public handle for the relay connection.

use std::sync::Arc;

use async_trait::async_trait;
use peershare_common::SignalingError;
use peershare_config::SignalingConfig;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use super::connection::connection_loop;
use super::types::RelayCommand;
use crate::protocol::SignalingMessage;
use crate::signaling::SignalingChannel;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Signaling channel backed by a WebSocket connection to `peershare-relay`.
///
/// All methods are non-blocking and hand work to the background connection
/// task.
pub struct RelaySignaling {
    command_tx: mpsc::Sender<RelayCommand>,
    connected: Arc<RwLock<bool>>,
}

impl RelaySignaling {
    /// Start the background connection registered as `user_id`.
    /// Returns `(client, inbound_envelopes)`.
    pub fn connect(config: SignalingConfig, user_id: &str) -> (Self, mpsc::Receiver<Value>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(
            config,
            user_id.to_string(),
            connected,
            inbound_tx,
            command_rx,
        ));

        (client, inbound_rx)
    }

    /// Lightweight handle sharing the same connection.
    pub fn clone_sender(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            connected: Arc::clone(&self.connected),
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(RelayCommand::Disconnect).await;
    }
}

#[async_trait]
impl SignalingChannel for RelaySignaling {
    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        self.command_tx
            .send(RelayCommand::Send(message.to_value()))
            .await
            .map_err(|_| SignalingError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::protocol::Signal;

    #[tokio::test]
    async fn registers_and_exchanges_envelopes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = SignalingConfig {
            url: format!("ws://{addr}"),
            ..SignalingConfig::default()
        };
        let (client, mut inbound) = RelaySignaling::connect(config, "alice");

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).unwrap(),
            other => panic!("expected hello, got {other:?}"),
        };
        assert_eq!(hello, serde_json::json!({"type": "hello", "user_id": "alice"}));
        // Not connected until the relay accepts the hello.
        assert!(!client.is_connected().await);

        ws.send(Message::Text(
            r#"{"type":"registered","user_id":"alice"}"#.into(),
        ))
        .await
        .unwrap();

        let envelope = serde_json::json!({
            "fromUserId": "bob",
            "toUserId": "alice",
            "kind": "share-stopped",
        });
        ws.send(Message::Text(envelope.to_string().into()))
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, envelope);
        assert!(client.is_connected().await);

        client
            .send(SignalingMessage::new("alice", "bob", Signal::ShareStopped))
            .await
            .unwrap();
        let outbound = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).unwrap(),
            other => panic!("expected envelope, got {other:?}"),
        };
        assert_eq!(outbound["toUserId"], "bob");
        assert_eq!(outbound["kind"], "share-stopped");

        client.disconnect().await;
    }
}
