//! Background WebSocket connection loop with auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use peershare_config::SignalingConfig;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::types::{classify, ControlFrame, Incoming, RelayCommand};

/// How a single connection ended.
enum Exit {
    Reconnect,
    Shutdown,
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the relay connection with exponential backoff.
///
/// `connected` is set only once the relay acknowledges the hello with
/// `registered`. Outbound commands queue while disconnected.
pub(crate) async fn connection_loop(
    config: SignalingConfig,
    user_id: String,
    connected: Arc<RwLock<bool>>,
    inbound_tx: mpsc::Sender<Value>,
    mut command_rx: mpsc::Receiver<RelayCommand>,
) {
    let mut reconnect_delay = config.reconnect_delay_secs.max(1);
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    loop {
        info!(url = %config.url, user_id = %user_id, "Connecting to signaling relay");

        match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(&config.url))
            .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs.max(1);
                let (mut ws_write, mut ws_read) = ws_stream.split();

                let hello = match serde_json::to_string(&ControlFrame::hello(&user_id)) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "Failed to encode hello");
                        return;
                    }
                };
                if let Err(e) = ws_write.send(WsMessage::Text(hello.into())).await {
                    warn!(error = %e, "Failed to send hello");
                } else {
                    let exit = loop {
                        tokio::select! {
                            cmd = command_rx.recv() => {
                                match cmd {
                                    Some(RelayCommand::Send(value)) => {
                                        let kind = value.get("kind").and_then(Value::as_str).unwrap_or("?").to_string();
                                        if let Err(e) = ws_write.send(WsMessage::Text(value.to_string().into())).await {
                                            warn!(error = %e, kind = %kind, "Failed to send signaling message");
                                            break Exit::Reconnect;
                                        }
                                        debug!(kind = %kind, "Sent signaling message");
                                    }
                                    Some(RelayCommand::Disconnect) | None => {
                                        let _ = ws_write.send(WsMessage::Close(None)).await;
                                        break Exit::Shutdown;
                                    }
                                }
                            }
                            msg = ws_read.next() => {
                                match msg {
                                    Some(Ok(WsMessage::Text(text))) => {
                                        match classify(&text) {
                                            Some(Incoming::Envelope(value)) => {
                                                if inbound_tx.send(value).await.is_err() {
                                                    debug!("Inbound receiver dropped");
                                                }
                                            }
                                            Some(Incoming::Control(ControlFrame::Registered { .. })) => {
                                                *connected.write().await = true;
                                                info!(user_id = %user_id, "Registered with signaling relay");
                                            }
                                            Some(Incoming::Control(ControlFrame::Error { message })) => {
                                                warn!(message = %message, "Relay rejected a frame");
                                            }
                                            Some(Incoming::Control(ControlFrame::Hello { .. })) | None => {
                                                debug!(len = text.len(), "Unrecognized frame from relay");
                                            }
                                        }
                                    }
                                    Some(Ok(WsMessage::Ping(data))) => {
                                        let _ = ws_write.send(WsMessage::Pong(data)).await;
                                    }
                                    Some(Ok(WsMessage::Close(_))) | None => {
                                        info!("Signaling relay closed connection");
                                        break Exit::Reconnect;
                                    }
                                    Some(Err(e)) => {
                                        warn!(error = %e, "WebSocket error");
                                        break Exit::Reconnect;
                                    }
                                    Some(Ok(_)) => {}
                                }
                            }
                        }
                    };

                    *connected.write().await = false;
                    if matches!(exit, Exit::Shutdown) {
                        info!("Signaling relay client stopped");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling relay");
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "Signaling relay connection timed out"
                );
            }
        }

        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs.max(1));
    }
}
