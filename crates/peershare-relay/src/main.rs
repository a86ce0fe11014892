//! peershare-relay: WebSocket signaling relay for peer-to-peer screen share.
//!
//! Clients identify themselves with a hello carrying their user id. Every
//! later envelope is stamped with the sender's id and forwarded to the user
//! named in its `toUserId`. Payloads are never inspected.

mod connection;
mod protocol;
mod registry;

use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::{handle_connection, HELLO_TIMEOUT};
use crate::registry::UserRegistry;

#[derive(Parser)]
#[command(name = "peershare-relay", about = "WebSocket signaling relay for peershare")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8090)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "peershare_relay=info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .init();

    let registry = UserRegistry::new();

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };

    tracing::info!("peershare-relay listening on {}", addr);

    let stats_registry = registry.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let count = stats_registry.count().await;
            tracing::debug!(users = count, "Registry tick");
        }
    });

    // Accept loop.
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let registry = registry.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, registry, HELLO_TIMEOUT).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
