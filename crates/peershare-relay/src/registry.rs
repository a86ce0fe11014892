//! Registry of connected users and their outbound channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

/// One registered connection.
struct Registration {
    conn_id: u64,
    tx: mpsc::Sender<String>,
}

/// Thread-safe user registry. A user id maps to at most one connection; a
/// newer hello for the same id takes over.
#[derive(Clone)]
pub struct UserRegistry {
    users: Arc<RwLock<HashMap<String, Registration>>>,
    next_conn_id: Arc<AtomicU64>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register `tx` for `user_id` and return the connection id that owns
    /// the registration.
    pub async fn register(&self, user_id: &str, tx: mpsc::Sender<String>) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .users
            .write()
            .await
            .insert(user_id.to_string(), Registration { conn_id, tx });
        if let Some(previous) = previous {
            tracing::info!(
                user = %user_id,
                replaced = previous.conn_id,
                conn = conn_id,
                "Registration replaced"
            );
        }
        conn_id
    }

    /// Remove the registration only if `conn_id` still owns it. Returns true
    /// if something was removed.
    pub async fn unregister(&self, user_id: &str, conn_id: u64) -> bool {
        let mut map = self.users.write().await;
        match map.get(user_id) {
            Some(registration) if registration.conn_id == conn_id => {
                map.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Outbound channel for `user_id`, if connected.
    pub async fn get(&self, user_id: &str) -> Option<mpsc::Sender<String>> {
        self.users
            .read()
            .await
            .get(user_id)
            .map(|registration| registration.tx.clone())
    }

    /// Number of registered users.
    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}
