use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message};
use sitepress_core::types::{JobId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Reason sent with the going-away close frame on shutdown.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Job whose status this connection observes.
    pub job_id: JobId,
    /// Channel sender for outbound control messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Tracks every open status connection.
///
/// Status frames do not pass through the manager; each connection owns its
/// own job subscription. The manager carries control traffic (heartbeat
/// pings, shutdown closes) that applies to all connections at once.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection observing `job_id`.
    ///
    /// Returns the receiver half of the control channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String, job_id: JobId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            job_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of open connections observing `job_id`.
    pub async fn subscriber_count(&self, job_id: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.job_id == job_id)
            .count()
    }

    /// Send a going-away Close frame to every connection, then clear the map.
    ///
    /// Clearing drops each control sender, so connection tasks stop once the
    /// Close frame has been forwarded.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                code: close_code::AWAY,
                reason: SHUTDOWN_REASON.into(),
            })));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
