use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::store::StoreChange;
use crate::websocket::messages::WebSocketMessage;

#[derive(Debug)]
pub struct WebSocketConnection {
    pub id: Uuid,
    pub user_id: i64,
    pub connected_at: DateTime<Utc>,
    pub sender: mpsc::UnboundedSender<WebSocketMessage>,
}

impl WebSocketConnection {
    pub fn new(user_id: i64, sender: mpsc::UnboundedSender<WebSocketMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            connected_at: Utc::now(),
            sender,
        }
    }

    pub fn send(&self, message: WebSocketMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| AppError::WebSocket("Failed to send message to connection".to_string()))
    }
}

/// Open admin sockets. Store changes are fanned out to every connection.
#[derive(Debug, Clone, Default)]
pub struct WebSocketManager {
    connections: Arc<RwLock<HashMap<Uuid, WebSocketConnection>>>,
}

impl WebSocketManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_connection(&self, connection: WebSocketConnection) {
        let connection_id = connection.id;
        self.connections.write().await.insert(connection_id, connection);
        info!("WebSocket connection added: {}", connection_id);
    }

    pub async fn remove_connection(&self, connection_id: &Uuid) {
        if self.connections.write().await.remove(connection_id).is_some() {
            info!("WebSocket connection removed: {}", connection_id);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn broadcast(&self, message: WebSocketMessage) {
        let connections = self.connections.read().await;
        let failed: Vec<Uuid> = connections
            .iter()
            .filter(|(_, connection)| connection.send(message.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();
        drop(connections);

        if !failed.is_empty() {
            let mut connections = self.connections.write().await;
            for connection_id in failed {
                connections.remove(&connection_id);
                warn!("Removed failed connection: {}", connection_id);
            }
        }
    }

    /// Relays every change from `changes` to the open sockets until the
    /// channel closes.
    pub fn forward(&self, mut changes: broadcast::Receiver<StoreChange>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => manager.broadcast(change.into()).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Live feed lagged, {} changes skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Live feed forwarder stopped");
        })
    }

    pub async fn handle_connection(&self, socket: WebSocket, user: AuthUser) {
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WebSocketMessage>();

        let connection = WebSocketConnection::new(user.user_id, tx);
        let connection_id = connection.id;
        let _ = connection.send(WebSocketMessage::Connected {
            connection_id,
            username: user.username,
        });
        self.add_connection(connection).await;

        let outgoing_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize WebSocket message: {}", e);
                        continue;
                    }
                };

                if sender.send(Message::Text(json)).await.is_err() {
                    debug!("WebSocket connection closed, stopping outgoing handler");
                    break;
                }
            }
        });

        let manager = self.clone();
        let incoming_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let Some(reply) = WebSocketMessage::reply_to(&text) else {
                            continue;
                        };
                        if let Some(connection) = manager.connections.read().await.get(&connection_id) {
                            let _ = connection.send(reply);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("WebSocket connection closed by client");
                        break;
                    }
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        tokio::select! {
            _ = outgoing_task => debug!("Outgoing handler completed"),
            _ = incoming_task => debug!("Incoming handler completed"),
        }

        self.remove_connection(&connection_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeKind, ChangeNotifier};
    use std::time::Duration;

    #[tokio::test]
    async fn test_forwarded_changes_reach_connections() {
        let manager = WebSocketManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.add_connection(WebSocketConnection::new(1, tx)).await;

        let notifier = ChangeNotifier::new();
        let _forwarder = manager.forward(notifier.subscribe());
        notifier.publish(StoreChange::new("messages", 1, ChangeKind::Deleted));

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match frame {
            WebSocketMessage::StoreChanged(change) => assert_eq!(change.kind, ChangeKind::Deleted),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dead_connections_are_dropped() {
        let manager = WebSocketManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.add_connection(WebSocketConnection::new(1, tx)).await;
        drop(rx);

        manager.broadcast(WebSocketMessage::Pong).await;
        assert_eq!(manager.connection_count().await, 0);
    }
}
