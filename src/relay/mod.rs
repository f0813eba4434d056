//! WebSocket relay
//!
//! An explicitly constructed service that fans user-scoped events out to
//! rooms keyed by user id. A connection joins its room only after sending
//! an `authenticate` message whose token verifies; the room id is derived
//! from the verified claim, never from a client-asserted field.
//!
//! Emission is fire-and-forget with no delivery guarantee: if the user has
//! no open socket the event is dropped. Connection state is removed on
//! disconnect.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::accept_async;
use tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::auth;

pub mod message;

pub use message::{events, ClientMessage, Envelope};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: String,
    /// How long an unauthenticated connection may linger before being dropped
    pub auth_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8091".to_string(),
            auth_grace: Duration::from_secs(10),
        }
    }
}

struct Connection {
    user_id: String,
    tx: mpsc::UnboundedSender<String>,
}

struct RelayShared {
    token_secret: String,
    connections: RwLock<HashMap<u64, Connection>>,
    rooms: RwLock<HashMap<String, HashSet<u64>>>,
    next_id: AtomicU64,
}

impl RelayShared {
    async fn register(&self, user_id: String, tx: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.connections
            .write()
            .await
            .insert(id, Connection { user_id: user_id.clone(), tx });
        self.rooms
            .write()
            .await
            .entry(user_id.clone())
            .or_default()
            .insert(id);
        info!(conn_id = id, user_id = %user_id, "Relay connection joined room");
        id
    }

    async fn unregister(&self, conn_id: u64) {
        let user_id = self
            .connections
            .write()
            .await
            .remove(&conn_id)
            .map(|c| c.user_id);
        if let Some(user_id) = user_id {
            let mut rooms = self.rooms.write().await;
            if let Some(members) = rooms.get_mut(&user_id) {
                members.remove(&conn_id);
                if members.is_empty() {
                    rooms.remove(&user_id);
                }
            }
            debug!(conn_id, user_id = %user_id, "Relay connection left");
        }
    }
}

/// Cheap cloneable handle used by the HTTP handlers and the engine bridge
/// to emit events.
#[derive(Clone)]
pub struct RelayHandle {
    shared: Arc<RelayShared>,
}

impl RelayHandle {
    /// Send one event to every open connection in the user's room.
    /// Fire-and-forget: events for users with no open socket are dropped.
    pub async fn emit_to_user(&self, user_id: &str, event: &str, data: Value) {
        let text = Envelope::new(event, data).to_json();
        let rooms = self.shared.rooms.read().await;
        let members = match rooms.get(user_id) {
            Some(members) => members,
            None => {
                debug!(user_id, event, "No open sockets; event dropped");
                return;
            }
        };
        let connections = self.shared.connections.read().await;
        for conn_id in members {
            if let Some(conn) = connections.get(conn_id) {
                let _ = conn.tx.send(text.clone());
            }
        }
    }

    pub async fn emit_generation_status(
        &self,
        user_id: &str,
        presentation_id: &str,
        status: &str,
        message: &str,
    ) {
        self.emit_to_user(
            user_id,
            events::GENERATION_STATUS,
            json!({
                "presentation_id": presentation_id,
                "status": status,
                "message": message,
            }),
        )
        .await;
    }

    pub async fn emit_generation_progress(
        &self,
        user_id: &str,
        presentation_id: &str,
        progress: u8,
        current_step: &str,
    ) {
        self.emit_to_user(
            user_id,
            events::GENERATION_PROGRESS,
            json!({
                "presentation_id": presentation_id,
                "progress": progress,
                "current_step": current_step,
            }),
        )
        .await;
    }

    pub async fn emit_generation_completed(&self, user_id: &str, presentation_id: &str) {
        self.emit_to_user(
            user_id,
            events::GENERATION_COMPLETED,
            json!({ "presentation_id": presentation_id }),
        )
        .await;
    }

    pub async fn emit_generation_error(&self, user_id: &str, presentation_id: &str, reason: &str) {
        self.emit_to_user(
            user_id,
            events::GENERATION_ERROR,
            json!({ "presentation_id": presentation_id, "error": reason }),
        )
        .await;
    }

    pub async fn emit_thinking_step(&self, user_id: &str, presentation_id: &str, steps: Value) {
        self.emit_to_user(
            user_id,
            events::THINKING_STEP_UPDATE,
            json!({ "presentation_id": presentation_id, "steps": steps }),
        )
        .await;
    }

    pub async fn emit_thinking_action(&self, user_id: &str, presentation_id: &str, action: Value) {
        self.emit_to_user(
            user_id,
            events::THINKING_ACTION_ADD,
            json!({ "presentation_id": presentation_id, "action": action }),
        )
        .await;
    }

    pub async fn emit_slide_preview(&self, user_id: &str, presentation_id: &str, preview: Value) {
        self.emit_to_user(
            user_id,
            events::SLIDE_PREVIEW_UPDATE,
            json!({ "presentation_id": presentation_id, "preview": preview }),
        )
        .await;
    }

    pub async fn emit_topics_generated(&self, user_id: &str, presentation_id: &str, topics: Value) {
        self.emit_to_user(
            user_id,
            events::TOPICS_GENERATED,
            json!({ "presentation_id": presentation_id, "topics": topics }),
        )
        .await;
    }

    pub async fn emit_presentation_ready(
        &self,
        user_id: &str,
        presentation_id: &str,
        slides_count: usize,
    ) {
        self.emit_to_user(
            user_id,
            events::PRESENTATION_READY,
            json!({ "presentation_id": presentation_id, "slides_count": slides_count }),
        )
        .await;
    }

    pub async fn emit_presentation_error(
        &self,
        user_id: &str,
        presentation_id: &str,
        reason: &str,
    ) {
        self.emit_to_user(
            user_id,
            events::PRESENTATION_ERROR,
            json!({ "presentation_id": presentation_id, "error": reason }),
        )
        .await;
    }

    pub async fn connection_count(&self) -> usize {
        self.shared.connections.read().await.len()
    }
}

/// The relay service. Constructed explicitly, torn down via `shutdown`.
pub struct Relay {
    shared: Arc<RelayShared>,
    shutdown: watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl Relay {
    /// Bind the listener and start accepting connections.
    pub async fn start(config: RelayConfig, token_secret: String) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Relay listening on ws://{}", local_addr);

        let shared = Arc::new(RelayShared {
            token_secret,
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let accept_shared = Arc::clone(&shared);
        let auth_grace = config.auth_grace;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // A closed channel means the relay was dropped.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Relay accept loop stopping");
                            break;
                        }
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                debug!(%peer, "Relay connection accepted");
                                let shared = Arc::clone(&accept_shared);
                                tokio::spawn(async move {
                                    handle_connection(shared, stream, auth_grace).await;
                                });
                            }
                            Err(e) => warn!(error = %e, "Relay accept failed"),
                        }
                    }
                }
            }
        });

        Ok(Self {
            shared,
            shutdown: shutdown_tx,
            local_addr,
        })
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn handle_connection(shared: Arc<RelayShared>, stream: TcpStream, auth_grace: Duration) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    // First message must authenticate within the grace period.
    let user_id = match tokio::time::timeout(auth_grace, source.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => authenticate(&shared, &text),
        _ => None,
    };
    let user_id = match user_id {
        Some(user_id) => user_id,
        None => {
            debug!("Connection dropped before valid authentication");
            let _ = sink.close().await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = shared.register(user_id.clone(), tx).await;

    let ack = Envelope::new(events::AUTHENTICATED, json!({ "user_id": user_id })).to_json();
    if sink.send(WsMessage::Text(ack)).await.is_err() {
        shared.unregister(conn_id).await;
        return;
    }

    // Pump outbound events and drain inbound frames until either side closes.
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if sink.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = source.next() => match inbound {
                Some(Ok(WsMessage::Ping(payload))) => {
                    let _ = sink.send(WsMessage::Pong(payload)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {} // other client frames are ignored
                Some(Err(e)) => {
                    debug!(error = %e, "Relay read error");
                    break;
                }
            },
        }
    }

    shared.unregister(conn_id).await;
}

/// Parse an authenticate message and verify its token. Returns the user id
/// claim only when the signature checks out.
fn authenticate(shared: &RelayShared, text: &str) -> Option<String> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Authenticate { token }) => {
            let verified = auth::verify_user_token(&shared.token_secret, &token);
            if verified.is_none() {
                warn!("Rejected socket authentication with invalid token");
            }
            verified
        }
        _ => None,
    }
}
