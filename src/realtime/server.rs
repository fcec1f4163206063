//! WebSocket relay for user events
//!
//! One relay loop owns the set of open connections and handles connect,
//! publish and disconnect commands strictly one at a time, so two fan-outs
//! never interleave. Every connection drains its own bounded outbox; a client
//! that lets it fill up is dropped instead of holding up the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::value::RawValue;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::events::{Channel, RelayFrame};
use crate::config::CABLE_PATH;
use crate::error::{Result, UsercastError};

/// Connection ID
pub type ConnectionId = String;

/// Frames queued per connection before it counts as stalled
pub const OUTBOX_CAPACITY: usize = 256;

type Outbox = mpsc::Sender<Arc<str>>;

enum RelayCommand {
    Connect {
        id: ConnectionId,
        outbox: Outbox,
    },
    Publish {
        from: Option<ConnectionId>,
        channel: Channel,
        frame: Arc<str>,
    },
    Disconnect {
        id: ConnectionId,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct RelayStats {
    clients: AtomicUsize,
    relayed: AtomicU64,
}

/// A registered connection and the frames fanned out to it
pub struct RelaySubscriber {
    pub id: ConnectionId,
    pub frames: mpsc::Receiver<Arc<str>>,
}

/// Handle to the relay loop
#[derive(Clone)]
pub struct RelayHub {
    commands: mpsc::UnboundedSender<RelayCommand>,
    stats: Arc<RelayStats>,
}

impl RelayHub {
    /// Start the relay loop on the current tokio runtime
    pub fn start() -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(RelayStats::default());
        tokio::spawn(run_relay(receiver, stats.clone()));
        Self { commands, stats }
    }

    /// Register a new connection in the active set
    pub fn connect(&self) -> RelaySubscriber {
        let id = Uuid::new_v4().to_string();
        let (outbox, frames) = mpsc::channel(OUTBOX_CAPACITY);
        self.send(RelayCommand::Connect {
            id: id.clone(),
            outbox,
        });
        RelaySubscriber { id, frames }
    }

    /// Remove a connection from the active set
    pub fn disconnect(&self, id: &str) {
        self.send(RelayCommand::Disconnect { id: id.to_string() });
    }

    /// Publish a payload from inside the process
    pub fn publish(&self, channel: Channel, payload: Box<RawValue>) -> Result<()> {
        let frame = RelayFrame::new(channel, payload).encode()?;
        self.commands
            .send(RelayCommand::Publish {
                from: None,
                channel,
                frame: frame.into(),
            })
            .map_err(|_| UsercastError::RelayClosed("relay loop has stopped".to_string()))
    }

    /// Relay a text frame received from connection `from`.
    ///
    /// Frames that cannot be read as `{channel, payload}` or name an unknown
    /// channel are dropped; the payload itself is never inspected.
    pub fn publish_text(&self, from: &str, text: &str) {
        let frame = match RelayFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Dropping unreadable frame from {}: {}", from, e);
                return;
            }
        };
        let Some(channel) = frame.known_channel() else {
            tracing::debug!("Dropping frame on unknown channel {:?} from {}", frame.channel, from);
            return;
        };
        match frame.encode() {
            Ok(encoded) => self.send(RelayCommand::Publish {
                from: Some(from.to_string()),
                channel,
                frame: encoded.into(),
            }),
            Err(e) => tracing::warn!("Failed to encode frame from {}: {}", from, e),
        }
    }

    /// Wait until every command sent so far has been processed
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(RelayCommand::Flush(tx));
        let _ = rx.await;
    }

    /// Get number of connected clients
    pub fn client_count(&self) -> usize {
        self.stats.clients.load(Ordering::Relaxed)
    }

    /// Number of frames relayed since start
    pub fn relayed_count(&self) -> u64 {
        self.stats.relayed.load(Ordering::Relaxed)
    }

    fn send(&self, command: RelayCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Relay loop has stopped; command dropped");
        }
    }
}

async fn run_relay(mut commands: mpsc::UnboundedReceiver<RelayCommand>, stats: Arc<RelayStats>) {
    let mut connections: HashMap<ConnectionId, Outbox> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            RelayCommand::Connect { id, outbox } => {
                connections.insert(id, outbox);
            }
            RelayCommand::Publish {
                from,
                channel,
                frame,
            } => {
                let delivered = fan_out(&mut connections, &frame);
                stats.relayed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    channel = %channel,
                    from = from.as_deref().unwrap_or("local"),
                    delivered,
                    "Relayed frame"
                );
            }
            RelayCommand::Disconnect { id } => {
                connections.remove(&id);
            }
            RelayCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
        stats.clients.store(connections.len(), Ordering::Relaxed);
    }

    tracing::info!("Relay loop stopped");
}

/// Queue `frame` on every open connection, dropping the ones that have gone
/// or stopped reading
fn fan_out(connections: &mut HashMap<ConnectionId, Outbox>, frame: &Arc<str>) -> usize {
    connections.retain(|id, outbox| match outbox.try_send(Arc::clone(frame)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Dropping stalled connection {} ({} frames queued)", id, OUTBOX_CAPACITY);
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("Dropping closed connection {}", id);
            false
        }
    });
    connections.len()
}

/// Routes for the relay: `/cable` upgrades and `/health`
pub fn relay_router(hub: RelayHub) -> Router {
    Router::new()
        .route(CABLE_PATH, get(cable_handler))
        .route("/health", get(health_handler))
        .with_state(hub)
}

/// Health check endpoint
async fn health_handler(State(hub): State<RelayHub>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "clients": hub.client_count(),
        "relayed": hub.relayed_count(),
    }))
}

/// WebSocket upgrade handler
async fn cable_handler(ws: WebSocketUpgrade, State(hub): State<RelayHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, hub: RelayHub) {
    let RelaySubscriber { id, mut frames } = hub.connect();
    tracing::info!("Client connected: {}", id);

    let (mut sender, mut receiver) = socket.split();

    // Forward fanned-out frames to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    // Every text frame from the client is a publish
    let conn_id = id.clone();
    let publisher = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => publisher.publish_text(&conn_id, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.disconnect(&id);
    tracing::info!("Client disconnected: {}", id);
}
