//! Event fan-out to connected observers.

use crate::model::ServerEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Destination for coordinator events.
///
/// Components receive an `Arc<dyn EventSink>` at construction so tests can
/// substitute an in-memory recorder for the observer fan-out.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ServerEvent);
}

/// A live observer channel. Messages are pre-serialized JSON frames.
#[derive(Debug)]
pub struct ObserverConnection {
    pub id: String,
    tx: mpsc::Sender<Arc<str>>,
}

impl ObserverConnection {
    /// Create a connection with an outbound queue of `capacity` frames.
    pub fn new(id: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id: id.into(), tx }, rx)
    }

    fn deliver(&self, frame: &Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.tx.try_send(Arc::clone(frame))
    }
}

/// Registry of connected observers.
#[derive(Default)]
pub struct EventBus {
    connections: RwLock<HashMap<String, ObserverConnection>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and queue `snapshot()` as its first frame.
    ///
    /// The snapshot is built while the connection set is write-locked, so no
    /// broadcast can land between the snapshot and the registration.
    pub fn register(&self, connection: ObserverConnection, snapshot: impl FnOnce() -> ServerEvent) {
        let mut conns = self.connections.write();
        match serde_json::to_string(&snapshot()) {
            Ok(json) => {
                let frame: Arc<str> = json.into();
                if let Err(e) = connection.deliver(&frame) {
                    warn!(conn_id = %connection.id, error = %e, "failed to queue snapshot, not registering");
                    return;
                }
            }
            Err(e) => warn!(conn_id = %connection.id, error = %e, "failed to serialize snapshot"),
        }
        debug!(conn_id = %connection.id, "observer registered");
        conns.insert(connection.id.clone(), connection);
    }

    pub fn unregister(&self, connection_id: &str) {
        if self.connections.write().remove(connection_id).is_some() {
            debug!(conn_id = connection_id, "observer unregistered");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Serialize once and queue on every connection. Connections whose queue
    /// is closed or full are dropped; the rest are unaffected.
    pub fn broadcast(&self, event: &ServerEvent) {
        let frame: Arc<str> = match serde_json::to_string(event) {
            Ok(j) => j.into(),
            Err(e) => {
                warn!(event_type = event.kind(), error = %e, "failed to serialize event");
                return;
            }
        };
        let mut dead = Vec::new();
        {
            let conns = self.connections.read();
            for conn in conns.values() {
                if let Err(e) = conn.deliver(&frame) {
                    let reason = match e {
                        TrySendError::Full(_) => "queue full",
                        TrySendError::Closed(_) => "closed",
                    };
                    warn!(conn_id = %conn.id, reason, "dropping observer");
                    dead.push(conn.id.clone());
                }
            }
            debug!(
                event_type = event.kind(),
                recipients = conns.len(),
                "broadcast event"
            );
        }
        if !dead.is_empty() {
            let mut conns = self.connections.write();
            for id in &dead {
                conns.remove(id);
            }
        }
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: ServerEvent) {
        self.broadcast(&event);
    }
}
