use crate::connection::{ConnectionId, ConnectionRegistry, Outbox, Scope, Session};
use crate::error::Error;
use crate::message::{Message as LiveMessage, MessageScope};
use log::*;
use serde::Serialize;
use std::sync::Arc;

/// Outbound frames buffered per session before it is treated as too slow.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Outcome of a targeted send. Failures are already handled; this is
/// informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One frame was queued for the subscriber.
    Delivered,
    /// Nobody is subscribed to the task.
    NoRecipient,
    /// The attempt failed and was logged.
    Failed,
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

pub struct Manager {
    registry: Arc<ConnectionRegistry>,
    outbound_capacity: usize,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_outbound_capacity(DEFAULT_OUTBOUND_CAPACITY)
    }

    pub fn with_outbound_capacity(outbound_capacity: usize) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Create a session sized by this manager's outbound capacity.
    pub fn open_session(&self) -> (Session, Outbox) {
        Session::channel(self.outbound_capacity)
    }

    /// Register a session and return its connection id.
    /// A session this one replaces is closed.
    pub fn register_connection(&self, scope: Scope, session: Session) -> ConnectionId {
        let connection_id = session.id().clone();

        if let Some(superseded) = self.registry.register(scope.clone(), session) {
            info!(
                "Connection {} replaced by {} for {}, closing it",
                superseded.id(),
                connection_id,
                scope
            );
            superseded.close();
        }

        info!(
            "Client connected ({scope}). Total connections: {}",
            self.registry.len()
        );
        connection_id
    }

    /// Unregister a connection by ID. Returns false if it was already gone.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) -> bool {
        match self.registry.unregister(connection_id) {
            Some(_) => {
                info!(
                    "Client disconnected. Total connections: {}",
                    self.registry.len()
                );
                true
            }
            None => {
                debug!("Connection {connection_id} already unregistered");
                false
            }
        }
    }

    pub fn is_registered(&self, task_id: &str) -> bool {
        self.registry.is_registered(task_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Send a message based on its scope
    pub fn send_message(&self, message: LiveMessage) {
        match message.scope {
            MessageScope::Task { task_id } => {
                self.send(&task_id, &message.update);
            }
            MessageScope::Broadcast => {
                self.broadcast(&message.update);
            }
        }
    }

    /// Push `update` to the session subscribed to `task_id`, if any.
    ///
    /// Never fails from the caller's point of view. A session that cannot
    /// take the frame is unregistered and closed.
    pub fn send<M: Serialize + ?Sized>(&self, task_id: &str, update: &M) -> Delivery {
        let Some(session) = self.registry.lookup(task_id) else {
            trace!("No subscriber for task {task_id}, dropping update");
            return Delivery::NoRecipient;
        };

        let result = serde_json::to_string(update)
            .map_err(Error::from)
            .and_then(|frame| session.deliver(frame));

        match result {
            Ok(()) => Delivery::Delivered,
            Err(e) if e.is_session_fault() => {
                self.prune(&session, &e);
                Delivery::Failed
            }
            // A payload that cannot be encoded leaves the subscriber in place.
            Err(e) => {
                error!("Failed to serialize live update for task {task_id}: {e}");
                Delivery::Failed
            }
        }
    }

    /// Push `update` to every live session. Failing sessions are pruned
    /// individually without affecting the rest.
    pub fn broadcast<M: Serialize + ?Sized>(&self, update: &M) -> BroadcastReport {
        let frame = match serde_json::to_string(update) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize broadcast: {e}");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        for session in self.registry.snapshot() {
            match session.deliver(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    self.prune(&session, &e);
                    report.pruned += 1;
                }
            }
        }

        debug!(
            "Broadcast delivered to {} connection(s), pruned {}",
            report.delivered, report.pruned
        );
        report
    }

    /// Close and forget every session. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let sessions = self.registry.drain();
        for session in &sessions {
            session.close();
        }
        sessions.len()
    }

    fn prune(&self, session: &Session, error: &Error) {
        warn!(
            "Failed to send to connection {}: {}. Connection will be cleaned up.",
            session.id(),
            error
        );
        self.registry.unregister(session.id());
        session.close();
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
