use crate::error::Error;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

pub use events::TaskId;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a session is addressed once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Single subscriber for one task. Reachable by `send` and `broadcast`.
    Task(TaskId),
    /// No task identity. Reachable by `broadcast` only.
    Unkeyed,
}

impl Scope {
    /// Keyed scope for a non-blank id, unkeyed otherwise.
    pub fn from_task_id(task_id: Option<String>) -> Self {
        match task_id {
            Some(id) if !id.trim().is_empty() => Scope::Task(id),
            _ => Scope::Unkeyed,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Scope::Task(id) => Some(id),
            Scope::Unkeyed => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scope::Task(id) => write!(f, "task {id}"),
            Scope::Unkeyed => write!(f, "broadcast"),
        }
    }
}

/// Write handle for one client connection.
///
/// Frames are queued onto a bounded channel drained by the single task that
/// owns the socket, so two producers never interleave writes on one socket.
/// Cloning the handle does not duplicate the connection.
#[derive(Debug, Clone)]
pub struct Session {
    id: ConnectionId,
    sender: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

/// Receiving half of a [`Session`], owned by the socket writer task.
#[derive(Debug)]
pub struct Outbox {
    receiver: mpsc::Receiver<String>,
    shutdown: Arc<Notify>,
    closing: bool,
}

impl Session {
    /// Create a session handle and the outbox its writer drains.
    pub fn channel(capacity: usize) -> (Session, Outbox) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let shutdown = Arc::new(Notify::new());

        let session = Session {
            id: ConnectionId::new(),
            sender,
            shutdown: shutdown.clone(),
        };
        let outbox = Outbox {
            receiver,
            shutdown,
            closing: false,
        };

        (session, outbox)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue one text frame without waiting.
    pub fn deliver(&self, frame: String) -> Result<(), Error> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::Backpressure {
                capacity: self.sender.max_capacity(),
            },
            TrySendError::Closed(_) => Error::Closed,
        })
    }

    /// Ask the writer to flush what is already queued and close the socket.
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// True once the writer side has dropped its outbox.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Outbox {
    /// Next frame to write, or `None` when the session is finished.
    ///
    /// After [`Session::close`] no new frames are accepted; frames queued
    /// before the close are still returned. Cancel safe, so it can sit in a
    /// `select!` next to other writer work.
    pub async fn next(&mut self) -> Option<String> {
        if !self.closing {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    self.closing = true;
                    self.receiver.close();
                }
                frame = self.receiver.recv() => return frame,
            }
        }
        self.receiver.recv().await
    }
}

#[derive(Debug)]
struct Entry {
    scope: Scope,
    session: Session,
}

/// Connection registry with dual indices for O(1) lookups
///
/// `connections` holds every live session (the broadcast set); `task_index`
/// maps a task id to the single connection subscribed to it.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: DashMap<ConnectionId, Entry>,

    /// Secondary index: task_id -> subscribed connection - O(1)
    task_index: DashMap<TaskId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            task_index: DashMap::new(),
        }
    }

    /// Register a session - O(1)
    ///
    /// For a task scope, a session already registered under the same task id
    /// is detached and returned so the caller can close it.
    pub fn register(&self, scope: Scope, session: Session) -> Option<Session> {
        let connection_id = session.id().clone();

        self.connections.insert(
            connection_id.clone(),
            Entry {
                scope: scope.clone(),
                session,
            },
        );

        match scope {
            Scope::Task(task_id) => {
                let superseded = self.task_index.insert(task_id, connection_id.clone())?;
                if superseded == connection_id {
                    return None;
                }
                self.connections
                    .remove(&superseded)
                    .map(|(_, entry)| entry.session)
            }
            Scope::Unkeyed => None,
        }
    }

    /// Unregister a connection - O(1). Absent ids are ignored.
    ///
    /// The task index entry is only cleared if it still points at this
    /// connection, so a superseded session cannot evict its replacement.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Session> {
        let (_, entry) = self.connections.remove(connection_id)?;

        if let Scope::Task(task_id) = &entry.scope {
            self.task_index
                .remove_if(task_id, |_, current| current == connection_id);
        }

        Some(entry.session)
    }

    /// The session currently subscribed to `task_id`.
    pub fn lookup(&self, task_id: &str) -> Option<Session> {
        // Clone out of the index guard before touching the other map.
        let connection_id = self.task_index.get(task_id).map(|e| e.value().clone())?;
        self.connections
            .get(&connection_id)
            .map(|entry| entry.session.clone())
    }

    pub fn is_registered(&self, task_id: &str) -> bool {
        self.lookup(task_id).is_some()
    }

    /// Every live session at call time. Entries may go stale before use.
    pub fn snapshot(&self) -> Vec<Session> {
        self.connections
            .iter()
            .map(|entry| entry.value().session.clone())
            .collect()
    }

    /// Remove every session, returning them for closing.
    pub fn drain(&self) -> Vec<Session> {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.unregister(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of tasks with a subscribed session.
    pub fn task_count(&self) -> usize {
        self.task_index.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
