//! Event system infrastructure for the Forex Companion backend.
//!
//! This crate decouples the code that changes task state (HTTP routes, task
//! processing) from the code that tells connected clients about it (the
//! `live` crate).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on other internal crates. Task payloads are
//! carried as serialized JSON values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Task identifiers are opaque, client-visible strings.
pub type TaskId = String;

/// Run state of a task as reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Paused,
    Stopped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain events that represent business-level changes in the system.
/// These events are emitted after the originating operation has completed.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted when a new task is accepted. A client may already be watching
    /// the id it intends to use, so this is routed like any other task event.
    TaskCreated {
        task_id: TaskId,
        /// The task as submitted by the caller.
        task: Value,
    },
    /// Emitted when a task is stopped, paused or resumed.
    TaskStatusChanged { task_id: TaskId, status: TaskStatus },
    /// Emitted when a task is removed.
    TaskDeleted { task_id: TaskId },
    /// Emitted once when the server begins a graceful shutdown.
    /// Every connected client is notified, not only task subscribers.
    ServerShutdown { reason: String },
}

impl DomainEvent {
    /// The task this event is scoped to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::TaskStatusChanged { task_id, .. }
            | DomainEvent::TaskDeleted { task_id } => Some(task_id),
            DomainEvent::ServerShutdown { .. } => None,
        }
    }
}

/// Trait for handling domain events.
/// Implementations can perform side effects like pushing live updates,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are expected to contain their own failures; nothing is returned.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
