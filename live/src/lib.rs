//! WebSocket live-update infrastructure.
//!
//! This crate tracks which client connections are alive and pushes
//! JSON-encoded updates to them, either to the one client watching a task or
//! to every connected client.
//!
//! # Architecture
//!
//! - **Explicit registry**: a `Manager` is constructed at startup and shared
//!   through application state; there is no global connection list.
//! - **Keyed and unkeyed sessions**: a session registered under a task id is
//!   the single subscriber for that task (a later connect for the same id
//!   replaces and closes the earlier one). Unkeyed sessions only receive
//!   broadcasts.
//! - **Best-effort delivery**: `send` and `broadcast` never return errors.
//!   A session that cannot accept a frame is unregistered and closed; an
//!   update nobody is watching is dropped.
//! - **Single writer per socket**: frames are queued onto a bounded
//!   per-session channel drained by the task that owns the socket.
//!
//! # Message Flow
//!
//! 1. Client opens `/ws/{task_id}` (or `/ws` for an unkeyed session)
//! 2. Web layer creates a `Session` and registers it with the `Manager`
//! 3. Task routes publish a `DomainEvent`
//! 4. `LiveUpdateEventHandler` turns it into a `LiveUpdate` and calls
//!    `Manager::send_message`
//! 5. The session's writer task puts the frame on the wire
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry, Session and its Outbox
//! - `manager`: delivery (targeted send, broadcast, pruning)
//! - `message`: LiveUpdate and server frame wire types
//! - `domain_event_handler`: bridge from domain events to live updates
//! - `error`: delivery failure classification

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod manager;
pub mod message;

pub use connection::{ConnectionId, Scope, Session};
pub use manager::{BroadcastReport, Delivery, Manager};
