//! WebSocket endpoints for live updates.
//!
//! The registry and delivery logic live in the `live` crate; this module only
//! accepts connections and runs each session's read/write loops.

pub mod handler;
mod session;
