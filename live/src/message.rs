use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Discriminator carried in the `type` field of every live update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Status,
    Progress,
    Log,
    Result,
    Error,
    Notice,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Status => "status",
            UpdateKind::Progress => "progress",
            UpdateKind::Log => "log",
            UpdateKind::Result => "result",
            UpdateKind::Error => "error",
            UpdateKind::Notice => "notice",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single push to a client. Built by the producer, serialized once per
/// delivery attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub message: String,
    /// Completion percentage, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl LiveUpdate {
    pub fn new(kind: UpdateKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: None,
            message: message.into(),
            progress: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// An update addressed to the subscriber of `task_id`.
    pub fn for_task(task_id: impl Into<String>, kind: UpdateKind, message: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::new(kind, message)
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress.clamp(0.0, 100.0));
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Frames the session handler writes on its own behalf.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once, right after the session is registered.
    Connection {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Reply to an inbound frame on an unkeyed session.
    Echo {
        received: Value,
        timestamp: DateTime<Utc>,
    },
}

impl ServerFrame {
    pub fn connection(message: impl Into<String>) -> Self {
        ServerFrame::Connection {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn echo(received: Value) -> Self {
        ServerFrame::Echo {
            received,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub update: LiveUpdate,
    pub scope: MessageScope,
}

#[derive(Debug, Clone)]
pub enum MessageScope {
    /// Send to the connection subscribed to a specific task
    Task { task_id: String },
    /// Send to all connections
    Broadcast,
}
