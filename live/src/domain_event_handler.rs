use crate::message::{LiveUpdate, Message as LiveMessage, MessageScope, UpdateKind};
use crate::Manager;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use serde_json::json;
use std::sync::Arc;

/// Handles domain events by converting them to live updates and routing them
/// to the subscriber of the affected task.
///
/// Server-wide events (shutdown) are broadcast to every connection instead.
pub struct LiveUpdateEventHandler {
    live_manager: Arc<Manager>,
}

impl LiveUpdateEventHandler {
    pub fn new(live_manager: Arc<Manager>) -> Self {
        Self { live_manager }
    }

    fn to_message(event: &DomainEvent) -> LiveMessage {
        let update = match event {
            DomainEvent::TaskCreated { task_id, task } => {
                LiveUpdate::for_task(task_id.as_str(), UpdateKind::Status, "Task created")
                    .with_data(task.clone())
            }
            DomainEvent::TaskStatusChanged { task_id, status } => LiveUpdate::for_task(
                task_id.as_str(),
                UpdateKind::Status,
                format!("Task {status}"),
            )
            .with_data(json!({ "status": status })),
            DomainEvent::TaskDeleted { task_id } => {
                LiveUpdate::for_task(task_id.as_str(), UpdateKind::Status, "Task deleted")
            }
            DomainEvent::ServerShutdown { reason } => {
                LiveUpdate::new(UpdateKind::Notice, reason.as_str())
            }
        };

        let scope = match event.task_id() {
            Some(task_id) => MessageScope::Task {
                task_id: task_id.to_string(),
            },
            None => MessageScope::Broadcast,
        };

        LiveMessage { update, scope }
    }
}

#[async_trait]
impl EventHandler for LiveUpdateEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event.task_id() {
            Some(task_id) => debug!("Routing {event:?} to the subscriber of task {task_id}"),
            None => debug!("Broadcasting {event:?}"),
        }
        self.live_manager.send_message(Self::to_message(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Scope;
    use events::{EventPublisher, TaskStatus};
    use serde_json::Value;

    #[tokio::test]
    async fn status_change_reaches_only_the_task_subscriber() {
        let manager = Arc::new(Manager::new());
        let (watcher, mut watcher_outbox) = manager.open_session();
        let (other, mut other_outbox) = manager.open_session();
        manager.register_connection(Scope::Task("task-1".to_string()), watcher);
        manager.register_connection(Scope::Task("task-2".to_string()), other.clone());

        let publisher =
            EventPublisher::new().with_handler(Arc::new(LiveUpdateEventHandler::new(manager.clone())));
        publisher
            .publish(DomainEvent::TaskStatusChanged {
                task_id: "task-1".to_string(),
                status: TaskStatus::Paused,
            })
            .await;

        let frame: Value = serde_json::from_str(&watcher_outbox.next().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "status");
        assert_eq!(frame["task_id"], "task-1");
        assert_eq!(frame["message"], "Task paused");
        assert_eq!(frame["data"]["status"], "paused");

        other.close();
        assert_eq!(other_outbox.next().await, None);
    }

    #[tokio::test]
    async fn shutdown_is_broadcast_to_every_connection() {
        let manager = Arc::new(Manager::new());
        let (keyed, mut keyed_outbox) = manager.open_session();
        let (unkeyed, mut unkeyed_outbox) = manager.open_session();
        manager.register_connection(Scope::Task("task-1".to_string()), keyed);
        manager.register_connection(Scope::Unkeyed, unkeyed);

        LiveUpdateEventHandler::new(manager.clone())
            .handle(&DomainEvent::ServerShutdown {
                reason: "Server is shutting down".to_string(),
            })
            .await;

        for outbox in [&mut keyed_outbox, &mut unkeyed_outbox] {
            let frame: Value = serde_json::from_str(&outbox.next().await.unwrap()).unwrap();
            assert_eq!(frame["type"], "notice");
            assert_eq!(frame["message"], "Server is shutting down");
        }
    }

    #[test]
    fn created_event_carries_the_submitted_task() {
        let message = LiveUpdateEventHandler::to_message(&DomainEvent::TaskCreated {
            task_id: "task-7".to_string(),
            task: json!({"pair": "GBP/JPY"}),
        });

        assert!(matches!(message.scope, MessageScope::Task { ref task_id } if task_id == "task-7"));
        assert_eq!(message.update.data, Some(json!({"pair": "GBP/JPY"})));
    }
}
