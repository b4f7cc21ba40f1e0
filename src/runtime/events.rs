//! Per-task event fan-out for the streaming channel.
//!
//! Every committed transition is published to the task's broadcast channel.
//! Subscribers each hold their own receiver, so a slow or disconnected
//! subscriber lags (and is dropped by the broadcast buffer) without ever
//! blocking the runtime. After the terminal event the sender is removed;
//! existing receivers drain whatever is buffered and then observe the
//! channel closing.

use crate::types::Task;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Per-subscriber buffer depth before lagging subscribers start losing
/// intermediate events. The terminal event is always the last one sent.
const CHANNEL_CAPACITY: usize = 16;

/// Fan-out hub keyed by task id.
pub struct TaskEvents {
    channels: RwLock<HashMap<String, broadcast::Sender<Task>>>,
}

impl Default for TaskEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskEvents {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Open a channel for a newly created task.
    pub fn open(&self, task_id: &str) {
        let mut channels = self.channels.write();
        channels
            .entry(task_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
    }

    /// Publish a committed snapshot to all subscribers of the task.
    /// Fire-and-forget per subscriber; closes the channel after a terminal
    /// event.
    pub fn publish(&self, task: &Task) {
        let terminal = task.status.is_terminal();
        let mut channels = self.channels.write();
        if let Some(sender) = channels.get(&task.id) {
            // Send fails only when nobody is subscribed, which is fine.
            let _ = sender.send(task.clone());
        }
        if terminal {
            channels.remove(&task.id);
        }
    }

    /// Subscribe to live events for a task. Returns `None` once the task has
    /// reached a terminal state and its channel is gone; callers fall back
    /// to the committed snapshot.
    pub fn subscribe(&self, task_id: &str) -> Option<broadcast::Receiver<Task>> {
        self.channels
            .read()
            .get(task_id)
            .map(|sender| sender.subscribe())
    }

    /// Number of tasks with an open channel.
    pub fn open_channels(&self) -> usize {
        self.channels.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewTask, TaskStore, TransitionOutcome};
    use crate::types::TaskStatus;
    use serde_json::Value;

    fn make_task(store: &TaskStore) -> crate::types::Task {
        store
            .create(NewTask {
                id: None,
                agent_id: "a".into(),
                skill_id: "echo".into(),
                input: Value::Null,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn subscribers_see_transitions_in_commit_order() {
        let store = TaskStore::new(true);
        let events = TaskEvents::new();
        let task = make_task(&store);
        events.open(&task.id);

        let mut rx = events.subscribe(&task.id).unwrap();

        let working = store
            .transition(&task.id, TaskStatus::Working, TransitionOutcome::none())
            .unwrap();
        events.publish(&working);
        let done = store
            .transition(
                &task.id,
                TaskStatus::Completed,
                TransitionOutcome::completed(Value::Null),
            )
            .unwrap();
        events.publish(&done);

        assert_eq!(rx.recv().await.unwrap().status, TaskStatus::Working);
        assert_eq!(rx.recv().await.unwrap().status, TaskStatus::Completed);
        // Terminal event closes the channel.
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn channel_is_removed_after_terminal_event() {
        let store = TaskStore::new(true);
        let events = TaskEvents::new();
        let task = make_task(&store);
        events.open(&task.id);
        assert_eq!(events.open_channels(), 1);

        let canceled = store
            .transition(&task.id, TaskStatus::Canceled, TransitionOutcome::none())
            .unwrap();
        events.publish(&canceled);

        assert_eq!(events.open_channels(), 0);
        assert!(events.subscribe(&task.id).is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let store = TaskStore::new(true);
        let events = TaskEvents::new();
        let task = make_task(&store);
        events.open(&task.id);

        let working = store
            .transition(&task.id, TaskStatus::Working, TransitionOutcome::none())
            .unwrap();
        events.publish(&working);
    }
}
