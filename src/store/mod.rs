//! In-memory task store.
//!
//! The store is the single source of truth for task state and the only piece
//! of shared mutable state between the gateway, the runtime and the
//! streaming channel. All mutation funnels through [`TaskStore::transition`],
//! which is atomic per task id (one entry lock per task) and rejects any
//! edge that is not part of the lifecycle graph with a conflict instead of
//! silently applying it.

use crate::types::{
    AppError, Result, StatusChange, Task, TaskError, TaskStatus,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Parameters for creating a task record.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Caller-generated id; a v4 UUID is assigned when absent.
    pub id: Option<String>,
    /// Owning agent.
    pub agent_id: String,
    /// Skill the task will execute.
    pub skill_id: String,
    /// Input payload.
    pub input: Value,
}

/// Payload committed together with a transition. Output is only applied on
/// `completed`, error only on `failed`.
#[derive(Debug, Clone, Default)]
pub struct TransitionOutcome {
    /// Output payload for `completed`.
    pub output: Option<Value>,
    /// Structured error for `failed`.
    pub error: Option<TaskError>,
}

impl TransitionOutcome {
    /// Outcome carrying no payload.
    pub fn none() -> Self {
        Self::default()
    }

    /// Outcome for a successful completion.
    pub fn completed(output: Value) -> Self {
        Self {
            output: Some(output),
            error: None,
        }
    }

    /// Outcome for a failure.
    pub fn failed(error: TaskError) -> Self {
        Self {
            output: None,
            error: Some(error),
        }
    }
}

/// Filter for [`TaskStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks in this status.
    pub status: Option<TaskStatus>,
    /// Only tasks executing this skill.
    pub skill_id: Option<String>,
}

/// In-memory record of task state and history.
///
/// The outer map is read-locked for lookups; each task sits behind its own
/// mutex so concurrent `transition` calls on the same id serialize while
/// unrelated tasks proceed independently.
pub struct TaskStore {
    tasks: RwLock<HashMap<String, Arc<Mutex<Task>>>>,
    record_history: bool,
}

impl TaskStore {
    /// Create a store. `record_history` mirrors the agent's
    /// `stateTransitionHistory` capability flag.
    pub fn new(record_history: bool) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            record_history,
        }
    }

    /// Create a task in the `submitted` state. Rejects a duplicate id with
    /// a conflict.
    pub fn create(&self, new: NewTask) -> Result<Task> {
        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();
        let mut task = Task {
            id: id.clone(),
            agent_id: new.agent_id,
            skill_id: new.skill_id,
            input: new.input,
            status: TaskStatus::Submitted,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            cancel_requested: false,
        };
        if self.record_history {
            task.history.push(StatusChange {
                status: TaskStatus::Submitted,
                at: now,
            });
        }

        let mut tasks = self.tasks.write();
        if tasks.contains_key(&id) {
            return Err(AppError::TaskConflict(format!(
                "task {id} already exists"
            )));
        }
        tasks.insert(id, Arc::new(Mutex::new(task.clone())));
        Ok(task)
    }

    /// Fetch a committed snapshot of a task.
    pub fn get(&self, id: &str) -> Result<Task> {
        let entry = self.entry(id)?;
        let task = entry.lock();
        Ok(task.clone())
    }

    /// Atomically apply `current -> next` for one task. Illegal edges are
    /// rejected with [`AppError::TaskConflict`] and leave the record
    /// untouched.
    pub fn transition(
        &self,
        id: &str,
        next: TaskStatus,
        outcome: TransitionOutcome,
    ) -> Result<Task> {
        let entry = self.entry(id)?;
        let mut task = entry.lock();

        if !task.status.can_transition_to(next) {
            return Err(AppError::TaskConflict(format!(
                "task {id}: illegal transition {} -> {}",
                task.status, next
            )));
        }

        let now = Utc::now();
        task.status = next;
        task.updated_at = now;
        match next {
            TaskStatus::Completed => task.output = outcome.output,
            TaskStatus::Failed => task.error = outcome.error,
            _ => {}
        }
        if self.record_history {
            task.history.push(StatusChange { status: next, at: now });
        }
        Ok(task.clone())
    }

    /// Mark cancellation as requested and return the current snapshot. The
    /// actual transition to `canceled` is committed by the execution context
    /// once it acknowledges the stop.
    pub fn request_cancel(&self, id: &str) -> Result<Task> {
        let entry = self.entry(id)?;
        let mut task = entry.lock();
        if !task.status.is_terminal() {
            task.cancel_requested = true;
        }
        Ok(task.clone())
    }

    /// Whether cancellation has been requested for a task.
    pub fn cancel_requested(&self, id: &str) -> Result<bool> {
        let entry = self.entry(id)?;
        let task = entry.lock();
        Ok(task.cancel_requested)
    }

    /// List committed task snapshots matching the filter.
    pub fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        let tasks = self.tasks.read();
        let mut out: Vec<Task> = tasks
            .values()
            .map(|entry| entry.lock().clone())
            .filter(|task| {
                filter.status.is_none_or(|s| task.status == s)
                    && filter
                        .skill_id
                        .as_deref()
                        .is_none_or(|sk| task.skill_id == sk)
            })
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the store holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    fn entry(&self, id: &str) -> Result<Arc<Mutex<Task>>> {
        self.tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::TaskNotFound(id.to_string()))
    }
}
