//! Agent runtime: task lifecycle ownership, bounded worker pool,
//! cancellation and timeouts.
//!
//! The runtime is the only component that transitions tasks. Submissions
//! enter a FIFO queue consumed by a fixed pool of workers; each accepted
//! task executes in its own unit of work under a per-task hard timeout and
//! a cooperative cancellation token. Handler failures are caught and
//! committed as `failed` transitions with a structured error; they never
//! escape the worker.

/// Per-task event fan-out consumed by the streaming endpoint.
pub mod events;

use crate::skills::{SkillContext, SkillRegistry};
use crate::store::{NewTask, TaskFilter, TaskStore, TransitionOutcome};
use crate::types::{AppError, Result, Task, TaskError, TaskErrorKind, TaskStatus};
use events::TaskEvents;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runtime tuning knobs, sourced from configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Id of the owning agent, stamped on every task.
    pub agent_id: String,
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Queue-depth limit; `None` queues without bound.
    pub queue_depth: Option<usize>,
    /// Hard per-task execution timeout.
    pub task_timeout: Duration,
    /// Record per-task transition history.
    pub record_history: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            agent_id: "agent".to_string(),
            worker_count: 4,
            queue_depth: None,
            task_timeout: Duration::from_secs(30),
            record_history: true,
        }
    }
}

/// Owns the task lifecycle for one agent process.
pub struct AgentRuntime {
    config: RuntimeConfig,
    store: TaskStore,
    skills: Arc<SkillRegistry>,
    events: TaskEvents,
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    pending: AtomicUsize,
    tokens: RwLock<HashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    /// Create the runtime and spawn its worker pool.
    pub fn start(config: RuntimeConfig, skills: Arc<SkillRegistry>) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            store: TaskStore::new(config.record_history),
            skills,
            events: TaskEvents::new(),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            pending: AtomicUsize::new(0),
            tokens: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            config,
        });
        runtime.spawn_workers();
        runtime
    }

    fn spawn_workers(self: &Arc<Self>) {
        // The receiver is shared; whichever worker grabs the lock next pulls
        // the next task id, which preserves FIFO pickup order.
        let shared_rx = {
            let mut slot = self.queue_rx.try_lock().expect("queue receiver taken");
            Arc::new(Mutex::new(slot.take().expect("worker pool already started")))
        };
        for worker in 0..self.config.worker_count.max(1) {
            let runtime = Arc::clone(self);
            let rx = Arc::clone(&shared_rx);
            tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            task_id = rx.recv() => task_id,
                            _ = runtime.shutdown.cancelled() => None,
                        }
                    };
                    let Some(task_id) = next else { break };
                    runtime.pending.fetch_sub(1, Ordering::SeqCst);
                    runtime.run_task(&task_id).await;
                }
                debug!(worker, "runtime worker stopped");
            });
        }
    }

    /// Submit a task for execution. Validates the skill id up front, applies
    /// the queue-depth limit, and enqueues FIFO.
    pub fn submit(
        &self,
        skill_id: &str,
        input: Value,
        task_id: Option<String>,
    ) -> Result<Task> {
        // Unknown skills are a protocol error at submission time, not a
        // failed task.
        self.skills.lookup(skill_id)?;

        // Reserve the queue slot atomically so concurrent submissions
        // cannot race past the depth limit.
        self.reserve_slot()?;

        let task = match self.store.create(NewTask {
            id: task_id,
            agent_id: self.config.agent_id.clone(),
            skill_id: skill_id.to_string(),
            input,
        }) {
            Ok(task) => task,
            Err(err) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(err);
            }
        };

        self.events.open(&task.id);
        self.tokens
            .write()
            .insert(task.id.clone(), CancellationToken::new());
        if self.queue_tx.send(task.id.clone()).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::Internal("runtime is shut down".to_string()));
        }

        info!(task_id = %task.id, skill = %task.skill_id, "task submitted");
        Ok(task)
    }

    fn reserve_slot(&self) -> Result<()> {
        match self.config.queue_depth {
            Some(limit) => self
                .pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < limit).then_some(n + 1)
                })
                .map(|_| ())
                .map_err(|_| {
                    AppError::Capacity(format!("task queue at depth limit ({limit})"))
                }),
            None => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Fetch a committed task snapshot.
    pub fn get(&self, task_id: &str) -> Result<Task> {
        self.store.get(task_id)
    }

    /// List tasks matching the filter.
    pub fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        self.store.list(filter)
    }

    /// Request cancellation of a task.
    ///
    /// Cancelling a terminal task is a no-op that returns the existing
    /// record. A task still in the queue is committed to `canceled`
    /// directly; a `working` task is signalled cooperatively and keeps its
    /// state until the handler acknowledges the stop.
    pub fn cancel(&self, task_id: &str) -> Result<Task> {
        let snapshot = self.store.request_cancel(task_id)?;
        if snapshot.status.is_terminal() {
            return Ok(snapshot);
        }

        if snapshot.status == TaskStatus::Submitted {
            match self
                .store
                .transition(task_id, TaskStatus::Canceled, TransitionOutcome::none())
            {
                Ok(task) => {
                    self.events.publish(&task);
                    self.drop_token(task_id);
                    info!(task_id, "task canceled before pickup");
                    return Ok(task);
                }
                // Lost the race against a worker pickup; fall through to the
                // cooperative path.
                Err(AppError::TaskConflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(token) = self.tokens.read().get(task_id) {
            token.cancel();
        }
        self.store.get(task_id)
    }

    /// Current committed snapshot plus a live event receiver. The receiver
    /// is `None` once the task is terminal; the snapshot then carries the
    /// final state.
    pub fn subscribe(&self, task_id: &str) -> Result<(Task, Option<broadcast::Receiver<Task>>)> {
        // Subscribe before snapshotting so a transition between the two is
        // seen on the channel rather than lost.
        let receiver = self.events.subscribe(task_id);
        let snapshot = self.store.get(task_id)?;
        if snapshot.status.is_terminal() {
            return Ok((snapshot, None));
        }
        Ok((snapshot, receiver))
    }

    /// Block until the task reaches a terminal state, bounded by `limit`.
    /// Used by the MCP bridge for synchronous tool calls.
    pub async fn wait_for_terminal(&self, task_id: &str, limit: Duration) -> Result<Task> {
        let (snapshot, receiver) = self.subscribe(task_id)?;
        if snapshot.status.is_terminal() {
            return Ok(snapshot);
        }
        let Some(mut receiver) = receiver else {
            return self.store.get(task_id);
        };

        let wait = async {
            loop {
                match receiver.recv().await {
                    Ok(task) if task.status.is_terminal() => return Ok(task),
                    Ok(_) => continue,
                    // Lagged or closed: re-read the committed state.
                    Err(_) => return self.store.get(task_id),
                }
            }
        };
        match tokio::time::timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TaskTimeout(format!(
                "task {task_id} did not reach a terminal state within {limit:?}"
            ))),
        }
    }

    /// The store-backed number of tasks this runtime has accepted.
    pub fn task_count(&self) -> usize {
        self.store.len()
    }

    /// Agent id stamped on tasks.
    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    /// Hard per-task timeout.
    pub fn task_timeout(&self) -> Duration {
        self.config.task_timeout
    }

    /// Skill registry backing this runtime.
    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    /// Whether the store records per-task transition history.
    pub fn record_history(&self) -> bool {
        self.config.record_history
    }

    /// Stop the worker pool. In-flight handlers are signalled to stop at
    /// their next checkpoint.
    pub fn stop(&self) {
        self.shutdown.cancel();
        for token in self.tokens.read().values() {
            token.cancel();
        }
    }

    // ============= Worker Path =============

    async fn run_task(&self, task_id: &str) {
        let task = match self.store.get(task_id) {
            Ok(task) => task,
            Err(_) => return,
        };
        if task.status.is_terminal() {
            // Canceled while queued; nothing to run.
            self.drop_token(task_id);
            return;
        }

        // Cancel-before-pickup: commit `canceled` without touching the
        // handler.
        if task.cancel_requested {
            if let Ok(canceled) =
                self.store
                    .transition(task_id, TaskStatus::Canceled, TransitionOutcome::none())
            {
                self.events.publish(&canceled);
            }
            self.drop_token(task_id);
            return;
        }

        let working = match self.store.transition(
            task_id,
            TaskStatus::Working,
            TransitionOutcome::none(),
        ) {
            Ok(task) => task,
            // Concurrent cancel won the race.
            Err(_) => {
                self.drop_token(task_id);
                return;
            }
        };
        self.events.publish(&working);

        let token = self
            .tokens
            .read()
            .get(task_id)
            .cloned()
            .unwrap_or_default();
        let outcome = self.execute(&working, token.clone()).await;
        self.commit(task_id, outcome, &token);
        self.drop_token(task_id);
    }

    async fn execute(&self, task: &Task, token: CancellationToken) -> Result<Value> {
        let skill = self.skills.lookup(&task.skill_id)?;
        let ctx = SkillContext {
            task_id: task.id.clone(),
            agent_id: task.agent_id.clone(),
            cancellation: token.clone(),
        };
        match tokio::time::timeout(
            self.config.task_timeout,
            skill.execute(task.input.clone(), &ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                // Best-effort signal; the handler future is already dropped.
                token.cancel();
                Err(AppError::TaskTimeout(format!(
                    "execution exceeded {:?}",
                    self.config.task_timeout
                )))
            }
        }
    }

    fn commit(&self, task_id: &str, outcome: Result<Value>, token: &CancellationToken) {
        let committed = match outcome {
            Ok(output) => self.store.transition(
                task_id,
                TaskStatus::Completed,
                TransitionOutcome::completed(output),
            ),
            Err(AppError::TaskTimeout(msg)) => {
                warn!(task_id, "task timed out");
                self.store.transition(
                    task_id,
                    TaskStatus::Failed,
                    TransitionOutcome::failed(TaskError::new(TaskErrorKind::TaskTimeout, msg)),
                )
            }
            // Any handler error returned after the stop signal counts as an
            // acknowledged cancellation.
            Err(_) if token.is_cancelled() => {
                info!(task_id, "task canceled at handler checkpoint");
                self.store
                    .transition(task_id, TaskStatus::Canceled, TransitionOutcome::none())
            }
            Err(AppError::SkillNotFound(skill)) => self.store.transition(
                task_id,
                TaskStatus::Failed,
                TransitionOutcome::failed(TaskError::new(
                    TaskErrorKind::SkillNotFound,
                    format!("skill not found: {skill}"),
                )),
            ),
            Err(AppError::ToolCall(msg)) => self.store.transition(
                task_id,
                TaskStatus::Failed,
                TransitionOutcome::failed(TaskError::new(TaskErrorKind::ToolCall, msg)),
            ),
            Err(err) => self.store.transition(
                task_id,
                TaskStatus::Failed,
                TransitionOutcome::failed(TaskError::new(
                    TaskErrorKind::SkillFailed,
                    err.to_string(),
                )),
            ),
        };

        match committed {
            Ok(task) => self.events.publish(&task),
            Err(err) => error!(task_id, %err, "failed to commit terminal state"),
        }
    }

    fn drop_token(&self, task_id: &str) {
        self.tokens.write().remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::Skill;
    use async_trait::async_trait;
    use serde_json::json;

    /// Counts invocations; used to prove cancel-before-pickup skips the
    /// handler entirely.
    struct CountingSkill {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Skill for CountingSkill {
        fn id(&self) -> &str {
            "counting"
        }
        fn name(&self) -> &str {
            "Counting"
        }
        fn description(&self) -> &str {
            "Counts invocations"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, input: Value, _ctx: &SkillContext) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(input)
        }
    }

    /// Fails every call the way an outbound bridge failure surfaces.
    struct BrokenBridgeSkill;

    #[async_trait]
    impl Skill for BrokenBridgeSkill {
        fn id(&self) -> &str {
            "broken-bridge"
        }
        fn name(&self) -> &str {
            "Broken bridge"
        }
        fn description(&self) -> &str {
            "Always fails with a tool-call error"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value, _ctx: &SkillContext) -> Result<Value> {
            Err(AppError::ToolCall("circuit open for backend".into()))
        }
    }

    fn runtime_with(config: RuntimeConfig) -> (Arc<AgentRuntime>, Arc<AtomicUsize>) {
        let skills = Arc::new(SkillRegistry::with_builtin_skills());
        let calls = Arc::new(AtomicUsize::new(0));
        skills.register(Arc::new(CountingSkill {
            calls: Arc::clone(&calls),
        }));
        (AgentRuntime::start(config, skills), calls)
    }

    fn quick_config() -> RuntimeConfig {
        RuntimeConfig {
            agent_id: "test-agent".into(),
            worker_count: 2,
            queue_depth: None,
            task_timeout: Duration::from_secs(5),
            record_history: true,
        }
    }

    #[tokio::test]
    async fn submit_and_complete() {
        let (runtime, _) = runtime_with(quick_config());
        let task = runtime.submit("echo", json!({"text": "hi"}), None).unwrap();
        assert_eq!(task.status, TaskStatus::Submitted);

        let done = runtime
            .wait_for_terminal(&task.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.output, Some(json!({"text": "hi"})));

        let statuses: Vec<_> = done.history.iter().map(|h| h.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Submitted, TaskStatus::Working, TaskStatus::Completed]
        );
    }

    #[tokio::test]
    async fn unknown_skill_is_rejected_at_submit() {
        let (runtime, _) = runtime_with(quick_config());
        assert!(matches!(
            runtime.submit("nope", Value::Null, None),
            Err(AppError::SkillNotFound(_))
        ));
        assert_eq!(runtime.task_count(), 0);
    }

    #[tokio::test]
    async fn timeout_commits_failed_with_timeout_kind() {
        let mut config = quick_config();
        config.task_timeout = Duration::from_millis(100);
        let (runtime, _) = runtime_with(config);

        let task = runtime
            .submit("sleep", json!({"duration_ms": 500}), None)
            .unwrap();
        let done = runtime
            .wait_for_terminal(&task.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error.unwrap().kind, TaskErrorKind::TaskTimeout);
    }

    #[tokio::test]
    async fn cancel_before_pickup_skips_the_handler() {
        let mut config = quick_config();
        config.worker_count = 1;
        let (runtime, calls) = runtime_with(config);

        // Occupy the single worker so the next submission stays queued.
        let blocker = runtime
            .submit("sleep", json!({"duration_ms": 400}), None)
            .unwrap();
        let queued = runtime.submit("counting", json!({}), None).unwrap();

        let canceled = runtime.cancel(&queued.id).unwrap();
        assert_eq!(canceled.status, TaskStatus::Canceled);

        // Let the blocker finish and the queue drain.
        runtime
            .wait_for_terminal(&blocker.id, Duration::from_secs(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            runtime.get(&queued.id).unwrap().status,
            TaskStatus::Canceled
        );
    }

    #[tokio::test]
    async fn cooperative_cancel_of_working_task() {
        let (runtime, _) = runtime_with(quick_config());
        let task = runtime
            .submit("sleep", json!({"duration_ms": 5000}), None)
            .unwrap();

        // Wait for the worker to pick it up.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if runtime.get(&task.id).unwrap().status == TaskStatus::Working {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "never started");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        runtime.cancel(&task.id).unwrap();
        let done = runtime
            .wait_for_terminal(&task.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Canceled);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_terminal_tasks() {
        let (runtime, _) = runtime_with(quick_config());
        let task = runtime.submit("echo", json!({}), None).unwrap();
        runtime
            .wait_for_terminal(&task.id, Duration::from_secs(2))
            .await
            .unwrap();

        let first = runtime.cancel(&task.id).unwrap();
        let second = runtime.cancel(&task.id).unwrap();
        assert_eq!(first.status, TaskStatus::Completed);
        assert_eq!(second.status, TaskStatus::Completed);
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn overload_without_depth_limit_queues_everything() {
        let mut config = quick_config();
        config.worker_count = 2;
        let (runtime, _) = runtime_with(config);

        let mut ids = Vec::new();
        for _ in 0..4 {
            let task = runtime
                .submit("sleep", json!({"duration_ms": 50}), None)
                .unwrap();
            ids.push(task.id);
        }
        for id in ids {
            let done = runtime
                .wait_for_terminal(&id, Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(done.status, TaskStatus::Completed);
        }
    }

    #[tokio::test]
    async fn depth_limit_fails_fast_with_capacity_error() {
        let mut config = quick_config();
        config.worker_count = 1;
        config.queue_depth = Some(2);
        let (runtime, _) = runtime_with(config);

        // Fill the queue faster than the single worker can drain it.
        let mut accepted = 0;
        let mut capacity_errors = 0;
        for _ in 0..6 {
            match runtime.submit("sleep", json!({"duration_ms": 300}), None) {
                Ok(_) => accepted += 1,
                Err(AppError::Capacity(_)) => capacity_errors += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(accepted >= 2);
        assert!(capacity_errors > 0);
    }

    #[tokio::test]
    async fn tool_call_failure_commits_with_its_own_error_kind() {
        let (runtime, _) = runtime_with(quick_config());
        runtime.skills().register(Arc::new(BrokenBridgeSkill));

        let task = runtime.submit("broken-bridge", json!({}), None).unwrap();
        let done = runtime
            .wait_for_terminal(&task.id, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        let error = done.error.unwrap();
        assert_eq!(error.kind, TaskErrorKind::ToolCall);
        assert!(error.message.contains("circuit open"));
    }

    #[tokio::test]
    async fn concurrent_submissions_never_overshoot_the_depth_limit() {
        let mut config = quick_config();
        config.worker_count = 1;
        config.queue_depth = Some(2);
        let (runtime, _) = runtime_with(config);

        // The current-thread test runtime has not yielded yet, so the
        // worker cannot drain the queue while the submitting threads race.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                std::thread::spawn(move || {
                    runtime
                        .submit("sleep", json!({"duration_ms": 300}), None)
                        .is_ok()
                })
            })
            .collect();
        let accepted = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|accepted| *accepted)
            .count();

        assert_eq!(accepted, 2);
        runtime.stop();
    }

    #[tokio::test]
    async fn caller_supplied_task_id_is_honored() {
        let (runtime, _) = runtime_with(quick_config());
        let task = runtime
            .submit("echo", json!({}), Some("caller-chosen".into()))
            .unwrap();
        assert_eq!(task.id, "caller-chosen");
        assert!(matches!(
            runtime.submit("echo", json!({}), Some("caller-chosen".into())),
            Err(AppError::TaskConflict(_))
        ));
    }

    #[tokio::test]
    async fn late_subscriber_still_observes_terminal_state() {
        let (runtime, _) = runtime_with(quick_config());
        let task = runtime.submit("echo", json!({}), None).unwrap();
        runtime
            .wait_for_terminal(&task.id, Duration::from_secs(2))
            .await
            .unwrap();

        let (snapshot, receiver) = runtime.subscribe(&task.id).unwrap();
        assert!(snapshot.status.is_terminal());
        assert!(receiver.is_none());
    }
}
