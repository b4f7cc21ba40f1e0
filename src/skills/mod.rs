//! Skill trait and per-agent skill registry.
//!
//! A skill is an opaque unit of business logic with a declared input/output
//! shape. The runtime resolves skills by id at dispatch time; execution is
//! otherwise opaque beyond the cooperative-cancellation checkpoint
//! convention carried by [`SkillContext`].

/// Echo skill, returns its input unchanged.
pub mod echo;
/// Sleep skill with cooperative cancellation checkpoints.
pub mod sleep;

use crate::types::{AppError, Result, SkillDescriptor};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execution context handed to a skill handler.
///
/// Handlers are expected to call [`SkillContext::checkpoint`] at natural
/// suspension points; a handler that never does will run to completion or
/// until the hard task timeout fires.
#[derive(Debug, Clone)]
pub struct SkillContext {
    /// Id of the task being executed.
    pub task_id: String,
    /// Id of the owning agent.
    pub agent_id: String,
    /// Cooperative cancellation signal for this task.
    pub cancellation: CancellationToken,
}

impl SkillContext {
    /// Cooperative cancellation checkpoint. Returns an error once the task
    /// has been asked to stop; the runtime maps any error returned while the
    /// token is cancelled to the `canceled` state.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            Err(AppError::Internal(format!(
                "task {} stopped at cancellation checkpoint",
                self.task_id
            )))
        } else {
            Ok(())
        }
    }
}

/// A named, schema-described unit of work an agent can execute.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Skill id, unique within the owning agent.
    fn id(&self) -> &str;
    /// Human-readable name.
    fn name(&self) -> &str;
    /// What the skill does.
    fn description(&self) -> &str;
    /// JSON schema describing accepted input.
    fn input_schema(&self) -> Value;
    /// JSON schema describing produced output.
    fn output_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    /// Example inputs.
    fn examples(&self) -> Vec<Value> {
        Vec::new()
    }
    /// Tags for discovery.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }
    /// Execute the skill against an input payload.
    async fn execute(&self, input: Value, ctx: &SkillContext) -> Result<Value>;
}

/// Build the wire descriptor for a skill.
fn descriptor_of(skill: &dyn Skill) -> SkillDescriptor {
    SkillDescriptor {
        id: skill.id().to_string(),
        name: skill.name().to_string(),
        description: skill.description().to_string(),
        input_schema: skill.input_schema(),
        output_schema: skill.output_schema(),
        examples: skill.examples(),
        tags: skill.tags(),
    }
}

/// Maps skill ids to executable handlers and their declared schemas.
///
/// Registration is idempotent by id: re-registering replaces the handler.
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Arc<dyn Skill>>>,
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            skills: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the built-in skills (echo, sleep).
    pub fn with_builtin_skills() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(echo::EchoSkill));
        registry.register(Arc::new(sleep::SleepSkill));
        registry
    }

    /// Register a skill, replacing any previous handler with the same id.
    pub fn register(&self, skill: Arc<dyn Skill>) {
        self.skills.write().insert(skill.id().to_string(), skill);
    }

    /// Unregister a skill by id. Returns whether it was present.
    pub fn unregister(&self, skill_id: &str) -> bool {
        self.skills.write().remove(skill_id).is_some()
    }

    /// Resolve a handler by id.
    pub fn lookup(&self, skill_id: &str) -> Result<Arc<dyn Skill>> {
        self.skills
            .read()
            .get(skill_id)
            .cloned()
            .ok_or_else(|| AppError::SkillNotFound(skill_id.to_string()))
    }

    /// Whether a skill is registered.
    pub fn has_skill(&self, skill_id: &str) -> bool {
        self.skills.read().contains_key(skill_id)
    }

    /// Wire descriptors for every registered skill, sorted by id.
    pub fn descriptors(&self) -> Vec<SkillDescriptor> {
        let mut out: Vec<SkillDescriptor> = self
            .skills
            .read()
            .values()
            .map(|s| descriptor_of(s.as_ref()))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Ids of all registered skills.
    pub fn skill_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.skills.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_starts_empty() {
        let registry = SkillRegistry::new();
        assert!(registry.skill_ids().is_empty());
    }

    #[test]
    fn builtin_skills_are_registered() {
        let registry = SkillRegistry::with_builtin_skills();
        assert!(registry.has_skill("echo"));
        assert!(registry.has_skill("sleep"));
    }

    #[test]
    fn descriptors_carry_schemas() {
        let registry = SkillRegistry::with_builtin_skills();
        for descriptor in registry.descriptors() {
            assert!(!descriptor.id.is_empty());
            assert!(!descriptor.description.is_empty());
            assert!(descriptor.input_schema.is_object());
        }
    }

    #[test]
    fn register_is_idempotent_by_id() {
        let registry = SkillRegistry::new();
        registry.register(Arc::new(echo::EchoSkill));
        registry.register(Arc::new(echo::EchoSkill));
        assert_eq!(registry.skill_ids(), vec!["echo".to_string()]);
    }

    #[test]
    fn unregister_removes_the_handler() {
        let registry = SkillRegistry::with_builtin_skills();
        assert!(registry.unregister("echo"));
        assert!(!registry.has_skill("echo"));
        assert!(!registry.unregister("echo"));
        assert!(registry.lookup("echo").is_err());
    }

    #[tokio::test]
    async fn echo_roundtrip() {
        let registry = SkillRegistry::with_builtin_skills();
        let skill = registry.lookup("echo").unwrap();
        let ctx = SkillContext {
            task_id: "t-1".into(),
            agent_id: "a-1".into(),
            cancellation: CancellationToken::new(),
        };
        let out = skill.execute(json!({"text": "hi"}), &ctx).await.unwrap();
        assert_eq!(out, json!({"text": "hi"}));
    }

    #[test]
    fn checkpoint_trips_after_cancellation() {
        let token = CancellationToken::new();
        let ctx = SkillContext {
            task_id: "t-1".into(),
            agent_id: "a-1".into(),
            cancellation: token.clone(),
        };
        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(ctx.checkpoint().is_err());
    }
}
