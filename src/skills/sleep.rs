use crate::skills::{Skill, SkillContext};
use crate::types::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Granularity of the sleep loop; the checkpoint fires between slices.
const SLICE_MS: u64 = 10;

/// Sleeps for `duration_ms`, checking its cancellation checkpoint between
/// short slices. Exercises timeout and cooperative-cancel paths end to end.
pub struct SleepSkill;

#[async_trait]
impl Skill for SleepSkill {
    fn id(&self) -> &str {
        "sleep"
    }

    fn name(&self) -> &str {
        "Sleep"
    }

    fn description(&self) -> &str {
        "Sleep for the requested number of milliseconds, honoring cancellation"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "duration_ms": { "type": "integer", "minimum": 0 }
            },
            "required": ["duration_ms"]
        })
    }

    fn examples(&self) -> Vec<Value> {
        vec![json!({"duration_ms": 50})]
    }

    fn tags(&self) -> Vec<String> {
        vec!["diagnostic".to_string()]
    }

    async fn execute(&self, input: Value, ctx: &SkillContext) -> Result<Value> {
        let total_ms = input["duration_ms"].as_u64().unwrap_or(0);
        let mut slept_ms = 0u64;

        while slept_ms < total_ms {
            ctx.checkpoint()?;
            let slice = SLICE_MS.min(total_ms - slept_ms);
            tokio::time::sleep(Duration::from_millis(slice)).await;
            slept_ms += slice;
        }

        Ok(json!({"slept_ms": slept_ms}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn ctx(token: CancellationToken) -> SkillContext {
        SkillContext {
            task_id: "t-1".into(),
            agent_id: "a-1".into(),
            cancellation: token,
        }
    }

    #[tokio::test]
    async fn sleeps_for_requested_duration() {
        let out = SleepSkill
            .execute(json!({"duration_ms": 30}), &ctx(CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(out["slept_ms"], 30);
    }

    #[tokio::test]
    async fn stops_at_checkpoint_once_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let result = SleepSkill
            .execute(json!({"duration_ms": 5000}), &ctx(token))
            .await;
        assert!(result.is_err());
    }
}
