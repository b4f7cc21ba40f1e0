use crate::skills::{Skill, SkillContext};
use crate::types::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Returns its input unchanged. Used for wiring checks and as the canonical
/// test skill.
pub struct EchoSkill;

#[async_trait]
impl Skill for EchoSkill {
    fn id(&self) -> &str {
        "echo"
    }

    fn name(&self) -> &str {
        "Echo"
    }

    fn description(&self) -> &str {
        "Return the input payload unchanged"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": true
        })
    }

    fn examples(&self) -> Vec<Value> {
        vec![json!({"text": "hello"})]
    }

    fn tags(&self) -> Vec<String> {
        vec!["diagnostic".to_string()]
    }

    async fn execute(&self, input: Value, _ctx: &SkillContext) -> Result<Value> {
        Ok(input)
    }
}
