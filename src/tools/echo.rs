//! echo_tool：回显文本，用于工具链路验证

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::registry::ExternalTool;
use super::schema::{parse_args, require_non_empty, schema_of, to_args};
use crate::core::action::leading_chars;
use crate::core::{ActionContext, ActionResult, CoreError};
use crate::memory::{MemorySourceType, MemoryType, UpsertMemoryInput};

const NAME: &str = "echo_tool";

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct EchoArgs {
    /// 要回显的文本（非空）
    pub text: String,
}

pub struct EchoTool;

#[async_trait]
impl ExternalTool for EchoTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "回显文本（用于工具链路验证）"
    }

    fn input_schema(&self) -> Value {
        schema_of::<EchoArgs>()
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(8_000)
    }

    fn validate(&self, args: &Value) -> Result<Value, CoreError> {
        let parsed: EchoArgs = parse_args(NAME, args)?;
        require_non_empty(NAME, "text", &parsed.text)?;
        to_args(NAME, &parsed)
    }

    async fn execute(&self, ctx: &ActionContext, args: Value) -> Result<ActionResult, CoreError> {
        let EchoArgs { text } = parse_args(NAME, &args)?;
        let memory = UpsertMemoryInput::new(
            &ctx.tenant_id,
            &ctx.user_id,
            MemoryType::Fact,
            format!("mcp_echo_{}", leading_chars(&text, 24)),
            text.clone(),
        )
        .thread(&ctx.thread_id)
        .importance(2)
        .tags(["mcp", "echo"])
        .provenance(MemorySourceType::Tool, NAME, 0.95, &ctx.trace_id);

        Ok(ActionResult::success(format!("工具已回显：{text}"))
            .with_output(json!({ "echoedText": text }))
            .with_memory(memory))
    }
}
