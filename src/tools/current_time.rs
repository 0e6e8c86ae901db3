//! current_time：返回当前 UTC 时间（ISO 8601）并回显调用方给出的时区标签

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::registry::ExternalTool;
use super::schema::{parse_args, schema_of, to_args};
use crate::core::{ActionContext, ActionResult, CoreError};

const NAME: &str = "current_time";

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CurrentTimeArgs {
    /// 时区标签，默认 Asia/Shanghai
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

pub struct CurrentTimeTool;

#[async_trait]
impl ExternalTool for CurrentTimeTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "获取当前时间（用于工具链路验证）"
    }

    fn input_schema(&self) -> Value {
        schema_of::<CurrentTimeArgs>()
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(8_000)
    }

    fn retryable(&self) -> bool {
        true
    }

    fn validate(&self, args: &Value) -> Result<Value, CoreError> {
        let parsed: CurrentTimeArgs = parse_args(NAME, args)?;
        to_args(NAME, &parsed)
    }

    async fn execute(&self, _ctx: &ActionContext, args: Value) -> Result<ActionResult, CoreError> {
        let CurrentTimeArgs { timezone } = parse_args(NAME, &args)?;
        let iso = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Ok(ActionResult::success(format!("当前时间（{timezone}）: {iso}"))
            .with_output(json!({ "isoTime": iso, "timezone": timezone })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timezone() {
        let args = CurrentTimeTool.validate(&json!({})).unwrap();
        assert_eq!(args["timezone"], "Asia/Shanghai");
        assert!(CurrentTimeTool.validate(&json!({"timezone": 8})).is_err());
    }

    #[tokio::test]
    async fn test_output_shape() {
        let result = CurrentTimeTool
            .execute(&ActionContext::default(), json!({"timezone": "UTC"}))
            .await
            .unwrap();
        let output = result.output.unwrap();
        assert_eq!(output["timezone"], "UTC");
        assert!(output["isoTime"].as_str().unwrap().ends_with('Z'));
        assert!(result.summary.starts_with("当前时间（UTC）"));
        assert!(result.memory_candidates.is_empty());
    }
}
