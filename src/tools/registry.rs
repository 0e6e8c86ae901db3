//! 外部工具注册表
//!
//! 所有工具实现 ExternalTool（name / description / input_schema / validate / execute），
//! 由 ToolRegistry 按名注册与查找；ToolExecutor 在调用时施加白名单、超时与重试策略。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::{ActionContext, ActionResult, CoreError};

/// 外部工具：通过 `/tool` 指令显式调用
#[async_trait]
pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn input_schema(&self) -> Value;

    /// 单次调用超时（毫秒）；None 时使用执行器默认值
    fn timeout_ms(&self) -> Option<u64> {
        None
    }

    fn retryable(&self) -> bool {
        false
    }

    /// 校验参数并返回规范化后的参数（补齐默认值）
    fn validate(&self, args: &Value) -> Result<Value, CoreError>;

    async fn execute(&self, ctx: &ActionContext, args: Value) -> Result<ActionResult, CoreError>;
}

/// 对外展示的工具描述
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub timeout_ms: u64,
    pub retryable: bool,
}

/// 工具注册表：保持注册顺序，同名后注册者覆盖
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ExternalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置工具 echo_tool 与 current_time
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(super::echo::EchoTool);
        registry.register(super::current_time::CurrentTimeTool);
        registry
    }

    pub fn register(&mut self, tool: impl ExternalTool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn ExternalTool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExternalTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn descriptors(&self, default_timeout_ms: u64) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
                timeout_ms: t.timeout_ms().unwrap_or(default_timeout_ms),
                retryable: t.retryable(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = ToolRegistry::with_builtin();
        assert_eq!(registry.tool_names(), vec!["echo_tool", "current_time"]);
        assert!(registry.get("current_time").unwrap().retryable());
        assert!(registry.get("nope").is_none());

        let descriptors = registry.descriptors(10_000);
        assert_eq!(descriptors[0].timeout_ms, 8_000);
        assert!(descriptors[0].input_schema["properties"].get("text").is_some());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::with_builtin();
        registry.register(crate::tools::echo::EchoTool);
        assert_eq!(registry.tool_names().len(), 2);
    }
}
