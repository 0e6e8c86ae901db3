//! 动作结果：技能与外部工具共用的执行上下文与归一化结果

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::UpsertMemoryInput;

/// 执行一次技能或工具时可见的身份与输入
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub tenant_id: String,
    pub user_id: String,
    pub thread_id: String,
    pub trace_id: String,
    pub user_message: String,
    /// 工具白名单；为空表示不限制
    pub allowed_tools: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// 一次技能或工具执行的归一化结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub status: ActionStatus,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_candidates: Vec<UpsertMemoryInput>,
}

impl ActionResult {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Success,
            summary: summary.into(),
            output: None,
            memory_candidates: Vec::new(),
        }
    }

    /// 设置结构化输出；非对象值会被包进 {"value": ...}
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(match output {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        });
        self
    }

    pub fn with_memory(mut self, candidate: UpsertMemoryInput) -> Self {
        self.memory_candidates.push(candidate);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// 截取前 n 个字符（UTF-8 安全），用于派生记忆 key
pub(crate) fn leading_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
