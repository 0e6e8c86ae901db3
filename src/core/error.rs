//! 核心错误类型
//!
//! 组件边界统一返回 CoreError；编排管线的每个阶段把错误就地转成 TurnState 字段或安全默认值，
//! 只有契约违例（如 delete 不带选择器）会作为错误离开组件。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// 动作参数不合法或无法匹配
    #[error("Validation error: {0}")]
    Validation(String),

    /// 未知的技能或工具名
    #[error("Not found: {0}")]
    NotFound(String),

    /// 工具不在当前上下文的白名单内
    #[error("Tool is not allowed: {0}")]
    NotAllowed(String),

    #[error("Timed out after {timeout_ms}ms: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// 存储或补全服务不可用
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 重试耗尽后的聚合失败
    #[error("Tool {tool} failed after {attempts} attempt(s): {reason}")]
    ToolFailed {
        tool: String,
        attempts: u32,
        reason: String,
    },
}

impl CoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

impl From<LlmError> for CoreError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout { timeout_ms } => CoreError::Timeout {
                what: "completion request".to_string(),
                timeout_ms,
            },
            other => CoreError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::BackendUnavailable(format!("sqlite: {err}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::BackendUnavailable(format!("serialization: {err}"))
    }
}
