//! 单轮对话状态
//!
//! TurnState 在管线各阶段之间按值传递，每个阶段只写自己负责的字段；轮次结束后整体返回给调用方，不做持久化。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::action::ActionStatus;
use crate::memory::{MemoryEntry, UpsertMemoryInput};

/// 本轮计划执行的动作
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    #[default]
    Chat,
    Skill,
    /// 外部工具（沿用 mcp 这一对外名称）
    Mcp,
}

/// Turn Runner 的输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInput {
    pub tenant_id: String,
    pub user_id: String,
    pub thread_id: String,
    pub user_message: String,
    /// 为空时生成 UUID v4
    #[serde(default)]
    pub trace_id: Option<String>,
    /// 本轮允许调用的工具；为空表示沿用全局配置
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl TurnInput {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            user_message: user_message.into(),
            ..Default::default()
        }
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnState {
    // 身份与输入
    pub tenant_id: String,
    pub user_id: String,
    pub thread_id: String,
    pub trace_id: String,
    pub user_message: String,
    #[serde(skip)]
    pub allowed_tools: Vec<String>,

    // 意图与路由
    pub should_retrieve: bool,
    pub planned_action: PlannedAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_skill: Option<String>,
    #[serde(default)]
    pub skill_args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_tool: Option<String>,
    #[serde(default)]
    pub tool_args: Map<String, Value>,

    // 动作执行
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_status: Option<ActionStatus>,
    pub action_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_output: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_validation_error: Option<String>,
    #[serde(default)]
    pub action_memory_candidates: Vec<UpsertMemoryInput>,

    // 检索与生成
    #[serde(default)]
    pub retrieved_memories: Vec<MemoryEntry>,
    pub response: String,

    // 记忆写入
    #[serde(default)]
    pub memory_write_candidates: Vec<UpsertMemoryInput>,
    pub persisted_count: usize,

    /// 有阶段就地吞掉了失败
    pub degraded: bool,
    /// 发生失败的阶段名
    #[serde(default)]
    pub degraded_reasons: Vec<String>,
}

impl TurnState {
    pub fn from_input(input: TurnInput, trace_id: String) -> Self {
        Self {
            tenant_id: input.tenant_id,
            user_id: input.user_id,
            thread_id: input.thread_id,
            trace_id,
            user_message: input.user_message,
            allowed_tools: input.allowed_tools,
            should_retrieve: true,
            ..Default::default()
        }
    }

    pub fn retrieved_count(&self) -> usize {
        self.retrieved_memories.len()
    }

    /// 标记降级；同一阶段只记一次
    pub(crate) fn mark_degraded(&mut self, stage: &str) {
        self.degraded = true;
        if !self.degraded_reasons.iter().any(|r| r == stage) {
            self.degraded_reasons.push(stage.to_string());
        }
    }

    pub(crate) fn action_planned(&self) -> bool {
        self.planned_action != PlannedAction::Chat
    }
}
