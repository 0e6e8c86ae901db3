//! 单轮编排管线
//!
//! 12 个阶段严格按顺序执行，每个阶段接收上一阶段的 TurnState 并返回更新后的 TurnState。
//! 访问外部依赖（记忆库、补全服务、技能、工具）的阶段在本地吞掉失败：写入 actionValidationError、
//! 空列表、0 计数或固定降级文案，并标记 degraded，保证轮次总能走到终态。

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};

use super::action::{ActionContext, ActionResult};
use super::error::CoreError;
use super::prompt::build_system_prompt;
use super::state::{PlannedAction, TurnState};
use crate::llm::{LlmClient, LlmError, Message};
use crate::memory::{extract_memory_candidates, MemoryStore, RetrieveMemoryInput, UpsertMemoryInput};
use crate::skills::SkillRegistry;
use crate::tools::{is_tool_directive, parse_tool_directive, ToolDirective, ToolExecutor};

pub const DEGRADED_RESPONSE: &str =
    "当前模型服务暂时不可用。我已记录你的请求，请稍后重试，或告诉我你希望我先执行的下一步。";
pub const EMPTY_RESPONSE: &str = "我已经收到你的消息，但暂时无法生成完整回复。";

/// 管线依赖；进程内构建一次，所有并发轮次共享
pub struct Collaborators {
    pub memory: MemoryStore,
    pub skills: Arc<SkillRegistry>,
    pub tools: Arc<ToolExecutor>,
    pub llm: Arc<dyn LlmClient>,
    /// 每轮检索条数
    pub retrieve_results: usize,
}

/// 只有寒暄/确认的短消息
pub fn is_low_signal(message: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(嗯|好的|收到|ok|okay|谢谢|thx|thanks)[!！。.\s]*$").unwrap())
        .is_match(message.trim())
}

pub async fn run_pipeline(deps: &Collaborators, state: TurnState) -> TurnState {
    let state = classify_intent(state);
    let state = plan_action(deps, state);
    let state = route_skill(deps, state);
    let state = execute_skill(deps, state).await;
    let state = route_mcp_tool(state);
    let state = execute_mcp_tool(deps, state).await;
    let state = validate_action_result(state);
    let state = retrieve_memories(deps, state).await;
    let state = generate_response(deps, state).await;
    let state = extract_candidates(state);
    let state = persist_memories(deps, state).await;
    persist_action_memory(deps, state).await
}

fn action_context(state: &TurnState) -> ActionContext {
    ActionContext {
        tenant_id: state.tenant_id.clone(),
        user_id: state.user_id.clone(),
        thread_id: state.thread_id.clone(),
        trace_id: state.trace_id.clone(),
        user_message: state.user_message.clone(),
        allowed_tools: state.allowed_tools.clone(),
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn record_action(state: &mut TurnState, result: ActionResult) {
    state.action_status = Some(result.status);
    state.action_summary = result.summary;
    state.action_output = result.output;
    state.action_memory_candidates = result.memory_candidates;
}

fn record_action_error(state: &mut TurnState, stage: &str, err: &CoreError) {
    tracing::warn!(trace_id = %state.trace_id, stage, error = %err, "action failed");
    state.action_validation_error = Some(err.to_string());
    state.mark_degraded(stage);
}

fn classify_intent(mut state: TurnState) -> TurnState {
    state.should_retrieve = !is_low_signal(&state.user_message);
    state
}

/// 工具指令优先于技能匹配
fn plan_action(deps: &Collaborators, mut state: TurnState) -> TurnState {
    state.planned_action = if is_tool_directive(&state.user_message) {
        PlannedAction::Mcp
    } else if deps.skills.best_match(&state.user_message).is_some() {
        PlannedAction::Skill
    } else {
        PlannedAction::Chat
    };
    tracing::debug!(trace_id = %state.trace_id, planned = ?state.planned_action, "action planned");
    state
}

fn route_skill(deps: &Collaborators, mut state: TurnState) -> TurnState {
    if state.planned_action != PlannedAction::Skill {
        return state;
    }
    match deps.skills.best_match(&state.user_message) {
        Some((skill, found)) => {
            state.selected_skill = Some(skill.name().to_string());
            state.skill_args = into_map(found.args);
        }
        None => {
            state.planned_action = PlannedAction::Chat;
            state.action_validation_error = Some("skill no longer matches the message".to_string());
            state.mark_degraded("routeSkill");
        }
    }
    state
}

async fn execute_skill(deps: &Collaborators, mut state: TurnState) -> TurnState {
    if state.planned_action != PlannedAction::Skill {
        return state;
    }
    let Some(name) = state.selected_skill.clone() else {
        return state;
    };
    let Some(skill) = deps.skills.get(&name) else {
        record_action_error(&mut state, "executeSkill", &CoreError::NotFound(format!("skill {name}")));
        return state;
    };

    let args = match skill.validate(&Value::Object(state.skill_args.clone())) {
        Ok(args) => args,
        Err(e) => {
            record_action_error(&mut state, "executeSkill", &e);
            return state;
        }
    };
    state.skill_args = into_map(args.clone());

    let ctx = action_context(&state);
    match skill.execute(&ctx, args).await {
        Ok(result) => {
            tracing::info!(
                trace_id = %state.trace_id,
                skill = %name,
                status = ?result.status,
                "skill executed"
            );
            record_action(&mut state, result);
        }
        Err(e) => record_action_error(&mut state, "executeSkill", &e),
    }
    state
}

fn route_mcp_tool(mut state: TurnState) -> TurnState {
    if state.planned_action != PlannedAction::Mcp {
        return state;
    }
    match parse_tool_directive(&state.user_message) {
        Some(ToolDirective::Parsed { name, args }) => {
            state.selected_tool = Some(name);
            state.tool_args = into_map(args);
        }
        Some(ToolDirective::Unparseable { name, reason }) => {
            if !name.is_empty() {
                state.selected_tool = Some(name);
            }
            state.action_validation_error = Some(format!("unparseable tool directive: {reason}"));
            state.mark_degraded("routeMcpTool");
        }
        None => {
            state.action_validation_error = Some("unparseable tool directive".to_string());
            state.mark_degraded("routeMcpTool");
        }
    }
    state
}

async fn execute_mcp_tool(deps: &Collaborators, mut state: TurnState) -> TurnState {
    if state.planned_action != PlannedAction::Mcp || state.action_validation_error.is_some() {
        return state;
    }
    let Some(name) = state.selected_tool.clone() else {
        return state;
    };

    let ctx = action_context(&state);
    let args = Value::Object(state.tool_args.clone());
    match deps.tools.execute(&ctx, &name, args).await {
        Ok(result) => record_action(&mut state, result),
        Err(e) => record_action_error(&mut state, "executeMcpTool", &e),
    }
    state
}

fn validate_action_result(mut state: TurnState) -> TurnState {
    if state.action_planned()
        && state.action_summary.trim().is_empty()
        && state.action_validation_error.is_none()
    {
        tracing::warn!(trace_id = %state.trace_id, "action produced no usable result");
        state.action_validation_error = Some("action produced no usable result".to_string());
        state.mark_degraded("validateActionResult");
    }
    state
}

async fn retrieve_memories(deps: &Collaborators, mut state: TurnState) -> TurnState {
    if !state.should_retrieve {
        state.retrieved_memories = Vec::new();
        return state;
    }

    let input = RetrieveMemoryInput {
        tenant_id: state.tenant_id.clone(),
        user_id: state.user_id.clone(),
        query_text: state.user_message.clone(),
        thread_id: Some(state.thread_id.clone()).filter(|t| !t.is_empty()),
        memory_types: Vec::new(),
        n_results: Some(deps.retrieve_results),
    };
    match deps.memory.retrieve(input).await {
        Ok(memories) => state.retrieved_memories = memories,
        Err(e) => {
            tracing::warn!(trace_id = %state.trace_id, error = %e, "memory retrieval failed");
            state.retrieved_memories = Vec::new();
            state.mark_degraded("retrieveMemories");
        }
    }
    state
}

async fn generate_response(deps: &Collaborators, mut state: TurnState) -> TurnState {
    let system_prompt = build_system_prompt(
        &state.retrieved_memories,
        Some(state.action_summary.as_str()),
        state.action_validation_error.as_deref(),
    );
    let messages = [
        Message::system(system_prompt),
        Message::user(state.user_message.clone()),
    ];

    match deps.llm.complete(&messages).await {
        Ok(text) if !text.trim().is_empty() => state.response = text,
        Ok(_) | Err(LlmError::EmptyResponse) => {
            tracing::warn!(trace_id = %state.trace_id, "completion returned empty content");
            state.response = EMPTY_RESPONSE.to_string();
            state.mark_degraded("generateResponse");
        }
        Err(e) => {
            tracing::error!(trace_id = %state.trace_id, error = %e, "response generation failed");
            state.response = DEGRADED_RESPONSE.to_string();
            state.mark_degraded("generateResponse");
        }
    }
    state
}

fn extract_candidates(mut state: TurnState) -> TurnState {
    state.memory_write_candidates = extract_memory_candidates(
        &state.tenant_id,
        &state.user_id,
        &state.thread_id,
        &state.user_message,
        &state.trace_id,
    );
    state
}

async fn upsert_counted(
    deps: &Collaborators,
    state: &mut TurnState,
    stage: &str,
    candidates: Vec<UpsertMemoryInput>,
) -> usize {
    if candidates.is_empty() {
        return 0;
    }
    match deps.memory.upsert(candidates).await {
        Ok(upserted) => upserted.len(),
        Err(e) => {
            tracing::warn!(trace_id = %state.trace_id, stage, error = %e, "memory persistence failed");
            state.mark_degraded(stage);
            0
        }
    }
}

async fn persist_memories(deps: &Collaborators, mut state: TurnState) -> TurnState {
    let candidates = state.memory_write_candidates.clone();
    state.persisted_count = upsert_counted(deps, &mut state, "persistMemories", candidates).await;
    state
}

async fn persist_action_memory(deps: &Collaborators, mut state: TurnState) -> TurnState {
    let candidates = state.action_memory_candidates.clone();
    let count = upsert_counted(deps, &mut state, "persistActionMemory", candidates).await;
    state.persisted_count += count;
    state
}
