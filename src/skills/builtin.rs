//! 内置技能：save_preference（固化偏好）、capture_task（记录待办）

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::registry::{Skill, SkillMatch};
use crate::core::action::leading_chars;
use crate::core::{ActionContext, ActionResult, CoreError};
use crate::memory::{MemorySourceType, MemoryType, UpsertMemoryInput};
use crate::tools::schema::{parse_args, require_non_empty, schema_of, to_args};

const SAVE_PREFERENCE: &str = "save_preference";
const CAPTURE_TASK: &str = "capture_task";

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct PreferenceArgs {
    /// 偏好内容（非空）
    pub preference: String,
}

pub struct SavePreferenceSkill;

#[async_trait]
impl Skill for SavePreferenceSkill {
    fn name(&self) -> &str {
        SAVE_PREFERENCE
    }

    fn description(&self) -> &str {
        "抽取并固化用户偏好"
    }

    fn input_schema(&self) -> Value {
        schema_of::<PreferenceArgs>()
    }

    fn match_message(&self, message: &str) -> Option<SkillMatch> {
        static TRIGGER: OnceLock<Regex> = OnceLock::new();
        static LEAD: OnceLock<Regex> = OnceLock::new();
        let trigger = TRIGGER.get_or_init(|| Regex::new(r"记住|偏好|喜欢|习惯").unwrap());
        let lead = LEAD.get_or_init(|| Regex::new(r"^.*?(记住|偏好是|喜欢)").unwrap());

        if !trigger.is_match(message) {
            return None;
        }
        let stripped = lead.replace(message, "");
        let stripped = stripped.trim();
        let preference = if stripped.is_empty() {
            message.trim()
        } else {
            stripped
        };
        Some(SkillMatch {
            score: 0.8,
            args: json!({ "preference": preference }),
        })
    }

    fn validate(&self, args: &Value) -> Result<Value, CoreError> {
        let parsed: PreferenceArgs = parse_args(SAVE_PREFERENCE, args)?;
        require_non_empty(SAVE_PREFERENCE, "preference", &parsed.preference)?;
        to_args(SAVE_PREFERENCE, &parsed)
    }

    async fn execute(&self, ctx: &ActionContext, args: Value) -> Result<ActionResult, CoreError> {
        let PreferenceArgs { preference } = parse_args(SAVE_PREFERENCE, &args)?;
        let memory = UpsertMemoryInput::new(
            &ctx.tenant_id,
            &ctx.user_id,
            MemoryType::Preference,
            format!("skill_preference_{}", leading_chars(&preference, 24)),
            preference.clone(),
        )
        .thread(&ctx.thread_id)
        .importance(4)
        .tags(["skill", "preference"])
        .provenance(MemorySourceType::Skill, SAVE_PREFERENCE, 0.85, &ctx.trace_id);

        Ok(ActionResult::success(format!("已记录你的偏好：{preference}"))
            .with_output(json!({ "preference": preference }))
            .with_memory(memory))
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct TaskArgs {
    /// 任务描述（非空）
    pub task: String,
}

pub struct CaptureTaskSkill;

#[async_trait]
impl Skill for CaptureTaskSkill {
    fn name(&self) -> &str {
        CAPTURE_TASK
    }

    fn description(&self) -> &str {
        "识别并记录待办任务"
    }

    fn input_schema(&self) -> Value {
        schema_of::<TaskArgs>()
    }

    fn match_message(&self, message: &str) -> Option<SkillMatch> {
        static TRIGGER: OnceLock<Regex> = OnceLock::new();
        let trigger = TRIGGER.get_or_init(|| Regex::new(r"(?i)待办|任务|提醒我|todo").unwrap());
        if !trigger.is_match(message) {
            return None;
        }
        Some(SkillMatch {
            score: 0.7,
            args: json!({ "task": message.trim() }),
        })
    }

    fn validate(&self, args: &Value) -> Result<Value, CoreError> {
        let parsed: TaskArgs = parse_args(CAPTURE_TASK, args)?;
        require_non_empty(CAPTURE_TASK, "task", &parsed.task)?;
        to_args(CAPTURE_TASK, &parsed)
    }

    async fn execute(&self, ctx: &ActionContext, args: Value) -> Result<ActionResult, CoreError> {
        let TaskArgs { task } = parse_args(CAPTURE_TASK, &args)?;
        let memory = UpsertMemoryInput::new(
            &ctx.tenant_id,
            &ctx.user_id,
            MemoryType::Task,
            format!("skill_task_{}", leading_chars(&task, 24)),
            task.clone(),
        )
        .thread(&ctx.thread_id)
        .importance(4)
        .tags(["skill", "task"])
        .provenance(MemorySourceType::Skill, CAPTURE_TASK, 0.8, &ctx.trace_id);

        Ok(ActionResult::success(format!("已记录任务：{task}"))
            .with_output(json!({ "task": task }))
            .with_memory(memory))
    }
}
