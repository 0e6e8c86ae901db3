//! 技能注册表
//!
//! 技能由消息内容隐式触发：每个技能对原始消息给出匹配得分与参数，得分最高者胜出，
//! 同分时先注册者优先。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::{ActionContext, ActionResult, CoreError};

/// 一次匹配的得分与推导出的参数
#[derive(Debug, Clone, PartialEq)]
pub struct SkillMatch {
    pub score: f32,
    pub args: Value,
}

#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    /// 对原始消息打分；不匹配返回 None
    fn match_message(&self, message: &str) -> Option<SkillMatch>;

    /// 校验参数并返回规范化后的参数
    fn validate(&self, args: &Value) -> Result<Value, CoreError>;

    async fn execute(&self, ctx: &ActionContext, args: Value) -> Result<ActionResult, CoreError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 按注册顺序保存技能
#[derive(Default, Clone)]
pub struct SkillRegistry {
    skills: Vec<Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置技能：save_preference、capture_task
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(super::builtin::SavePreferenceSkill);
        registry.register(super::builtin::CaptureTaskSkill);
        registry
    }

    /// 同名技能覆盖原位置
    pub fn register(&mut self, skill: impl Skill + 'static) {
        let skill: Arc<dyn Skill> = Arc::new(skill);
        match self.skills.iter().position(|s| s.name() == skill.name()) {
            Some(idx) => self.skills[idx] = skill,
            None => self.skills.push(skill),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.iter().find(|s| s.name() == name).cloned()
    }

    /// 得分最高的技能；只有严格更高的得分才会替换已选中的技能
    pub fn best_match(&self, message: &str) -> Option<(Arc<dyn Skill>, SkillMatch)> {
        let mut best: Option<(Arc<dyn Skill>, SkillMatch)> = None;
        for skill in &self.skills {
            let Some(found) = skill.match_message(message) else {
                continue;
            };
            let better = best
                .as_ref()
                .map(|(_, current)| found.score > current.score)
                .unwrap_or(true);
            if better {
                best = Some((Arc::clone(skill), found));
            }
        }
        best
    }

    pub fn descriptors(&self) -> Vec<SkillDescriptor> {
        self.skills
            .iter()
            .map(|s| SkillDescriptor {
                name: s.name().to_string(),
                description: s.description().to_string(),
                input_schema: s.input_schema(),
            })
            .collect()
    }
}
