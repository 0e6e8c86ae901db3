//! 技能系统
//!
//! 技能（Skill）由消息内容隐式触发：注册表对每条消息打分，选出得分最高的技能，
//! 校验参数后执行，产出动作结果与待写入的记忆候选。

pub mod builtin;
pub mod registry;

pub use builtin::{CaptureTaskSkill, SavePreferenceSkill};
pub use registry::{Skill, SkillDescriptor, SkillMatch, SkillRegistry};
