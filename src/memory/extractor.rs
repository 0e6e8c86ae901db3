//! 规则型记忆抽取：从用户原话推导待写入的记忆候选
//!
//! 纯函数，无随机性、无外部调用：同样的输入永远得到同样的候选。

use std::sync::OnceLock;

use regex::Regex;

use super::types::{MemorySourceType, MemoryType, UpsertMemoryInput};

pub const EXTRACTOR_NAME: &str = "rule-based-extractor";
pub const EXTRACTOR_CONFIDENCE: f32 = 0.72;
pub const EXTRACTOR_TAG: &str = "auto-extracted";

const KEY_MAX_CHARS: usize = 36;
const FALLBACK_KEY: &str = "memory";

fn persist_trigger() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"记住|我喜欢|我偏好|我叫|我是|我的|任务|提醒|下次").unwrap())
}

fn emphasis() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"必须|务必|一定").unwrap())
}

fn key_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}\s_\-]").unwrap())
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// 按关键词判断记忆类型；优先级 preference > profile > task > fact
pub fn detect_memory_type(message: &str) -> MemoryType {
    static PREFERENCE: OnceLock<Regex> = OnceLock::new();
    static PROFILE: OnceLock<Regex> = OnceLock::new();
    static TASK: OnceLock<Regex> = OnceLock::new();

    let preference = PREFERENCE.get_or_init(|| Regex::new(r"我喜欢|我偏好|偏向|习惯").unwrap());
    let profile = PROFILE.get_or_init(|| Regex::new(r"我叫|我是|我的名字").unwrap());
    let task = TASK.get_or_init(|| Regex::new(r"任务|待办|todo|提醒").unwrap());

    if preference.is_match(message) {
        MemoryType::Preference
    } else if profile.is_match(message) {
        MemoryType::Profile
    } else if task.is_match(message) {
        MemoryType::Task
    } else {
        MemoryType::Fact
    }
}

/// 去掉标点符号，空白折叠，取前 36 个字符
pub fn derive_memory_key(message: &str) -> String {
    let stripped = key_noise().replace_all(message.trim(), "");
    let condensed = whitespace_run().replace_all(&stripped, " ");
    let key: String = condensed.chars().take(KEY_MAX_CHARS).collect();
    if key.trim().is_empty() {
        FALLBACK_KEY.to_string()
    } else {
        key
    }
}

/// 出现“记住”时从该处截取，否则用整句
fn derive_memory_content(message: &str) -> &str {
    match message.find("记住") {
        Some(idx) => message[idx..].trim(),
        None => message.trim(),
    }
}

pub fn extract_memory_candidates(
    tenant_id: &str,
    user_id: &str,
    thread_id: &str,
    user_message: &str,
    trace_id: &str,
) -> Vec<UpsertMemoryInput> {
    let message = user_message.trim();
    if message.is_empty() || !persist_trigger().is_match(message) {
        return Vec::new();
    }

    let importance = if emphasis().is_match(message) { 5 } else { 3 };
    let mut candidate = UpsertMemoryInput::new(
        tenant_id,
        user_id,
        detect_memory_type(message),
        derive_memory_key(message),
        derive_memory_content(message),
    )
    .importance(importance)
    .tags([EXTRACTOR_TAG])
    .provenance(MemorySourceType::Chat, EXTRACTOR_NAME, EXTRACTOR_CONFIDENCE, trace_id);
    if !thread_id.is_empty() {
        candidate = candidate.thread(thread_id);
    }
    vec![candidate]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_trigger_no_candidates() {
        assert!(extract_memory_candidates("t", "u", "th", "今天天气怎么样", "tr").is_empty());
        assert!(extract_memory_candidates("t", "u", "th", "   ", "tr").is_empty());
    }

    #[test]
    fn test_remember_preference() {
        let out = extract_memory_candidates("t", "u", "th", "请记住：我喜欢喝茶", "trace-1");
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.memory_type, MemoryType::Preference);
        assert_eq!(c.content, "记住：我喜欢喝茶");
        assert_eq!(c.key, "请记住我喜欢喝茶");
        assert_eq!(c.importance, Some(3));
        assert_eq!(c.tags, vec!["auto-extracted".to_string()]);
        assert_eq!(c.confidence, Some(0.72));
        assert_eq!(c.source_type, Some(MemorySourceType::Chat));
        assert_eq!(c.source_name.as_deref(), Some("rule-based-extractor"));
        assert_eq!(c.source_message_id.as_deref(), Some("trace-1"));
        assert_eq!(c.action_trace_id.as_deref(), Some("trace-1"));
        assert_eq!(c.thread_id.as_deref(), Some("th"));
    }

    #[test]
    fn test_type_detection_priority() {
        assert_eq!(detect_memory_type("我叫小王"), MemoryType::Profile);
        assert_eq!(detect_memory_type("提醒我明天交报告"), MemoryType::Task);
        assert_eq!(detect_memory_type("我是工程师，我喜欢Rust"), MemoryType::Preference);
        assert_eq!(detect_memory_type("下次见"), MemoryType::Fact);
    }

    #[test]
    fn test_emphasis_raises_importance() {
        let out = extract_memory_candidates("t", "u", "th", "记住：务必每天八点提醒我", "tr");
        assert_eq!(out[0].importance, Some(5));
    }

    #[test]
    fn test_key_derivation() {
        assert_eq!(derive_memory_key("!!!"), "memory");
        assert_eq!(derive_memory_key("my   todo_list - A"), "my todo_list - A");
        let long = "我的".repeat(40);
        assert_eq!(derive_memory_key(&long).chars().count(), 36);
    }

    #[test]
    fn test_deterministic() {
        let a = extract_memory_candidates("t", "u", "th", "我的生日是五月", "tr");
        let b = extract_memory_candidates("t", "u", "th", "我的生日是五月", "tr");
        assert_eq!(a, b);
    }
}
