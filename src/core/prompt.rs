//! 系统提示词：带编号与类型的历史记忆，加上本轮动作的结果或异常

use crate::memory::MemoryEntry;

const NO_MEMORY: &str = "暂无可用记忆。";

pub fn build_system_prompt(
    memories: &[MemoryEntry],
    action_summary: Option<&str>,
    action_error: Option<&str>,
) -> String {
    let memory_section = if memories.is_empty() {
        NO_MEMORY.to_string()
    } else {
        memories
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{}. [{}] {}", i + 1, m.metadata.memory_type, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut lines = vec![
        "你是一个具备长期记忆能力的中文助手。".to_string(),
        "回答要求：准确、简洁、可执行。".to_string(),
        "优先使用“历史记忆”中的信息来保持一致性；若记忆与用户当前输入冲突，以当前输入为准。".to_string(),
        String::new(),
        "历史记忆：".to_string(),
        memory_section,
    ];

    let summary = action_summary.map(str::trim).filter(|s| !s.is_empty());
    let error = action_error.map(str::trim).filter(|s| !s.is_empty());
    if summary.is_some() || error.is_some() {
        lines.push(String::new());
        lines.push("本轮动作：".to_string());
        if let Some(summary) = summary {
            lines.push(format!("结果：{summary}"));
        }
        if let Some(error) = error {
            lines.push(format!("异常：{error}（请在回答中如实说明）"));
        }
    }

    lines.join("\n")
}
