//! 工具指令解析：`/tool <name> [<json-object> | <free text>]`
//!
//! - JSON 对象原样作为参数
//! - 自由文本包装为 `{"text": ...}`
//! - 无参数时为 `{}`
//! - 以 `{` 开头却不是合法 JSON 对象时视为无法解析

use serde_json::{json, Map, Value};

const PREFIX: &str = "/tool";

#[derive(Debug, Clone, PartialEq)]
pub enum ToolDirective {
    Parsed { name: String, args: Value },
    Unparseable { name: String, reason: String },
}

/// 非指令消息返回 None
pub fn parse_tool_directive(message: &str) -> Option<ToolDirective> {
    let rest = message.trim().strip_prefix(PREFIX)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let rest = rest.trim();
    if rest.is_empty() {
        return Some(ToolDirective::Unparseable {
            name: String::new(),
            reason: "missing tool name".to_string(),
        });
    }

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let name = name.to_string();

    if arg.is_empty() {
        return Some(ToolDirective::Parsed {
            name,
            args: Value::Object(Map::new()),
        });
    }

    if arg.starts_with('{') {
        return Some(match serde_json::from_str::<Value>(arg) {
            Ok(args @ Value::Object(_)) => ToolDirective::Parsed { name, args },
            Ok(_) => ToolDirective::Unparseable {
                name,
                reason: "tool arguments must be a JSON object".to_string(),
            },
            Err(e) => ToolDirective::Unparseable {
                name,
                reason: format!("invalid JSON arguments: {e}"),
            },
        });
    }

    Some(ToolDirective::Parsed {
        name,
        args: json!({ "text": arg }),
    })
}

pub fn is_tool_directive(message: &str) -> bool {
    parse_tool_directive(message).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_args() {
        assert_eq!(
            parse_tool_directive(r#"/tool current_time {"timezone":"UTC"}"#),
            Some(ToolDirective::Parsed {
                name: "current_time".into(),
                args: json!({"timezone": "UTC"}),
            })
        );
    }

    #[test]
    fn test_free_text_and_empty_args() {
        assert_eq!(
            parse_tool_directive("/tool echo_tool 你好 世界"),
            Some(ToolDirective::Parsed {
                name: "echo_tool".into(),
                args: json!({"text": "你好 世界"}),
            })
        );
        assert_eq!(
            parse_tool_directive("  /tool current_time  "),
            Some(ToolDirective::Parsed {
                name: "current_time".into(),
                args: json!({}),
            })
        );
    }

    #[test]
    fn test_unparseable() {
        assert!(matches!(
            parse_tool_directive("/tool echo_tool {broken"),
            Some(ToolDirective::Unparseable { name, .. }) if name == "echo_tool"
        ));
        assert!(matches!(
            parse_tool_directive("/tool"),
            Some(ToolDirective::Unparseable { .. })
        ));
    }

    #[test]
    fn test_not_a_directive() {
        assert!(!is_tool_directive("请记住：我喜欢喝茶"));
        assert!(!is_tool_directive("/toolbox open"));
        assert!(!is_tool_directive("run /tool echo_tool hi"));
    }
}
