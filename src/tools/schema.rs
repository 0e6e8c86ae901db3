//! 参数 Schema 与校验（schemars 自动生成参数 JSON Schema）
//!
//! 技能与工具都用强类型参数结构体描述输入：parse_args 做反序列化校验，schema_of 生成对外描述。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::CoreError;

/// 将 JSON 参数解析为强类型结构；失败时返回 Validation
pub fn parse_args<T: DeserializeOwned>(action: &str, args: &Value) -> Result<T, CoreError> {
    if !args.is_object() {
        return Err(CoreError::Validation(format!(
            "Invalid input for {action}: expected a JSON object"
        )));
    }
    serde_json::from_value(args.clone())
        .map_err(|e| CoreError::Validation(format!("Invalid input for {action}: {e}")))
}

/// 校验后的参数重新编码为 JSON（补齐默认值）
pub fn to_args<T: Serialize>(action: &str, args: &T) -> Result<Value, CoreError> {
    serde_json::to_value(args)
        .map_err(|e| CoreError::Validation(format!("Invalid input for {action}: {e}")))
}

/// 非空字符串字段
pub fn require_non_empty(action: &str, field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "Invalid input for {action}: `{field}` must not be empty"
        )));
    }
    Ok(())
}

pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, JsonSchema)]
    struct Args {
        text: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_parse_args_validation() {
        let parsed: Args = parse_args("demo", &json!({"text": "hi"})).unwrap();
        assert_eq!(parsed.count, 0);
        assert!(matches!(
            parse_args::<Args>("demo", &json!({"count": 1})),
            Err(CoreError::Validation(_))
        ));
        assert!(parse_args::<Args>("demo", &json!("hi")).is_err());
    }

    #[test]
    fn test_schema_lists_properties() {
        let schema = schema_of::<Args>();
        assert!(schema["properties"].get("text").is_some());
        assert_eq!(to_args("demo", &Args { text: "a".into(), count: 2 }).unwrap()["count"], 2);
    }
}
