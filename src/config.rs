//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HONEYCOMB__*` 覆盖（双下划线表示嵌套，如 `HONEYCOMB__LLM__PROVIDER=openai`）。
//! 所有字段都有默认值，空配置即可运行（Mock LLM + 哈希嵌入 + 内存后端）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名与 REPL 使用的默认身份
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub default_tenant: String,
    pub default_user: String,
    pub default_thread: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "honeycomb".to_string(),
            default_tenant: "default".to_string(),
            default_user: "local".to_string(),
            default_thread: "main".to_string(),
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub timeouts: LlmTimeoutsSection,
    /// 瞬时错误的额外重试次数
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: Some(0.3),
            timeouts: LlmTimeoutsSection::default(),
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次补全请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 20 }
    }
}

/// [embedding] 段：hash（本地特征哈希）/ openai
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub provider: String,
    pub model: String,
    /// 哈希嵌入维度
    pub dimensions: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 256,
        }
    }
}

/// [memory] 段：文档库后端与检索条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// in_memory / sqlite
    pub backend: String,
    pub sqlite_path: PathBuf,
    pub default_results: usize,
    pub max_results: usize,
    pub result_multiplier: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: "in_memory".to_string(),
            sqlite_path: PathBuf::from("data/memories.db"),
            default_results: 8,
            max_results: 50,
            result_multiplier: 3,
        }
    }
}

/// [tools] 段：默认超时与白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 工具未声明超时时使用（毫秒）
    pub default_timeout_ms: u64,
    /// 允许调用的工具名；为空表示全部允许
    pub allowed: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            allowed: Vec::new(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HONEYCOMB__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HONEYCOMB__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HONEYCOMB")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("tools.allowed")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.timeouts.request, 20);
        assert_eq!(cfg.memory.default_results, 8);
        assert_eq!(cfg.memory.max_results, 50);
        assert_eq!(cfg.memory.result_multiplier, 3);
        assert_eq!(cfg.tools.default_timeout_ms, 10_000);
        assert!(cfg.tools.allowed.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[memory]\nbackend = \"sqlite\"\n\n[tools]\nallowed = [\"echo_tool\"]"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.memory.backend, "sqlite");
        assert_eq!(cfg.memory.max_results, 50);
        assert_eq!(cfg.tools.allowed, vec!["echo_tool".to_string()]);
        assert_eq!(cfg.embedding.dimensions, 256);
    }
}
