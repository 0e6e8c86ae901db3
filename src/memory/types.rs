//! 长期记忆数据模型与 key 派生
//!
//! memoryKey = `tenantId:userId:memoryType:normalizedKey`，id 为 memoryKey 的 SHA-256 前 32 位十六进制，
//! 同一逻辑 key 永远派生出同一 id，从而保证 upsert 幂等。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const DEFAULT_IMPORTANCE: u8 = 3;
pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 5;
pub const DEFAULT_SOURCE_MESSAGE_ID: &str = "system";
/// memoryKey 各段之间的分隔符
pub const KEY_SEPARATOR: &str = ":";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Profile,
    Preference,
    Fact,
    Task,
    Summary,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Profile,
        MemoryType::Preference,
        MemoryType::Fact,
        MemoryType::Task,
        MemoryType::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Profile => "profile",
            MemoryType::Preference => "preference",
            MemoryType::Fact => "fact",
            MemoryType::Task => "task",
            MemoryType::Summary => "summary",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemoryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown memory type: {s}"))
    }
}

/// 记忆来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySourceType {
    Chat,
    #[serde(alias = "mcp")]
    Tool,
    Skill,
}

/// 持久化元数据；写入文档库时序列化为扁平 map（tags 为字符串数组，expiresAt 可为 null）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub memory_type: MemoryType,
    pub memory_key: String,
    pub importance: u8,
    pub created_at: i64,
    pub last_access_at: i64,
    pub expires_at: Option<i64>,
    pub source_message_id: String,
    pub version: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<MemorySourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_trace_id: Option<String>,
}

impl MemoryMetadata {
    /// 从文档库的扁平 map 解析并校验边界
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, String> {
        let meta: MemoryMetadata =
            serde_json::from_value(Value::Object(map.clone())).map_err(|e| e.to_string())?;
        meta.validate()?;
        Ok(meta)
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_id.is_empty() || self.user_id.is_empty() {
            return Err("tenantId and userId must be non-empty".to_string());
        }
        if self.memory_key.is_empty() || self.source_message_id.is_empty() {
            return Err("memoryKey and sourceMessageId must be non-empty".to_string());
        }
        if !(MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&self.importance) {
            return Err(format!("importance out of range: {}", self.importance));
        }
        if self.version < 1 {
            return Err("version must be >= 1".to_string());
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(format!("confidence out of range: {c}"));
            }
        }
        Ok(())
    }

    /// expiresAt 不晚于 now 即视为过期
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_ms)
    }
}

/// 检索、列举返回的记忆条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub metadata: MemoryMetadata,
    /// 检索相关度（越大越相关），列举时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// 记忆写入草稿：由抽取器、技能或工具产出，交给 MemoryStore::upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMemoryInput {
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub memory_type: MemoryType,
    pub key: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<MemorySourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_trace_id: Option<String>,
}

impl UpsertMemoryInput {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        memory_type: MemoryType,
        key: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            thread_id: None,
            memory_type,
            key: key.into(),
            content: content.into(),
            importance: None,
            source_message_id: None,
            tags: Vec::new(),
            expires_at: None,
            source_type: None,
            source_name: None,
            confidence: None,
            action_trace_id: None,
        }
    }

    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn importance(mut self, importance: u8) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn expires_at(mut self, at_ms: i64) -> Self {
        self.expires_at = Some(at_ms);
        self
    }

    /// 来源信息：类型、来源名、置信度，以及触发它的 trace（同时作为 sourceMessageId）
    pub fn provenance(
        mut self,
        source_type: MemorySourceType,
        source_name: impl Into<String>,
        confidence: f32,
        trace_id: impl Into<String>,
    ) -> Self {
        let trace_id = trace_id.into();
        self.source_type = Some(source_type);
        self.source_name = Some(source_name.into());
        self.confidence = Some(confidence);
        self.source_message_id = Some(trace_id.clone());
        self.action_trace_id = Some(trace_id);
        self
    }

    pub fn memory_key(&self) -> String {
        build_memory_key(&self.tenant_id, &self.user_id, self.memory_type, &self.key)
    }
}

/// upsert 的单条结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertedMemory {
    pub id: String,
    pub memory_key: String,
    pub version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RetrieveMemoryInput {
    pub tenant_id: String,
    pub user_id: String,
    pub query_text: String,
    pub thread_id: Option<String>,
    pub memory_types: Vec<MemoryType>,
    pub n_results: Option<usize>,
}

impl RetrieveMemoryInput {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        query_text: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            query_text: query_text.into(),
            ..Default::default()
        }
    }

    pub fn n_results(mut self, n: usize) -> Self {
        self.n_results = Some(n);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListMemoryInput {
    pub tenant_id: String,
    pub user_id: String,
    pub memory_type: Option<MemoryType>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// 删除选择器：ids 与 memoryKey 至少提供一个
#[derive(Debug, Clone, Default)]
pub struct DeleteMemoryInput {
    pub tenant_id: String,
    pub user_id: String,
    pub ids: Vec<String>,
    pub memory_key: Option<String>,
}

/// trim + 小写 + 空白折叠为下划线
pub fn sanitize_memory_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub fn build_memory_key(
    tenant_id: &str,
    user_id: &str,
    memory_type: MemoryType,
    key: &str,
) -> String {
    [
        tenant_id,
        user_id,
        memory_type.as_str(),
        &sanitize_memory_key(key),
    ]
    .join(KEY_SEPARATOR)
}

pub fn build_memory_id(memory_key: &str) -> String {
    let digest = Sha256::digest(memory_key.as_bytes());
    let hex = hex::encode(digest);
    format!("mem_{}", &hex[..32])
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
