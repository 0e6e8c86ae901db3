//! 文档库接口：向量检索集合的窄接口
//!
//! 记忆以 (id, document, metadata) 三元组存放；metadata 是扁平 JSON map。
//! MemoryStore 只依赖本 trait，具体后端可替换（内存 / SQLite / 远程向量库）。

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::CoreError;

pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// 带相关度的命中（越大越相关）
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub record: DocumentRecord,
    pub score: f32,
}

/// 元数据过滤：所有 equals 与 one_of 条件同时满足
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereFilter {
    equals: Vec<(String, Value)>,
    one_of: Vec<(String, Vec<Value>)>,
}

impl WhereFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    /// 字段值属于给定集合；空集合不加约束
    pub fn any_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.one_of.push((field.into(), values));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.one_of.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
            && self.one_of.iter().all(|(field, values)| {
                metadata
                    .get(field)
                    .map(|v| values.contains(v))
                    .unwrap_or(false)
            })
    }
}

/// get：按 id 或过滤条件取文档（两者都给时取交集），支持分页
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    pub filter: WhereFilter,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl GetRequest {
    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn by_filter(filter: WhereFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &DocumentRecord) -> bool {
        self.ids
            .as_ref()
            .map(|ids| ids.iter().any(|id| id == &record.id))
            .unwrap_or(true)
            && self.filter.matches(&record.metadata)
    }
}

/// query：纯向量检索
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query_text: String,
    pub filter: WhereFilter,
    pub n_results: usize,
}

/// hybrid_search：关键词排名与向量排名各取 candidate_pool 条，RRF 融合后截断到 n_results
#[derive(Debug, Clone)]
pub struct HybridRequest {
    pub keyword: String,
    pub query_text: String,
    pub filter: WhereFilter,
    pub candidate_pool: usize,
    pub n_results: usize,
}

/// delete：ids 与过滤条件同时生效（交集）；两者都为空时拒绝
#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub ids: Option<Vec<String>>,
    pub filter: WhereFilter,
}

impl DeleteRequest {
    pub fn matches(&self, record: &DocumentRecord) -> bool {
        self.ids
            .as_ref()
            .map(|ids| ids.iter().any(|id| id == &record.id))
            .unwrap_or(true)
            && self.filter.matches(&record.metadata)
    }

    pub fn ensure_selector(&self) -> Result<(), CoreError> {
        if self.ids.as_ref().map(|ids| ids.is_empty()).unwrap_or(true) && self.filter.is_empty() {
            return Err(CoreError::InvalidArgument(
                "delete requires ids or a filter".to_string(),
            ));
        }
        Ok(())
    }
}

/// 向量检索集合
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 批量写入（同 id 覆盖）；后端支持时整批原子生效
    async fn upsert(&self, records: Vec<DocumentRecord>) -> Result<(), CoreError>;

    async fn get(&self, request: GetRequest) -> Result<Vec<DocumentRecord>, CoreError>;

    async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredDocument>, CoreError>;

    async fn hybrid_search(&self, request: HybridRequest)
        -> Result<Vec<ScoredDocument>, CoreError>;

    /// 字段级合并更新元数据；不存在的 id 忽略
    async fn update(&self, patches: Vec<(String, Metadata)>) -> Result<(), CoreError>;

    /// 返回删除条数
    async fn delete(&self, request: DeleteRequest) -> Result<usize, CoreError>;

    async fn count(&self) -> Result<usize, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Metadata {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_where_filter_matches() {
        let filter = WhereFilter::new()
            .eq("tenantId", "t1")
            .any_of("memoryType", ["fact", "task"]);
        assert!(filter.matches(&meta(json!({"tenantId": "t1", "memoryType": "task"}))));
        assert!(!filter.matches(&meta(json!({"tenantId": "t2", "memoryType": "task"}))));
        assert!(!filter.matches(&meta(json!({"tenantId": "t1", "memoryType": "profile"}))));
        assert!(!filter.matches(&meta(json!({"memoryType": "task"}))));
    }

    #[test]
    fn test_any_of_empty_is_unconstrained() {
        let filter = WhereFilter::new().any_of("memoryType", Vec::<String>::new());
        assert!(filter.is_empty());
        assert!(filter.matches(&Metadata::new()));
    }

    #[test]
    fn test_delete_requires_selector() {
        assert!(DeleteRequest::default().ensure_selector().is_err());
        let by_ids = DeleteRequest {
            ids: Some(vec!["a".into()]),
            ..Default::default()
        };
        assert!(by_ids.ensure_selector().is_ok());
    }
}
