//! 长期记忆仓库
//!
//! 在 DocumentStore 之上实现租户/用户隔离的检索、带版本的 upsert、列举、删除与过期清理。
//!
//! - retrieve：关键词 + 向量混合检索（候选池为请求数的 3 倍，RRF 融合）；混合检索失败时退回纯向量检索
//! - upsert：按 memoryKey 加锁，同 key 串行、不同 key 互不阻塞，版本号严格 +1
//! - 过期条目不出现在 retrieve / list / count_all 中，只能通过 get 直接查到，直到被 delete_expired 清理
//! - 检索成功后在后台刷新 lastAccessAt，失败只记日志

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::document_store::{
    DeleteRequest, DocumentRecord, DocumentStore, GetRequest, HybridRequest, Metadata,
    QueryRequest, ScoredDocument, WhereFilter,
};
use super::types::{
    build_memory_id, build_memory_key, now_millis, sanitize_memory_key, DeleteMemoryInput,
    ListMemoryInput, MemoryEntry, MemoryMetadata, RetrieveMemoryInput, UpsertMemoryInput,
    UpsertedMemory, DEFAULT_IMPORTANCE, DEFAULT_SOURCE_MESSAGE_ID, KEY_SEPARATOR,
    MAX_IMPORTANCE, MIN_IMPORTANCE,
};
use crate::core::CoreError;

/// 检索条数相关的上限与倍数
#[derive(Debug, Clone)]
pub struct MemoryStoreOptions {
    pub default_results: usize,
    pub max_results: usize,
    pub result_multiplier: usize,
    pub default_list_limit: usize,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            default_results: 8,
            max_results: 50,
            result_multiplier: 3,
            default_list_limit: 20,
        }
    }
}

impl MemoryStoreOptions {
    fn normalize_results(&self, value: Option<usize>) -> usize {
        match value {
            None | Some(0) => self.default_results.clamp(1, self.max_results),
            Some(n) => n.clamp(1, self.max_results),
        }
    }
}

/// memoryKey 粒度的异步锁表；空闲的锁在释放后回收
#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    /// 按字典序依次加锁，多 key 批次之间不会死锁
    async fn lock_all(&self, keys: &BTreeSet<String>) -> Vec<OwnedMutexGuard<()>> {
        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            keys.iter()
                .map(|key| Arc::clone(map.entry(key.clone()).or_default()))
                .collect()
        };
        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }

    fn release_idle(&self) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// 长期记忆仓库；可在多个并发轮次间共享（Clone 只复制 Arc）
#[derive(Clone)]
pub struct MemoryStore {
    collection: Arc<dyn DocumentStore>,
    locks: Arc<KeyLocks>,
    options: MemoryStoreOptions,
}

impl MemoryStore {
    pub fn new(collection: Arc<dyn DocumentStore>) -> Self {
        Self::with_options(collection, MemoryStoreOptions::default())
    }

    pub fn with_options(collection: Arc<dyn DocumentStore>, options: MemoryStoreOptions) -> Self {
        Self {
            collection,
            locks: Arc::new(KeyLocks::default()),
            options,
        }
    }

    /// 混合检索；空查询直接返回空列表，不访问后端
    pub async fn retrieve(&self, input: RetrieveMemoryInput) -> Result<Vec<MemoryEntry>, CoreError> {
        let query_text = input.query_text.trim();
        if query_text.is_empty() {
            return Ok(Vec::new());
        }
        ensure_owner(&input.tenant_id, &input.user_id)?;

        let n_results = self.options.normalize_results(input.n_results);
        let wide_results = self
            .options
            .normalize_results(Some(n_results * self.options.result_multiplier));

        let mut filter = owner_filter(&input.tenant_id, &input.user_id);
        if let Some(thread_id) = input.thread_id.as_deref().filter(|t| !t.is_empty()) {
            filter = filter.eq("threadId", thread_id);
        }
        filter = filter.any_of("memoryType", input.memory_types.iter().map(|t| t.as_str()));

        let hybrid = self
            .collection
            .hybrid_search(HybridRequest {
                keyword: query_text.to_string(),
                query_text: query_text.to_string(),
                filter: filter.clone(),
                candidate_pool: wide_results,
                n_results: wide_results,
            })
            .await;

        let hits = match hybrid {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %input.tenant_id,
                    user_id = %input.user_id,
                    reason = %e,
                    "memory hybrid search failed, falling back to vector search"
                );
                self.collection
                    .query(QueryRequest {
                        query_text: query_text.to_string(),
                        filter,
                        n_results: wide_results,
                    })
                    .await?
            }
        };

        let now = now_millis();
        let mut entries: Vec<MemoryEntry> = hits
            .into_iter()
            .filter_map(|hit| scored_to_entry(hit, now))
            .filter(|entry| {
                entry.metadata.tenant_id == input.tenant_id && entry.metadata.user_id == input.user_id
            })
            .collect();
        entries.truncate(n_results);

        self.touch_in_background(entries.iter().map(|e| e.id.clone()).collect());
        Ok(entries)
    }

    /// 批量 upsert；同 key 的版本号为已应用写入次数
    pub async fn upsert(&self, inputs: Vec<UpsertMemoryInput>) -> Result<Vec<UpsertedMemory>, CoreError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        for input in &inputs {
            validate_upsert(input)?;
        }

        let prepared: Vec<(UpsertMemoryInput, String, String)> = inputs
            .into_iter()
            .map(|input| {
                let memory_key =
                    build_memory_key(&input.tenant_id, &input.user_id, input.memory_type, &input.key);
                let id = build_memory_id(&memory_key);
                (input, memory_key, id)
            })
            .collect();

        let keys: BTreeSet<String> = prepared.iter().map(|(_, key, _)| key.clone()).collect();
        let guards = self.locks.lock_all(&keys).await;
        let result = self.upsert_locked(prepared).await;
        drop(guards);
        self.locks.release_idle();
        result
    }

    async fn upsert_locked(
        &self,
        prepared: Vec<(UpsertMemoryInput, String, String)>,
    ) -> Result<Vec<UpsertedMemory>, CoreError> {
        let ids: Vec<String> = prepared.iter().map(|(_, _, id)| id.clone()).collect();
        let existing = self.collection.get(GetRequest::by_ids(ids)).await?;

        let mut previous: HashMap<String, MemoryMetadata> = HashMap::new();
        for record in existing {
            match MemoryMetadata::from_map(&record.metadata) {
                Ok(meta) => {
                    previous.insert(record.id, meta);
                }
                Err(reason) => {
                    tracing::warn!(id = %record.id, reason = %reason, "memory metadata invalid, treating as new");
                }
            }
        }

        let now = now_millis();
        let mut records = Vec::with_capacity(prepared.len());
        let mut result = Vec::with_capacity(prepared.len());

        for (input, memory_key, id) in prepared {
            let prior = previous.get(&id);
            let version = prior.map(|m| m.version + 1).unwrap_or(1);
            let metadata = MemoryMetadata {
                tenant_id: input.tenant_id,
                user_id: input.user_id,
                thread_id: input.thread_id,
                memory_type: input.memory_type,
                memory_key: memory_key.clone(),
                importance: input
                    .importance
                    .unwrap_or(DEFAULT_IMPORTANCE)
                    .clamp(MIN_IMPORTANCE, MAX_IMPORTANCE),
                created_at: prior.map(|m| m.created_at).unwrap_or(now),
                last_access_at: now,
                expires_at: input.expires_at,
                source_message_id: input
                    .source_message_id
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_SOURCE_MESSAGE_ID.to_string()),
                version,
                tags: input.tags,
                source_type: input.source_type,
                source_name: input.source_name,
                confidence: input.confidence.map(|c| c.clamp(0.0, 1.0)),
                action_trace_id: input.action_trace_id,
            };

            // 同一批次内重复的 key 依次递增
            previous.insert(id.clone(), metadata.clone());

            records.push(DocumentRecord {
                id: id.clone(),
                document: input.content,
                metadata: metadata.to_map(),
            });
            result.push(UpsertedMemory {
                id,
                memory_key,
                version,
            });
        }

        self.collection.upsert(records).await?;
        tracing::debug!(count = result.len(), "memories upserted");
        Ok(result)
    }

    /// 列举（不含过期条目），顺序由后端决定但稳定
    pub async fn list(&self, input: ListMemoryInput) -> Result<Vec<MemoryEntry>, CoreError> {
        ensure_owner(&input.tenant_id, &input.user_id)?;
        let mut filter = owner_filter(&input.tenant_id, &input.user_id);
        if let Some(memory_type) = input.memory_type {
            filter = filter.eq("memoryType", memory_type.as_str());
        }

        // limit 为 0 时不返回任何条目
        let limit = input.limit.unwrap_or(self.options.default_list_limit);
        let offset = input.offset.unwrap_or(0);
        let now = now_millis();

        // 过期条目在后端分页之后才能剔除，这里在进程内分页以保证 limit 语义
        let records = self.collection.get(GetRequest::by_filter(filter)).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| record_to_entry(record, None, now))
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// 按 id 直接查找（限定在 tenant/user 内），包括尚未清理的过期条目；不刷新访问时间
    pub async fn get(
        &self,
        tenant_id: &str,
        user_id: &str,
        ids: Vec<String>,
    ) -> Result<Vec<MemoryEntry>, CoreError> {
        ensure_owner(tenant_id, user_id)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = GetRequest {
            ids: Some(ids),
            filter: owner_filter(tenant_id, user_id),
            ..Default::default()
        };
        let records = self.collection.get(request).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| record_to_entry(record, None, i64::MIN))
            .collect())
    }

    /// 按 ids 或 memoryKey 删除；两者都未提供时返回 InvalidArgument
    pub async fn delete(&self, input: DeleteMemoryInput) -> Result<(), CoreError> {
        let memory_key = input.memory_key.filter(|k| !k.is_empty());
        if input.ids.is_empty() && memory_key.is_none() {
            return Err(CoreError::InvalidArgument(
                "delete requires ids or memoryKey".to_string(),
            ));
        }
        ensure_owner(&input.tenant_id, &input.user_id)?;

        let mut filter = owner_filter(&input.tenant_id, &input.user_id);
        if let Some(key) = memory_key {
            filter = filter.eq("memoryKey", key);
        }
        let ids = (!input.ids.is_empty()).then_some(input.ids);
        let removed = self.collection.delete(DeleteRequest { ids, filter }).await?;
        tracing::info!(
            tenant_id = %input.tenant_id,
            user_id = %input.user_id,
            removed,
            "memories deleted"
        );
        Ok(())
    }

    /// 有效（未过期）条目总数
    pub async fn count_all(&self) -> Result<usize, CoreError> {
        let now = now_millis();
        let records = self.collection.get(GetRequest::default()).await?;
        Ok(records
            .iter()
            .filter(|record| !metadata_expired(&record.metadata, now))
            .count())
    }

    /// 物理删除过期条目；scope 为 (tenantId, userId) 时只清理该用户
    pub async fn delete_expired(&self, scope: Option<(&str, &str)>) -> Result<usize, CoreError> {
        let now = now_millis();
        let filter = match scope {
            Some((tenant_id, user_id)) => owner_filter(tenant_id, user_id),
            None => WhereFilter::new(),
        };
        let expired: Vec<String> = self
            .collection
            .get(GetRequest::by_filter(filter.clone()))
            .await?
            .into_iter()
            .filter(|record| metadata_expired(&record.metadata, now))
            .map(|record| record.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let removed = self
            .collection
            .delete(DeleteRequest {
                ids: Some(expired),
                filter,
            })
            .await?;
        tracing::info!(removed, "expired memories swept");
        Ok(removed)
    }

    /// 后台刷新 lastAccessAt：只合并该字段，不影响版本号；失败只记日志
    fn touch_in_background(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime available, skipping access-time touch");
            return;
        };
        let collection = Arc::clone(&self.collection);
        handle.spawn(async move {
            let now = now_millis();
            let patches: Vec<(String, Metadata)> = ids
                .into_iter()
                .map(|id| {
                    let mut patch = Metadata::new();
                    patch.insert("lastAccessAt".to_string(), Value::from(now));
                    (id, patch)
                })
                .collect();
            if let Err(e) = collection.update(patches).await {
                tracing::warn!(reason = %e, "memory access-time touch failed");
            }
        });
    }
}

fn ensure_owner(tenant_id: &str, user_id: &str) -> Result<(), CoreError> {
    if tenant_id.trim().is_empty() || user_id.trim().is_empty() {
        return Err(CoreError::InvalidArgument(
            "tenantId and userId are required".to_string(),
        ));
    }
    // memoryKey 以 ':' 拼接各段，身份字段含 ':' 会与其他租户撞 key
    if tenant_id.contains(KEY_SEPARATOR) || user_id.contains(KEY_SEPARATOR) {
        return Err(CoreError::InvalidArgument(format!(
            "tenantId and userId must not contain '{KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}

fn owner_filter(tenant_id: &str, user_id: &str) -> WhereFilter {
    WhereFilter::new()
        .eq("tenantId", tenant_id)
        .eq("userId", user_id)
}

fn validate_upsert(input: &UpsertMemoryInput) -> Result<(), CoreError> {
    ensure_owner(&input.tenant_id, &input.user_id)?;
    if sanitize_memory_key(&input.key).is_empty() {
        return Err(CoreError::InvalidArgument("memory key is empty".to_string()));
    }
    if input.content.trim().is_empty() {
        return Err(CoreError::InvalidArgument("memory content is empty".to_string()));
    }
    Ok(())
}

fn metadata_expired(metadata: &Metadata, now: i64) -> bool {
    metadata
        .get("expiresAt")
        .and_then(Value::as_i64)
        .map(|at| at <= now)
        .unwrap_or(false)
}

fn scored_to_entry(hit: ScoredDocument, now: i64) -> Option<MemoryEntry> {
    record_to_entry(hit.record, Some(hit.score), now)
}

/// 解析元数据；非法或已过期（相对 now）的条目返回 None
fn record_to_entry(record: DocumentRecord, score: Option<f32>, now: i64) -> Option<MemoryEntry> {
    let metadata = match MemoryMetadata::from_map(&record.metadata) {
        Ok(meta) => meta,
        Err(reason) => {
            tracing::warn!(id = %record.id, reason = %reason, "memory metadata invalid, skipped");
            return None;
        }
    };
    if metadata.is_expired(now) {
        return None;
    }
    Some(MemoryEntry {
        id: record.id,
        content: record.document,
        metadata,
        score,
    })
}
