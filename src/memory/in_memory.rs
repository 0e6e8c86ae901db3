//! 内存文档库：开发、测试与未配置持久化后端时使用
//!
//! 按 id 有序存放（列举顺序稳定）；整批 upsert 在同一把写锁内完成，对读者原子可见。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::document_store::{
    DeleteRequest, DocumentRecord, DocumentStore, GetRequest, HybridRequest, Metadata,
    QueryRequest, ScoredDocument,
};
use super::ranking;
use crate::core::CoreError;
use crate::llm::EmbeddingProvider;

struct Row {
    record: DocumentRecord,
    embedding: Vec<f32>,
}

pub struct InMemoryCollection {
    rows: RwLock<BTreeMap<String, Row>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl InMemoryCollection {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            embedder,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| CoreError::BackendUnavailable(format!("embedding failed: {e}")))
    }
}

#[async_trait]
impl DocumentStore for InMemoryCollection {
    async fn upsert(&self, records: Vec<DocumentRecord>) -> Result<(), CoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| CoreError::BackendUnavailable(format!("embedding failed: {e}")))?;

        let mut rows = self.rows.write().await;
        for (record, embedding) in records.into_iter().zip(embeddings) {
            rows.insert(record.id.clone(), Row { record, embedding });
        }
        Ok(())
    }

    async fn get(&self, request: GetRequest) -> Result<Vec<DocumentRecord>, CoreError> {
        let rows = self.rows.read().await;
        let matched = rows
            .values()
            .filter(|row| request.matches(&row.record))
            .skip(request.offset)
            .take(request.limit.unwrap_or(usize::MAX))
            .map(|row| row.record.clone())
            .collect();
        Ok(matched)
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredDocument>, CoreError> {
        let query_embedding = self.embed(&request.query_text).await?;
        let rows = self.rows.read().await;
        let candidates = rows
            .values()
            .filter(|row| request.filter.matches(&row.record.metadata))
            .map(|row| (&row.record, row.embedding.as_slice()));
        Ok(ranking::rank_by_vector(
            &query_embedding,
            candidates,
            request.n_results,
        ))
    }

    async fn hybrid_search(
        &self,
        request: HybridRequest,
    ) -> Result<Vec<ScoredDocument>, CoreError> {
        let query_embedding = self.embed(&request.query_text).await?;
        let rows = self.rows.read().await;
        let candidates: Vec<(&DocumentRecord, &[f32])> = rows
            .values()
            .filter(|row| request.filter.matches(&row.record.metadata))
            .map(|row| (&row.record, row.embedding.as_slice()))
            .collect();
        Ok(ranking::hybrid_rank(
            &request.keyword,
            &query_embedding,
            candidates,
            request.candidate_pool,
            request.n_results,
        ))
    }

    async fn update(&self, patches: Vec<(String, Metadata)>) -> Result<(), CoreError> {
        let mut rows = self.rows.write().await;
        for (id, patch) in patches {
            if let Some(row) = rows.get_mut(&id) {
                row.record.metadata.extend(patch);
            }
        }
        Ok(())
    }

    async fn delete(&self, request: DeleteRequest) -> Result<usize, CoreError> {
        request.ensure_selector()?;
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| !request.matches(&row.record));
        Ok(before - rows.len())
    }

    async fn count(&self) -> Result<usize, CoreError> {
        Ok(self.rows.read().await.len())
    }
}
