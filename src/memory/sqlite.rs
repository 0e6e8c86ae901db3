//! SQLite 文档库：单表 (id, document, metadata JSON, embedding JSON)
//!
//! rusqlite 为同步接口，所有访问经 spawn_blocking 执行；整批 upsert 在一个事务内提交。
//! 过滤与排名在进程内完成，适合单机规模。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::document_store::{
    DeleteRequest, DocumentRecord, DocumentStore, GetRequest, HybridRequest, Metadata,
    QueryRequest, ScoredDocument,
};
use super::ranking;
use crate::core::CoreError;
use crate::llm::EmbeddingProvider;

pub struct SqliteCollection {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

type Row = (DocumentRecord, Vec<f32>);

impl SqliteCollection {
    /// 打开（必要时创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self, CoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(CoreError::backend)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn, embedder)
    }

    pub fn open_in_memory(embedder: Arc<dyn EmbeddingProvider>) -> Result<Self, CoreError> {
        Self::from_connection(Connection::open_in_memory()?, embedder)
    }

    fn from_connection(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self, CoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory_documents (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CoreError::BackendUnavailable("sqlite connection poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(CoreError::backend)?
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| CoreError::BackendUnavailable(format!("embedding failed: {e}")))
    }
}

fn load_rows(conn: &Connection) -> Result<Vec<Row>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT id, document, metadata, embedding FROM memory_documents ORDER BY id")?;
    let raw = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut rows = Vec::new();
    for item in raw {
        let (id, document, metadata, embedding) = item?;
        let metadata: Metadata = serde_json::from_str(&metadata)?;
        let embedding: Vec<f32> = serde_json::from_str(&embedding)?;
        rows.push((
            DocumentRecord {
                id,
                document,
                metadata,
            },
            embedding,
        ));
    }
    Ok(rows)
}

#[async_trait]
impl DocumentStore for SqliteCollection {
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

        let mut encoded = Vec::with_capacity(records.len());
        for (record, embedding) in records.into_iter().zip(embeddings) {
            let metadata = serde_json::to_string(&record.metadata)?;
            let embedding = serde_json::to_string(&embedding)?;
            encoded.push((record.id, record.document, metadata, embedding));
        }

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO memory_documents (id, document, metadata, embedding)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        document = excluded.document,
                        metadata = excluded.metadata,
                        embedding = excluded.embedding",
                )?;
                for (id, document, metadata, embedding) in &encoded {
                    stmt.execute(params![id, document, metadata, embedding])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, request: GetRequest) -> Result<Vec<DocumentRecord>, CoreError> {
        self.with_conn(move |conn| {
            let rows = load_rows(conn)?;
            Ok(rows
                .into_iter()
                .map(|(record, _)| record)
                .filter(|record| request.matches(record))
                .skip(request.offset)
                .take(request.limit.unwrap_or(usize::MAX))
                .collect())
        })
        .await
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredDocument>, CoreError> {
        let query_embedding = self.embed(&request.query_text).await?;
        self.with_conn(move |conn| {
            let rows = load_rows(conn)?;
            let candidates = rows
                .iter()
                .filter(|(record, _)| request.filter.matches(&record.metadata))
                .map(|(record, embedding)| (record, embedding.as_slice()));
            Ok(ranking::rank_by_vector(
                &query_embedding,
                candidates,
                request.n_results,
            ))
        })
        .await
    }

    async fn hybrid_search(
        &self,
        request: HybridRequest,
    ) -> Result<Vec<ScoredDocument>, CoreError> {
        let query_embedding = self.embed(&request.query_text).await?;
        self.with_conn(move |conn| {
            let rows = load_rows(conn)?;
            let candidates: Vec<(&DocumentRecord, &[f32])> = rows
                .iter()
                .filter(|(record, _)| request.filter.matches(&record.metadata))
                .map(|(record, embedding)| (record, embedding.as_slice()))
                .collect();
            Ok(ranking::hybrid_rank(
                &request.keyword,
                &query_embedding,
                candidates,
                request.candidate_pool,
                request.n_results,
            ))
        })
        .await
    }

    async fn update(&self, patches: Vec<(String, Metadata)>) -> Result<(), CoreError> {
        if patches.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for (id, patch) in patches {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT metadata FROM memory_documents WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                let Some(current) = current else {
                    continue;
                };
                let mut metadata: Metadata = serde_json::from_str(&current)?;
                metadata.extend(patch);
                tx.execute(
                    "UPDATE memory_documents SET metadata = ?1 WHERE id = ?2",
                    params![serde_json::to_string(&metadata)?, id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<usize, CoreError> {
        request.ensure_selector()?;
        self.with_conn(move |conn| {
            let doomed: Vec<String> = load_rows(conn)?
                .into_iter()
                .filter(|(record, _)| request.matches(record))
                .map(|(record, _)| record.id)
                .collect();
            let tx = conn.transaction()?;
            let mut removed = 0;
            for id in &doomed {
                removed += tx.execute("DELETE FROM memory_documents WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn count(&self) -> Result<usize, CoreError> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM memory_documents", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;
    use crate::memory::document_store::WhereFilter;
    use serde_json::json;

    fn record(id: &str, document: &str, tenant: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            document: document.to_string(),
            metadata: json!({ "tenantId": tenant, "version": 1 })
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.db");
        {
            let c = SqliteCollection::open(&path, Arc::new(HashEmbedder::new(32))).unwrap();
            c.upsert(vec![record("a", "green tea", "t1")]).await.unwrap();
        }
        let reopened = SqliteCollection::open(&path, Arc::new(HashEmbedder::new(32))).unwrap();
        let got = reopened.get(GetRequest::by_ids(vec!["a".into()])).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].document, "green tea");
    }

    #[tokio::test]
    async fn test_sqlite_upsert_overwrites_and_update_merges() {
        let c = SqliteCollection::open_in_memory(Arc::new(HashEmbedder::new(32))).unwrap();
        c.upsert(vec![record("a", "green tea", "t1")]).await.unwrap();
        c.upsert(vec![record("a", "black tea", "t1")]).await.unwrap();
        let patch = json!({ "lastAccessAt": 7 }).as_object().cloned().unwrap();
        c.update(vec![("a".into(), patch)]).await.unwrap();

        let got = c.get(GetRequest::by_ids(vec!["a".into()])).await.unwrap();
        assert_eq!(got[0].document, "black tea");
        assert_eq!(got[0].metadata.get("lastAccessAt"), Some(&json!(7)));
        assert_eq!(got[0].metadata.get("version"), Some(&json!(1)));
        assert_eq!(c.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_hybrid_and_delete() {
        let c = SqliteCollection::open_in_memory(Arc::new(HashEmbedder::new(32))).unwrap();
        c.upsert(vec![
            record("a", "green tea every morning", "t1"),
            record("b", "green tea", "t2"),
        ])
        .await
        .unwrap();
        let hits = c
            .hybrid_search(HybridRequest {
                keyword: "green tea".into(),
                query_text: "green tea".into(),
                filter: WhereFilter::new().eq("tenantId", "t1"),
                candidate_pool: 5,
                n_results: 5,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "a");

        let removed = c
            .delete(DeleteRequest {
                ids: None,
                filter: WhereFilter::new().eq("tenantId", "t2"),
            })
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(c.count().await.unwrap(), 1);
    }
}
