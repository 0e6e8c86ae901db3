//! 记忆仓库集成测试：版本单调、并发同 key、过期排除、检索上界与降级、租户隔离

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use honeycomb::core::CoreError;
    use honeycomb::llm::HashEmbedder;
    use honeycomb::memory::{
        DeleteMemoryInput, DeleteRequest, DocumentRecord, DocumentStore, GetRequest,
        HybridRequest, InMemoryCollection, ListMemoryInput, MemoryStore, MemoryType, Metadata,
        QueryRequest, RetrieveMemoryInput, ScoredDocument, SqliteCollection, UpsertMemoryInput,
    };

    /// 包装内存后端：统计各方法调用次数，可让混合检索失败
    struct Instrumented {
        inner: InMemoryCollection,
        fail_hybrid: bool,
        hybrid_calls: AtomicUsize,
        query_calls: AtomicUsize,
        update_calls: AtomicUsize,
    }

    impl Instrumented {
        fn new(fail_hybrid: bool) -> Self {
            Self {
                inner: InMemoryCollection::new(Arc::new(HashEmbedder::new(128))),
                fail_hybrid,
                hybrid_calls: AtomicUsize::new(0),
                query_calls: AtomicUsize::new(0),
                update_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for Instrumented {
        async fn upsert(&self, records: Vec<DocumentRecord>) -> Result<(), CoreError> {
            self.inner.upsert(records).await
        }

        async fn get(&self, request: GetRequest) -> Result<Vec<DocumentRecord>, CoreError> {
            self.inner.get(request).await
        }

        async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredDocument>, CoreError> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.query(request).await
        }

        async fn hybrid_search(
            &self,
            request: HybridRequest,
        ) -> Result<Vec<ScoredDocument>, CoreError> {
            self.hybrid_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_hybrid {
                return Err(CoreError::BackendUnavailable("rrf not supported".into()));
            }
            self.inner.hybrid_search(request).await
        }

        async fn update(&self, patches: Vec<(String, Metadata)>) -> Result<(), CoreError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.update(patches).await
        }

        async fn delete(&self, request: DeleteRequest) -> Result<usize, CoreError> {
            self.inner.delete(request).await
        }

        async fn count(&self) -> Result<usize, CoreError> {
            self.inner.count().await
        }
    }

    fn memory_store() -> MemoryStore {
        MemoryStore::new(Arc::new(InMemoryCollection::new(Arc::new(HashEmbedder::new(128)))))
    }

    fn fact(tenant: &str, user: &str, key: &str, content: &str) -> UpsertMemoryInput {
        UpsertMemoryInput::new(tenant, user, MemoryType::Fact, key, content)
    }

    #[tokio::test]
    async fn test_sequential_upserts_are_monotonic() {
        let store = memory_store();
        let mut created_at = None;
        for n in 1..=5u64 {
            let out = store
                .upsert(vec![
                    fact("t", "u", "drink", &format!("第 {n} 次：喜欢绿茶")),
                    fact("t", "u", &format!("other-{n}"), "unrelated"),
                ])
                .await
                .unwrap();
            assert_eq!(out[0].version, n);
            assert_eq!(out[1].version, 1);

            let got = store.get("t", "u", vec![out[0].id.clone()]).await.unwrap();
            let meta = &got[0].metadata;
            assert_eq!(meta.version, n);
            assert_eq!(*created_at.get_or_insert(meta.created_at), meta.created_at);
        }
    }

    #[tokio::test]
    async fn test_concurrent_same_key_upserts_never_skip_versions() {
        let store = memory_store();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert(vec![fact("t", "u", "shared", &format!("writer {i}"))])
                        .await
                        .unwrap()[0]
                        .version
                })
            })
            .collect();

        let mut versions = BTreeSet::new();
        for handle in handles {
            versions.insert(handle.await.unwrap());
        }
        assert_eq!(versions, (1..=16).collect::<BTreeSet<u64>>());

        let listed = store
            .list(ListMemoryInput {
                tenant_id: "t".into(),
                user_id: "u".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.version, 16);
    }

    #[tokio::test]
    async fn test_expired_entries_only_visible_by_direct_lookup() {
        let store = memory_store();
        let past = chrono::Utc::now().timestamp_millis() - 1_000;
        let out = store
            .upsert(vec![
                fact("t", "u", "old", "过期的茶叶偏好").expires_at(past),
                fact("t", "u", "fresh", "现在的茶叶偏好"),
            ])
            .await
            .unwrap();

        let retrieved = store
            .retrieve(RetrieveMemoryInput::new("t", "u", "茶叶偏好"))
            .await
            .unwrap();
        assert!(retrieved.iter().all(|e| e.id != out[0].id));
        assert!(retrieved.iter().any(|e| e.id == out[1].id));

        let listed = store
            .list(ListMemoryInput {
                tenant_id: "t".into(),
                user_id: "u".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.count_all().await.unwrap(), 1);

        let direct = store.get("t", "u", vec![out[0].id.clone()]).await.unwrap();
        assert_eq!(direct.len(), 1);

        assert_eq!(store.delete_expired(Some(("t", "u"))).await.unwrap(), 1);
        assert!(store.get("t", "u", vec![out[0].id.clone()]).await.unwrap().is_empty());
        assert_eq!(store.delete_expired(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_bounding_and_empty_query() {
        let backend = Arc::new(Instrumented::new(false));
        let store = MemoryStore::new(backend.clone());
        let inputs = (0..30)
            .map(|i| fact("t", "u", &format!("k{i}"), &format!("green tea note {i}")))
            .collect();
        store.upsert(inputs).await.unwrap();

        let hits = store
            .retrieve(RetrieveMemoryInput::new("t", "u", "green tea").n_results(5))
            .await
            .unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|h| h.score.is_some()));

        let many = store
            .retrieve(RetrieveMemoryInput::new("t", "u", "green tea").n_results(500))
            .await
            .unwrap();
        assert!(many.len() <= 50);

        let before = backend.hybrid_calls.load(Ordering::SeqCst);
        let empty = store
            .retrieve(RetrieveMemoryInput::new("t", "u", "   "))
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert_eq!(backend.hybrid_calls.load(Ordering::SeqCst), before);
        assert_eq!(backend.query_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hybrid_failure_falls_back_to_vector() {
        let backend = Arc::new(Instrumented::new(true));
        let store = MemoryStore::new(backend.clone());
        store
            .upsert(vec![
                fact("t", "u", "drink", "我喜欢喝茶"),
                fact("t", "u", "editor", "vim keybindings everywhere"),
            ])
            .await
            .unwrap();

        // 向量退路返回最近的 n 条，不要求相似度为正
        let hits = store
            .retrieve(RetrieveMemoryInput::new("t", "u", "我喜欢喝茶"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "我喜欢喝茶");
        assert_eq!(backend.hybrid_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.query_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrieve_touches_access_time_in_background() {
        let backend = Arc::new(Instrumented::new(false));
        let store = MemoryStore::new(backend.clone());
        let out = store
            .upsert(vec![fact("t", "u", "drink", "我喜欢喝茶")])
            .await
            .unwrap();
        store
            .retrieve(RetrieveMemoryInput::new("t", "u", "喝茶"))
            .await
            .unwrap();

        for _ in 0..50 {
            if backend.update_calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.update_calls.load(Ordering::SeqCst), 1);
        let got = store.get("t", "u", vec![out[0].id.clone()]).await.unwrap();
        assert_eq!(got[0].metadata.version, 1);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = memory_store();
        let out = store
            .upsert(vec![
                fact("t1", "u", "drink", "我喜欢喝茶"),
                fact("t2", "u", "drink", "我喜欢喝茶"),
            ])
            .await
            .unwrap();
        assert_ne!(out[0].id, out[1].id);

        let hits = store
            .retrieve(RetrieveMemoryInput::new("t1", "u", "喝茶"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.tenant_id, "t1");

        assert!(store.get("t2", "u", vec![out[0].id.clone()]).await.unwrap().is_empty());

        store
            .delete(DeleteMemoryInput {
                tenant_id: "t2".into(),
                user_id: "u".into(),
                ids: vec![out[0].id.clone()],
                memory_key: None,
            })
            .await
            .unwrap();
        assert_eq!(store.count_all().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_separator_in_owner_cannot_alias_another_tenant() {
        let store = memory_store();
        let err = store
            .upsert(vec![fact("acme:eu", "alice", "k", "A secret")])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        let err = store
            .upsert(vec![fact("acme", "eu:alice", "k", "B data")])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert_eq!(store.count_all().await.unwrap(), 0);

        let a = store
            .upsert(vec![fact("acme-eu", "alice", "k", "A secret")])
            .await
            .unwrap();
        let b = store
            .upsert(vec![fact("acme", "eu-alice", "k", "B data")])
            .await
            .unwrap();
        assert_ne!(a[0].id, b[0].id);
        assert_eq!((a[0].version, b[0].version), (1, 1));

        let kept = store.get("acme-eu", "alice", vec![a[0].id.clone()]).await.unwrap();
        assert_eq!(kept[0].content, "A secret");

        assert!(store
            .retrieve(RetrieveMemoryInput::new("acme:eu", "alice", "secret"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_limit_zero_returns_nothing() {
        let store = memory_store();
        store
            .upsert(vec![fact("t", "u", "a", "绿茶"), fact("t", "u", "b", "红茶")])
            .await
            .unwrap();
        let list = |limit| {
            store.list(ListMemoryInput {
                tenant_id: "t".into(),
                user_id: "u".into(),
                limit,
                ..Default::default()
            })
        };
        assert!(list(Some(0)).await.unwrap().is_empty());
        assert_eq!(list(Some(1)).await.unwrap().len(), 1);
        assert_eq!(list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_memory_key() {
        let store = memory_store();
        let out = store
            .upsert(vec![fact("t", "u", "Favorite Drink", "绿茶")])
            .await
            .unwrap();
        store
            .delete(DeleteMemoryInput {
                tenant_id: "t".into(),
                user_id: "u".into(),
                ids: Vec::new(),
                memory_key: Some(out[0].memory_key.clone()),
            })
            .await
            .unwrap();
        assert_eq!(store.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let collection =
            SqliteCollection::open(dir.path().join("mem.db"), Arc::new(HashEmbedder::new(64)))
                .unwrap();
        let store = MemoryStore::new(Arc::new(collection));

        store
            .upsert(vec![fact("t", "u", "drink", "我喜欢喝茶")])
            .await
            .unwrap();
        let out = store
            .upsert(vec![fact("t", "u", "drink", "我喜欢喝乌龙茶")])
            .await
            .unwrap();
        assert_eq!(out[0].version, 2);

        let hits = store
            .retrieve(RetrieveMemoryInput::new("t", "u", "乌龙茶"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "我喜欢喝乌龙茶");
    }
}
