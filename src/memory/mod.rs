//! 长期记忆：数据模型、文档库接口与本地后端、混合检索排名、记忆仓库、规则抽取

pub mod document_store;
pub mod extractor;
pub mod in_memory;
pub mod ranking;
pub mod sqlite;
pub mod store;
pub mod tokenizer;
pub mod types;

pub use document_store::{
    DeleteRequest, DocumentRecord, DocumentStore, GetRequest, HybridRequest, Metadata,
    QueryRequest, ScoredDocument, WhereFilter,
};
pub use extractor::extract_memory_candidates;
pub use in_memory::InMemoryCollection;
pub use sqlite::SqliteCollection;
pub use store::{MemoryStore, MemoryStoreOptions};
pub use types::{
    build_memory_id, build_memory_key, sanitize_memory_key, DeleteMemoryInput, ListMemoryInput,
    MemoryEntry, MemoryMetadata, MemorySourceType, MemoryType, RetrieveMemoryInput,
    UpsertMemoryInput, UpsertedMemory, KEY_SEPARATOR,
};
