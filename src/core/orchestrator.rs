//! Turn Runner：单轮对话的公共入口
//!
//! 负责：按配置构建记忆库、技能、工具执行器与补全客户端（进程内各一份，Arc 共享），
//! 为每轮生成初始 TurnState 并驱动管线走到终态。run 从不返回错误，业务失败体现在 degraded 上。

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;

use super::error::CoreError;
use super::pipeline::{run_pipeline, Collaborators};
use super::state::{TurnInput, TurnState};
use crate::config::AppConfig;
use crate::llm::{create_embedder_from_config, create_llm_from_config, LlmClient};
use crate::memory::{
    DocumentStore, InMemoryCollection, MemoryStore, MemoryStoreOptions, SqliteCollection,
};
use crate::skills::{SkillDescriptor, SkillRegistry};
use crate::tools::{ToolDescriptor, ToolExecutor, ToolRegistry};

#[derive(Clone)]
pub struct TurnRunner {
    deps: Arc<Collaborators>,
    default_tool_timeout_ms: u64,
}

impl TurnRunner {
    pub fn new(
        memory: MemoryStore,
        skills: SkillRegistry,
        tools: ToolExecutor,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self::assemble(
            Collaborators {
                memory,
                skills: Arc::new(skills),
                tools: Arc::new(tools),
                llm,
                retrieve_results: MemoryStoreOptions::default().default_results,
            },
            crate::tools::DEFAULT_TOOL_TIMEOUT_MS,
        )
    }

    fn assemble(deps: Collaborators, default_tool_timeout_ms: u64) -> Self {
        Self {
            deps: Arc::new(deps),
            default_tool_timeout_ms,
        }
    }

    /// 按配置构建全部依赖
    pub fn from_config(cfg: &AppConfig) -> Result<Self, CoreError> {
        let embedder = create_embedder_from_config(&cfg.embedding, cfg.llm.base_url.as_deref());
        let collection: Arc<dyn DocumentStore> = match cfg.memory.backend.to_lowercase().as_str() {
            "sqlite" => {
                tracing::info!(path = %cfg.memory.sqlite_path.display(), "Using SQLite memory backend");
                Arc::new(SqliteCollection::open(&cfg.memory.sqlite_path, embedder)?)
            }
            "in_memory" | "memory" => Arc::new(InMemoryCollection::new(embedder)),
            other => {
                return Err(CoreError::InvalidArgument(format!(
                    "unknown memory backend: {other}"
                )))
            }
        };

        let options = MemoryStoreOptions {
            default_results: cfg.memory.default_results.max(1),
            max_results: cfg.memory.max_results.max(1),
            result_multiplier: cfg.memory.result_multiplier.max(1),
            ..Default::default()
        };
        let retrieve_results = options.default_results.min(options.max_results);
        let memory = MemoryStore::with_options(collection, options);

        let tools = ToolExecutor::new(Arc::new(ToolRegistry::with_builtin()))
            .with_default_timeout_ms(cfg.tools.default_timeout_ms)
            .with_allowed(cfg.tools.allowed.clone());

        Ok(Self::assemble(
            Collaborators {
                memory,
                skills: Arc::new(SkillRegistry::with_builtin()),
                tools: Arc::new(tools),
                llm: create_llm_from_config(cfg),
                retrieve_results,
            },
            cfg.tools.default_timeout_ms,
        ))
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.deps.memory
    }

    pub fn skill_descriptors(&self) -> Vec<SkillDescriptor> {
        self.deps.skills.descriptors()
    }

    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        self.deps.tools.registry().descriptors(self.default_tool_timeout_ms)
    }

    /// 执行一轮对话；缺少 trace id 时生成 UUID v4
    pub async fn run(&self, input: TurnInput) -> TurnState {
        let trace_id = input
            .trace_id
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let state = TurnState::from_input(input, trace_id);
        let started = Instant::now();

        let state = run_pipeline(&self.deps, state).await;

        tracing::info!(
            trace_id = %state.trace_id,
            tenant_id = %state.tenant_id,
            user_id = %state.user_id,
            planned_action = ?state.planned_action,
            retrieved = state.retrieved_count(),
            persisted = state.persisted_count,
            degraded = state.degraded,
            duration_ms = started.elapsed().as_millis() as u64,
            "turn completed"
        );
        state
    }

    /// 并发执行多轮（各轮状态互不共享）
    pub async fn run_many(&self, inputs: Vec<TurnInput>) -> Vec<TurnState> {
        join_all(inputs.into_iter().map(|input| self.run(input))).await
    }
}
