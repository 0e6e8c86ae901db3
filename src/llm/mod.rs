//! LLM 层：补全客户端抽象与实现（OpenAI 兼容 / Mock）、重试包装、嵌入

pub mod embedding;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, HashEmbedder, OpenAiEmbedder};
pub use message::{Message, Role};
pub use mock::{FailingLlmClient, MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient};

/// 按 [llm] 段创建补全客户端并包上超时重试；provider=openai 但缺少 API Key 时退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let llm = &cfg.llm;
    let inner: Arc<dyn LlmClient> = if llm.provider.eq_ignore_ascii_case("openai") {
        match std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()) {
            Some(key) => {
                tracing::info!("Using OpenAI-compatible LLM ({})", llm.model);
                let mut client = OpenAiClient::new(llm.base_url.as_deref(), &llm.model, Some(&key));
                if let Some(t) = llm.temperature {
                    client = client.with_temperature(t);
                }
                Arc::new(client)
            }
            None => {
                tracing::warn!("OPENAI_API_KEY not set, using mock LLM");
                Arc::new(MockLlmClient)
            }
        }
    } else {
        tracing::info!("Using mock LLM");
        Arc::new(MockLlmClient)
    };

    Arc::new(RetryingLlmClient::new(
        inner,
        RetryConfig {
            max_retries: llm.max_retries,
            request_timeout: Duration::from_secs(llm.timeouts.request.max(1)),
            backoff: Duration::from_millis(llm.retry_backoff_ms),
        },
    ))
}
