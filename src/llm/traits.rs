//! 补全服务抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient；RetryingLlmClient 为任意后端加上单次请求超时与瞬时错误重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::message::Message;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("completion service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("completion request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// 服务返回了空内容
    #[error("completion service returned empty content")]
    EmptyResponse,
}

impl LlmError {
    /// 可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::ServiceUnavailable(_) | LlmError::Timeout { .. })
    }
}

/// 补全服务：输入有序消息列表，返回回复文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 首次失败后额外重试次数
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            request_timeout: Duration::from_secs(20),
            backoff: Duration::from_millis(500),
        }
    }
}

/// 超时 + 重试包装：瞬时错误固定间隔重试，EmptyResponse 不重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let timeout_ms = self.config.request_timeout.as_millis() as u64;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome =
                match tokio::time::timeout(self.config.request_timeout, self.inner.complete(messages))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout { timeout_ms }),
                };

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt <= self.config.max_retries => {
                    tracing::warn!(attempt, error = %e, "completion failed, retrying");
                    tokio::time::sleep(self.config.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
