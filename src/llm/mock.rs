//! Mock 补全客户端（用于测试与离线运行，无需 API）

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::message::{last_user_content, Message, Role};
use super::traits::{LlmClient, LlmError};

/// 回显最后一条用户消息，并标出系统提示中注入的记忆条数
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = last_user_content(messages).unwrap_or("(no input)");
        let memories = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .flat_map(|m| m.content.lines())
            .filter(|line| line.contains(". ["))
            .count();
        Ok(format!("Echo from Mock（参考记忆 {memories} 条）: {last_user}"))
    }
}

/// 永远返回 ServiceUnavailable
#[derive(Debug, Default)]
pub struct FailingLlmClient {
    calls: AtomicUsize,
}

impl FailingLlmClient {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::ServiceUnavailable("mock outage".to_string()))
    }
}

/// 按顺序返回预设结果；脚本耗尽后返回空字符串
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user() {
        let out = MockLlmClient
            .complete(&[
                Message::system("历史记忆：\n1. [preference] 喜欢茶"),
                Message::user("你好"),
            ])
            .await
            .unwrap();
        assert!(out.ends_with("你好"));
        assert!(out.contains("1 条"));
    }
}
