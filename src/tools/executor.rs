//! 工具执行器
//!
//! 持有 ToolRegistry、默认超时与全局白名单。execute 依次检查：工具存在、白名单、参数校验，
//! 然后在超时内调用工具；可重试工具最多尝试 2 次。每次尝试输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{timeout, Instant};

use crate::core::{ActionContext, ActionResult, CoreError};
use crate::tools::ToolRegistry;

pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 10_000;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    default_timeout_ms: u64,
    /// 全局白名单；上下文未给白名单时生效，为空表示不限制
    allowed: Vec<String>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            default_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            allowed: Vec::new(),
        }
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_allowed(mut self, allowed: Vec<String>) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具
    ///
    /// - 未注册：NotFound；不在白名单：NotAllowed；参数不合法：Validation
    /// - 只尝试一次的工具直接返回该次错误（超时为 Timeout）
    /// - 可重试工具用尽尝试后返回聚合的 ToolFailed
    pub async fn execute(
        &self,
        ctx: &ActionContext,
        tool_name: &str,
        args: Value,
    ) -> Result<ActionResult, CoreError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| CoreError::NotFound(format!("tool {tool_name}")))?;

        let allowed = if ctx.allowed_tools.is_empty() {
            &self.allowed
        } else {
            &ctx.allowed_tools
        };
        if !allowed.is_empty() && !allowed.iter().any(|name| name == tool.name()) {
            return Err(CoreError::NotAllowed(tool.name().to_string()));
        }

        let args = tool.validate(&args)?;
        let timeout_ms = tool.timeout_ms().unwrap_or(self.default_timeout_ms);
        let max_attempts: u32 = if tool.retryable() { 2 } else { 1 };
        let preview = args_preview(&args);

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            let start = Instant::now();
            let result = timeout(
                Duration::from_millis(timeout_ms),
                tool.execute(ctx, args.clone()),
            )
            .await;

            let outcome = match result {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(CoreError::Timeout {
                    what: format!("tool {}", tool.name()),
                    timeout_ms,
                }),
            };

            let status = match &outcome {
                Ok(result) if result.is_success() => "success",
                Ok(_) => "failed",
                Err(CoreError::Timeout { .. }) => "timeout",
                Err(_) => "error",
            };
            let audit = serde_json::json!({
                "event": "tool_audit",
                "trace_id": ctx.trace_id,
                "tool": tool.name(),
                "attempt": attempt,
                "status": status,
                "duration_ms": start.elapsed().as_millis() as u64,
                "args_preview": preview,
            });

            match outcome {
                Ok(result) => {
                    tracing::info!(audit = %audit, "tool");
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(audit = %audit, reason = %e, "tool attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| {
            CoreError::BackendUnavailable(format!("tool {} produced no outcome", tool.name()))
        });
        if max_attempts == 1 {
            return Err(last_error);
        }
        Err(CoreError::ToolFailed {
            tool: tool.name().to_string(),
            attempts: max_attempts,
            reason: last_error.to_string(),
        })
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ExternalTool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Hanging {
        retryable: bool,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ExternalTool for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }
        fn description(&self) -> &str {
            "never resolves"
        }
        fn input_schema(&self) -> Value {
            json!({})
        }
        fn timeout_ms(&self) -> Option<u64> {
            Some(100)
        }
        fn retryable(&self) -> bool {
            self.retryable
        }
        fn validate(&self, args: &Value) -> Result<Value, CoreError> {
            Ok(args.clone())
        }
        async fn execute(&self, _: &ActionContext, _: Value) -> Result<ActionResult, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    fn executor_with(tool: Hanging) -> ToolExecutor {
        let mut registry = ToolRegistry::with_builtin();
        registry.register(tool);
        ToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor_with(Hanging {
            retryable: false,
            calls: calls.clone(),
        });
        let start = Instant::now();
        let err = executor
            .execute(&ActionContext::default(), "hanging", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Timeout { timeout_ms: 100, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_attempted_twice() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor_with(Hanging {
            retryable: true,
            calls: calls.clone(),
        });
        let err = executor
            .execute(&ActionContext::default(), "hanging", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolFailed { attempts: 2, ref reason, .. } if reason.contains("Timed out")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_policy_errors() {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::with_builtin()));
        let err = executor
            .execute(&ActionContext::default(), "missing", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let ctx = ActionContext {
            allowed_tools: vec!["current_time".into()],
            ..Default::default()
        };
        let err = executor
            .execute(&ctx, "echo_tool", json!({"text": "hi"}))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::NotAllowed("echo_tool".into()));

        let err = executor
            .execute(&ActionContext::default(), "echo_tool", json!({"text": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_global_allow_list() {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::with_builtin()))
            .with_allowed(vec!["echo_tool".into()]);
        assert!(executor
            .execute(&ActionContext::default(), "current_time", json!({}))
            .await
            .is_err());
        let ok = executor
            .execute(&ActionContext::default(), "echo_tool", json!({"text": "hi"}))
            .await
            .unwrap();
        assert!(ok.is_success());
    }
}
