//! Honeycomb - 多租户长期记忆对话智能体核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、动作结果、单轮状态、阶段管线与 Turn Runner
//! - **llm**: 补全客户端抽象与实现（OpenAI 兼容 / Mock）、重试包装、嵌入
//! - **memory**: 长期记忆模型、文档库后端（内存 / SQLite）、混合检索、规则抽取
//! - **observability**: tracing 初始化
//! - **skills**: 按消息内容隐式触发的技能
//! - **tools**: 通过 `/tool` 指令显式调用的外部工具与执行策略

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod skills;
pub mod tools;

pub use crate::core::{TurnInput, TurnRunner, TurnState};
