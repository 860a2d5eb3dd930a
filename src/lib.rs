//! Tasuki - 多智能体编码编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与默认 prompt
//! - **core**: 会话、任务存储、planner 注册表、事件日志、Worker 池与轮次调度
//! - **llm**: 调用边界（ChatProvider）、OpenAI 兼容 / Cursor CLI / Mock 后端、带重试与回退的 ResilientClient
//! - **react**: Planner 与 Worker 两种角色、回复抽取、handoff 文档
//! - **repo**: Worker 工作副本的准备与仓库概览
//! - **tools**: Worker 工具（run_cmd、read_file、edit_file）与执行器
//! - **observability**: tracing 初始化

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod repo;
pub mod text;
pub mod tools;

pub use crate::config::AppConfig;
pub use crate::core::{HarnessError, RoundScheduler, Session, Task, TaskStatus};
