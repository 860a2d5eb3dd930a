//! 编排引擎错误类型

use thiserror::Error;

use crate::llm::LlmError;

/// 任务存储 / Planner 注册表 / 轮次调度中可能出现的错误
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Unknown planner: {0}")]
    UnknownPlanner(String),

    /// root planner 的调用彻底失败时中止本轮
    #[error("Root planner failed: {0}")]
    RootPlanner(LlmError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Worker pool closed")]
    PoolClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
