//! Worker 可用的工具：run_cmd / read_file / edit_file，以及注册表与执行器

pub mod edit_file;
pub mod executor;
pub mod read_file;
pub mod registry;
pub mod shell;

pub use edit_file::EditFileTool;
pub use executor::ToolExecutor;
pub use read_file::ReadFileTool;
pub use registry::{Tool, ToolRegistry};
pub use shell::RunCmdTool;

use crate::config::ToolsSection;

/// 默认工具集
pub fn default_registry(cfg: &ToolsSection) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(RunCmdTool::new(cfg));
    registry.register(ReadFileTool::new(cfg.max_output_chars));
    registry.register(EditFileTool);
    registry
}

/// 默认执行器；外层超时比 run_cmd 自身上限略宽，让命令自己的超时先生效
pub fn default_executor(cfg: &ToolsSection) -> ToolExecutor {
    ToolExecutor::new(default_registry(cfg), cfg.max_timeout_secs.saturating_add(30))
}
