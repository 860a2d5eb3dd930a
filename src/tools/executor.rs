//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用的超时上限。工具失败、超时、未知工具名都转成以 `ERROR:` 开头的文本，
//! 作为 tool_result 反馈给 worker，不会中断工具循环。每次调用输出结构化审计日志（JSON）。

use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::text::preview;
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具，总是返回文本
    pub async fn execute(&self, tool_name: &str, args: &Value, cwd: &Path) -> String {
        let Some(tool) = self.registry.get(tool_name) else {
            tracing::warn!(tool = %tool_name, "Unknown tool requested");
            return format!(
                "ERROR: unknown tool '{}'. Available: {}",
                tool_name,
                self.registry.tool_names().join(", ")
            );
        };

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(args, cwd)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview(&args.to_string(), 200),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => content,
            Ok(Err(e)) if e.starts_with("ERROR:") => e,
            Ok(Err(e)) => format!("ERROR: {e}"),
            Err(_) => format!(
                "ERROR: tool '{}' timed out after {}s",
                tool_name,
                self.timeout.as_secs()
            ),
        }
    }

    /// 已注册工具的 "- name: description" 列表
    pub fn describe(&self) -> String {
        self.registry.describe()
    }
}
