//! run_cmd：在工作目录中执行 shell 命令
//!
//! 通过 sh -c / cmd /C 执行，超时 = min(参数或默认值, 上限)。
//! 输出为 stdout + `[stderr]` + `[exit_code: N]`，各流分别截断。拒绝少量破坏性模式。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::ToolsSection;
use crate::text::truncate_chars;
use crate::tools::registry::{arg_str, arg_u64};
use crate::tools::Tool;

/// 即使在隔离副本中也不允许的子串
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "rm -rf ~",
    "curl | sh",
    "wget -o- | sh",
    "chmod 777 /",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

pub struct RunCmdTool {
    default_timeout_secs: u64,
    max_timeout_secs: u64,
    max_output_chars: usize,
}

impl RunCmdTool {
    pub fn new(cfg: &ToolsSection) -> Self {
        Self {
            default_timeout_secs: cfg.default_timeout_secs,
            max_timeout_secs: cfg.max_timeout_secs,
            max_output_chars: cfg.max_output_chars,
        }
    }

    fn check(raw: &str) -> Result<(), String> {
        if raw.is_empty() {
            return Err("ERROR: 'command' is required".to_string());
        }
        let lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if lower.contains(forbidden) {
                return Err(format!("ERROR: forbidden pattern: {forbidden}"));
            }
        }
        Ok(())
    }

    fn timeout_for(&self, args: &Value) -> u64 {
        arg_u64(args, "timeout")
            .unwrap_or(self.default_timeout_secs)
            .min(self.max_timeout_secs)
            .max(1)
    }
}

#[async_trait]
impl Tool for RunCmdTool {
    fn name(&self) -> &str {
        "run_cmd"
    }

    fn description(&self) -> &str {
        "Run a shell command in the repository. Args: command (required), timeout (seconds, optional)."
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<String, String> {
        let command = arg_str(args, "command").unwrap_or("").trim();
        Self::check(command)?;
        let timeout_secs = self.timeout_for(args);

        tracing::info!(command = %command, cwd = %cwd.display(), timeout_secs, "run_cmd execute");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(cwd).kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
            .map_err(|_| format!("ERROR: command timed out after {timeout_secs}s"))?
            .map_err(|e| format!("ERROR: {e}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut out = truncate_chars(&stdout, self.max_output_chars).to_string();
        if !stderr.is_empty() {
            out.push_str("\n[stderr]\n");
            out.push_str(truncate_chars(&stderr, self.max_output_chars));
        }
        let code = output.status.code().unwrap_or(-1);
        out.push_str(&format!("\n[exit_code: {code}]"));
        Ok(out)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use serde_json::json;

    use super::*;

    fn tool() -> RunCmdTool {
        RunCmdTool::new(&ToolsSection::default())
    }

    #[tokio::test]
    async fn test_runs_in_cwd_with_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = tool()
            .execute(&json!({ "command": "ls" }), dir.path())
            .await
            .unwrap();
        assert!(out.contains("marker.txt"));
        assert!(out.ends_with("[exit_code: 0]"));
    }

    #[tokio::test]
    async fn test_stderr_and_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let out = tool()
            .execute(&json!({ "command": "echo oops >&2; exit 3" }), dir.path())
            .await
            .unwrap();
        assert!(out.contains("[stderr]\noops"));
        assert!(out.ends_with("[exit_code: 3]"));
    }

    #[tokio::test]
    async fn test_forbidden_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool()
            .execute(&json!({ "command": "rm -rf / --no-preserve-root" }), dir.path())
            .await
            .unwrap_err();
        assert!(err.starts_with("ERROR: forbidden pattern"));
        assert!(tool().execute(&json!({}), dir.path()).await.is_err());
    }

    #[test]
    fn test_timeout_is_capped() {
        let t = tool();
        assert_eq!(t.timeout_for(&json!({})), 120);
        assert_eq!(t.timeout_for(&json!({ "timeout": "9999" })), 300);
        assert_eq!(t.timeout_for(&json!({ "timeout": "5" })), 5);
    }

    #[tokio::test]
    async fn test_output_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let t = RunCmdTool {
            default_timeout_secs: 10,
            max_timeout_secs: 10,
            max_output_chars: 5,
        };
        let out = t
            .execute(&json!({ "command": "echo 0123456789" }), dir.path())
            .await
            .unwrap();
        assert_eq!(out, "01234\n[exit_code: 0]");
    }
}
