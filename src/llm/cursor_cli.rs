//! Cursor Agent CLI 后端
//!
//! 以子进程方式调用 `agent -p --output-format json --model <m> <prompt>`；CLI 不支持单独的 system，
//! 因此 system、历史轮次与 user 以分隔线拼成一个 prompt。stdout 为 JSON 行，取第一条 `type == "result"` 的 result。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::llm::{ChatProvider, ChatRequest, LlmError, Message, Role};

/// stderr 回显上限（字符）
const STDERR_PREVIEW_CHARS: usize = 1000;

pub struct CursorCliProvider {
    cli_path: PathBuf,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl CursorCliProvider {
    /// configured_path 为空时依次尝试 CURSOR_AGENT_PATH 与 "agent"
    pub fn new(configured_path: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let configured = if configured_path.trim().is_empty() {
            std::env::var("CURSOR_AGENT_PATH").unwrap_or_else(|_| "agent".to_string())
        } else {
            configured_path.to_string()
        };
        Self {
            cli_path: resolve_cli_path(&configured),
            api_key,
            timeout_secs,
        }
    }

    pub fn cli_path(&self) -> &Path {
        &self.cli_path
    }
}

/// 解析 CLI 路径：PATH 中查找，再看常见安装位置；都找不到则原样返回（执行时报错）
fn resolve_cli_path(configured: &str) -> PathBuf {
    let as_path = Path::new(configured);
    if as_path.components().count() > 1 {
        return as_path.to_path_buf();
    }

    if let Some(paths) = std::env::var_os("PATH") {
        if let Some(found) = std::env::split_paths(&paths)
            .map(|dir| dir.join(configured))
            .find(|p| p.is_file())
        {
            return found;
        }
    }

    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        let common = [
            home.join(".local/bin/agent"),
            PathBuf::from("/usr/local/bin/agent"),
            home.join(".cursor/bin/agent"),
        ];
        if let Some(found) = common.into_iter().find(|p| p.is_file()) {
            return found;
        }
    }

    as_path.to_path_buf()
}

/// CLI 是单次调用，历史轮次以文本形式放在本轮 user 之前
pub fn build_prompt(system: &str, history: &[Message], user: &str) -> String {
    let mut prompt = format!("{system}\n\n---\n\n");
    if !history.is_empty() {
        prompt.push_str("## Conversation so far\n\n");
        for m in history {
            let label = match m.role {
                Role::User => "[user]",
                Role::Assistant => "[assistant]",
                Role::System => "[system]",
            };
            prompt.push_str(&format!("{label}\n{}\n\n", m.content));
        }
        prompt.push_str("---\n\n");
    }
    prompt.push_str(user);
    prompt
}

/// 从 JSON 行输出中取 result 字段
pub fn parse_result_lines(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v.get("type").and_then(|t| t.as_str()) == Some("result") && v.get("result").is_some())
        .and_then(|v| v.get("result").and_then(|r| r.as_str()).map(String::from))
        .unwrap_or_default()
}

#[async_trait]
impl ChatProvider for CursorCliProvider {
    fn name(&self) -> &str {
        "cursor"
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let prompt = build_prompt(request.system, request.history, request.user);

        let mut cmd = Command::new(&self.cli_path);
        cmd.args(["-p", "--output-format", "json", "--model", request.model])
            .arg(&prompt)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(key) = &self.api_key {
            cmd.env("CURSOR_API_KEY", key);
        }

        tracing::debug!(cli = %self.cli_path.display(), model = %request.model, "cursor cli call");

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| LlmError::Timeout(self.timeout_secs))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LlmError::Cli(format!(
                        "Cursor CLI not found: {}. Install it or set llm.cursor_cli_path",
                        self.cli_path.display()
                    ))
                } else {
                    LlmError::Cli(format!("failed to spawn {}: {}", self.cli_path.display(), e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let preview: String = stderr.chars().take(STDERR_PREVIEW_CHARS).collect();
            return Err(LlmError::Cli(format!(
                "Cursor CLI exited with {:?}. stderr: {}",
                output.status.code(),
                if preview.is_empty() { "none" } else { preview.as_str() }
            )));
        }

        Ok(parse_result_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}
