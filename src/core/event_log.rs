//! 会话事件日志：`<session>/harness.log`，每行一个 JSON 对象
//!
//! 写失败只记 warn，不影响编排流程。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::text::preview;

/// agent_message 中保留的正文预览长度
const MESSAGE_PREVIEW_CHARS: usize = 2000;

pub struct EventLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl EventLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| tracing::warn!(path = %path.display(), error = %e, "Cannot open event log"))
            .ok();
        Self {
            path,
            file: Mutex::new(file),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条 {ts, kind, role, ...payload}
    pub fn log(&self, kind: &str, role: &str, payload: Value) {
        let mut record = Map::new();
        record.insert("ts".into(), Value::String(chrono::Utc::now().to_rfc3339()));
        record.insert("kind".into(), Value::String(kind.to_string()));
        record.insert("role".into(), Value::String(role.to_string()));
        if let Value::Object(fields) = payload {
            record.extend(fields);
        }

        let line = match serde_json::to_string(&Value::Object(record)) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot serialize event");
                return;
            }
        };

        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if let Some(file) = guard.as_mut() {
            if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
                tracing::warn!(path = %self.path.display(), error = %e, "Event log write failed");
            }
        }
    }

    pub fn agent_message(&self, role: &str, agent_id: &str, content: &str) {
        self.log(
            "agent_message",
            role,
            json!({
                "agent_id": agent_id,
                "content_preview": preview(content, MESSAGE_PREVIEW_CHARS),
                "content_len": content.chars().count(),
            }),
        );
    }

    pub fn system_action(&self, action: &str, details: Value) {
        self.log("system_action", "system", json!({ "action": action, "details": details }));
    }

    pub fn tool_call(&self, worker_id: &str, tool: &str, args: Value, result_preview: &str) {
        self.log(
            "tool_call",
            "worker",
            json!({
                "worker_id": worker_id,
                "tool": tool,
                "args": args,
                "result_preview": preview(result_preview, 500),
            }),
        );
    }

    pub fn handoff(&self, worker_id: &str, task_id: &str, path: &Path) {
        self.log(
            "handoff",
            "worker",
            json!({
                "worker_id": worker_id,
                "task_id": task_id,
                "path": path.display().to_string(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_json_with_common_fields() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("harness.log"));
        log.system_action("round_start", json!({ "round": 1 }));
        log.agent_message("planner", "root", "1. Write README");
        log.handoff("w-task-1", "task-1", Path::new("/tmp/h.md"));

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["kind"], "system_action");
        assert_eq!(lines[0]["action"], "round_start");
        assert_eq!(lines[1]["role"], "planner");
        assert_eq!(lines[1]["content_len"], 15);
        assert_eq!(lines[2]["task_id"], "task-1");
        assert!(lines.iter().all(|l| l["ts"].is_string()));
    }

    #[test]
    fn test_unwritable_path_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("missing/dir/harness.log"));
        log.system_action("noop", Value::Null);
    }
}
