//! 从自由文本回复中抽取结构化内容
//!
//! 编排核心只依赖 [`ResponseExtractor`]：文本进，结构化结果（可能为空）出。
//! [`MarkdownExtractor`] 是默认实现，识别编号 / 列表任务、`Scope:` 委派块、
//! `<tool_call>` 块以及 `# Summary` 等 handoff 标题。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 任务描述最短长度
const MIN_TASK_CHARS: usize = 10;
/// 委派 scope 最短长度
const MIN_SCOPE_CHARS: usize = 20;

/// Worker 请求的一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    /// 参数对象，值均为字符串
    pub args: Value,
}

/// Worker 一次回复的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStep {
    /// 需要执行工具，循环继续
    ToolCall(ToolCall),
    /// 没有工具调用，回复即为最终 handoff
    Handoff(String),
}

pub trait ResponseExtractor: Send + Sync {
    /// planner 回复中的任务描述
    fn tasks(&self, response: &str) -> Vec<String>;

    /// planner 回复中的委派 scope
    fn delegations(&self, response: &str) -> Vec<String>;

    /// worker 回复：工具调用或最终 handoff
    fn worker_step(&self, response: &str) -> WorkerStep;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownExtractor;

fn task_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+[.)]|[-*])\s*").unwrap())
}

fn scope_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*Scope\s*(?:\d+)?\s*:").unwrap())
}

fn scope_inline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*\*?\*?Scope\*?\*?\s*:\s*").unwrap())
}

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<tool_call>\s*\n(.*?)</tool_call>").unwrap())
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+):\s*(.*)$").unwrap())
}

/// `Scope:` / `Scope 2:` 独占一行时开启多行块
fn is_block_header(line: &str) -> bool {
    scope_header_re()
        .find(line)
        .is_some_and(|m| line[m.end()..].trim().is_empty())
}

fn push_scope(body: Option<Vec<&str>>, scopes: &mut Vec<String>) {
    if let Some(lines) = body {
        let text = lines.join("\n").trim().to_string();
        if text.chars().count() >= MIN_SCOPE_CHARS {
            scopes.push(text);
        }
    }
}

/// 多行块在下一个 scope 标题、`#` 标题或文本结尾处结束
fn multi_line_scopes(response: &str) -> Vec<String> {
    let mut scopes = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in response.lines() {
        if scope_header_re().is_match(line) {
            push_scope(current.take(), &mut scopes);
            if is_block_header(line) {
                current = Some(Vec::new());
            }
        } else if line.trim_start().starts_with('#') {
            push_scope(current.take(), &mut scopes);
        } else if let Some(body) = current.as_mut() {
            body.push(line);
        }
    }
    push_scope(current, &mut scopes);
    scopes
}

fn store_arg(
    entry: Option<(String, Vec<&str>)>,
    tool: &mut Option<String>,
    args: &mut Map<String, Value>,
) {
    if let Some((key, lines)) = entry {
        let value = lines.join("\n").trim().to_string();
        if key == "tool" {
            *tool = Some(value);
        } else {
            args.insert(key, Value::String(value));
        }
    }
}

/// 解析 `<tool_call>` 块中的 `key: value` 行；没有 `key:` 前缀的行续接到上一个值
fn parse_tool_block(block: &str) -> (Option<String>, Map<String, Value>) {
    let mut tool = None;
    let mut args = Map::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in block.trim().lines() {
        match key_value_re().captures(line) {
            Some(caps) => {
                store_arg(current.take(), &mut tool, &mut args);
                let key = caps.get(1).map_or("", |m| m.as_str()).to_string();
                let first = caps.get(2).map_or("", |m| m.as_str());
                current = Some((key, vec![first]));
            }
            None => {
                if let Some((_, lines)) = current.as_mut() {
                    lines.push(line);
                }
            }
        }
    }
    store_arg(current, &mut tool, &mut args);
    (tool, args)
}

/// 取回复末尾的 handoff 部分
pub fn extract_handoff(response: &str) -> String {
    for start in ["# Summary", "# Handoff", "# What was done"] {
        if let Some(idx) = response.find(start) {
            return response[idx..].trim().to_string();
        }
    }
    if let Some(idx) = response.rfind("\n# ") {
        return response[idx + 1..].trim().to_string();
    }
    response.trim().to_string()
}

impl ResponseExtractor for MarkdownExtractor {
    fn tasks(&self, response: &str) -> Vec<String> {
        response
            .lines()
            .map(str::trim)
            .filter_map(|line| {
                let m = task_prefix_re().find(line)?;
                let desc = line[m.end()..].trim();
                (desc.chars().count() >= MIN_TASK_CHARS).then(|| desc.to_string())
            })
            .collect()
    }

    fn delegations(&self, response: &str) -> Vec<String> {
        let lower = response.to_lowercase();
        if !lower.contains("sub-planner") && !lower.contains("sub planner") {
            return Vec::new();
        }

        let mut scopes = multi_line_scopes(response);
        for line in response.lines() {
            let Some(m) = scope_inline_re().find(line) else {
                continue;
            };
            // `**Scope:**` 的收尾星号
            let desc = line[m.end()..].trim_start_matches('*').trim();
            if desc.chars().count() >= MIN_SCOPE_CHARS && !scopes.iter().any(|s| s == desc) {
                scopes.push(desc.to_string());
            }
        }
        scopes
    }

    fn worker_step(&self, response: &str) -> WorkerStep {
        let Some(caps) = tool_call_re().captures(response) else {
            return WorkerStep::Handoff(extract_handoff(response));
        };
        let block = caps.get(1).map_or("", |m| m.as_str());
        match parse_tool_block(block) {
            (Some(tool), args) => WorkerStep::ToolCall(ToolCall {
                tool,
                args: Value::Object(args),
            }),
            (None, _) => WorkerStep::Handoff(extract_handoff(response)),
        }
    }
}
