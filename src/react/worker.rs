//! Worker：在隔离的工作副本中用工具循环完成一个任务，产出 handoff
//!
//! 每轮：调用 LLM -> 有 `<tool_call>` 则执行工具并把结果作为 user 消息反馈 -> 否则回复即 handoff。
//! 轮数受 max_iterations 限制，耗尽时返回兜底 handoff。工具错误只作为文本反馈，不会中断循环。

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::core::event_log::EventLog;
use crate::core::task_store::Task;
use crate::llm::{LlmError, Message, ResilientClient};
use crate::react::extract::{ResponseExtractor, WorkerStep};
use crate::react::handoff::BUDGET_EXCEEDED_HANDOFF;
use crate::repo::list_repo;
use crate::tools::ToolExecutor;

/// 首条消息中列出的顶层条目上限
const LISTING_MAX_ENTRIES: usize = 100;

pub fn initial_message(description: &str, listing: &str) -> String {
    format!(
        "## Task (from planner)\n\n{description}\n\n\
         ## Repository context (top-level)\n\n{listing}\n\n\
         Complete this task using tools (run_cmd, read_file, edit_file). \
         When you are finished, output your HANDOFF document (starting with '# Summary')."
    )
}

/// 在 worker system prompt 末尾附上当前注册的工具
pub fn worker_system_prompt(base: &str, executor: &ToolExecutor) -> String {
    format!("{}\n\n## Tools\n\n{}\n", base.trim_end(), executor.describe())
}

pub fn tool_feedback(result: &str) -> String {
    format!(
        "<tool_result>\n{result}\n</tool_result>\n\n\
         Continue with the task. Use another tool or write the HANDOFF if done."
    )
}

pub struct WorkerAgent {
    client: Arc<ResilientClient>,
    model: String,
    system_prompt: String,
    executor: Arc<ToolExecutor>,
    extractor: Arc<dyn ResponseExtractor>,
    max_iterations: usize,
}

impl WorkerAgent {
    pub fn new(
        client: Arc<ResilientClient>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        executor: Arc<ToolExecutor>,
        extractor: Arc<dyn ResponseExtractor>,
        max_iterations: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: system_prompt.into(),
            executor,
            extractor,
            max_iterations: max_iterations.max(1),
        }
    }

    /// 执行任务，返回 handoff 文本；只有 LLM 调用彻底失败时返回错误
    pub async fn execute(
        &self,
        task: &Task,
        workdir: &Path,
        log: &EventLog,
    ) -> Result<String, LlmError> {
        let worker_id = task
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("w-{}", task.id));
        let listing = list_repo(workdir, LISTING_MAX_ENTRIES)
            .unwrap_or_else(|_| "(listing failed)".to_string());

        let mut history: Vec<Message> = Vec::new();
        let mut pending_user = initial_message(&task.description, &listing);
        log.agent_message("worker", &worker_id, &format!("task_id={} start (tool loop)", task.id));

        for iteration in 0..self.max_iterations {
            let response = self
                .client
                .invoke(&self.model, &self.system_prompt, &pending_user, &history)
                .await?;
            history.push(Message::user(std::mem::take(&mut pending_user)));
            history.push(Message::assistant(response.clone()));
            log.agent_message(
                "worker",
                &worker_id,
                &format!("task_id={} iter={} response_len={}", task.id, iteration, response.len()),
            );

            let call = match self.extractor.worker_step(&response) {
                WorkerStep::Handoff(text) if !text.trim().is_empty() => {
                    tracing::info!(task_id = %task.id, iterations = iteration + 1, "Worker produced handoff");
                    return Ok(text);
                }
                WorkerStep::Handoff(_) => break,
                WorkerStep::ToolCall(call) => call,
            };

            tracing::debug!(task_id = %task.id, tool = %call.tool, iteration, "Worker tool call");
            let result = self.executor.execute(&call.tool, &call.args, workdir).await;
            log.tool_call(&worker_id, &call.tool, call.args.clone(), &result);
            pending_user = tool_feedback(&result);
        }

        tracing::warn!(task_id = %task.id, max = self.max_iterations, "Worker hit iteration limit");
        log.log(
            "worker_max_iterations",
            "system",
            json!({ "task_id": task.id, "worker_id": worker_id }),
        );
        Ok(BUDGET_EXCEEDED_HANDOFF.to_string())
    }
}
