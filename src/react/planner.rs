//! Planner：把指令（或委派的 scope）与 worker handoff 变成新任务和子委派
//!
//! root 与 sub-planner 共用同一个 run：拼 prompt，经 ResilientClient 调用一次 LLM，
//! 再交给 ResponseExtractor 抽取任务与 scope。

use std::sync::Arc;

use serde_json::json;

use crate::core::event_log::EventLog;
use crate::core::task_store::{Task, ROOT_PLANNER_ID};
use crate::llm::{LlmError, ResilientClient};
use crate::react::extract::ResponseExtractor;
use crate::text::preview;

const PLANNER_INSTRUCTION: &str = "Output a list of concrete, focused tasks (one per line, numbered or bulleted). Each task should be self-contained for a worker. If you delegate part of your scope to a sub-planner, add a section '## Sub-planner delegation' with one or more 'Scope:' blocks.";

/// 一次 planner 运行的产出
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub response: String,
    /// 已归属 planner_id、状态为 pending 的新任务
    pub tasks: Vec<Task>,
    /// 委派出去的 scope
    pub delegations: Vec<String>,
}

/// root 用 "User instruction"，sub-planner 用 "Your scope"
pub fn build_planner_prompt(planner_id: &str, scope: &str, handoffs_md: Option<&str>) -> String {
    let section = if planner_id == ROOT_PLANNER_ID {
        "User instruction"
    } else {
        "Your scope (delegated to you)"
    };
    let mut prompt = format!("## {section}\n\n{scope}\n\n");
    if let Some(md) = handoffs_md.filter(|m| !m.trim().is_empty()) {
        prompt.push_str(&format!(
            "## Handoffs from workers (use these to plan next steps)\n\n{md}\n\n"
        ));
    }
    prompt.push_str(PLANNER_INSTRUCTION);
    prompt
}

pub struct PlannerAgent {
    client: Arc<ResilientClient>,
    model: String,
    system_prompt: String,
    extractor: Arc<dyn ResponseExtractor>,
}

impl PlannerAgent {
    pub fn new(
        client: Arc<ResilientClient>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        extractor: Arc<dyn ResponseExtractor>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: system_prompt.into(),
            extractor,
        }
    }

    /// 运行一次；LLM 所有候选都失败时返回错误，由调用方决定中止还是跳过
    pub async fn run(
        &self,
        planner_id: &str,
        scope: &str,
        handoffs_md: Option<&str>,
        log: &EventLog,
    ) -> Result<PlanOutcome, LlmError> {
        let role = format!("planner:{planner_id}");
        let prompt = build_planner_prompt(planner_id, scope, handoffs_md);
        log.agent_message(&role, planner_id, &preview(&prompt, 500));

        let response = self
            .client
            .invoke(&self.model, &self.system_prompt, &prompt, &[])
            .await?;
        log.agent_message(&role, planner_id, &response);

        let tasks: Vec<Task> = self
            .extractor
            .tasks(&response)
            .into_iter()
            .map(|desc| Task::new(planner_id, desc))
            .collect();
        let delegations = self.extractor.delegations(&response);

        tracing::info!(
            planner = %planner_id,
            tasks = tasks.len(),
            delegations = delegations.len(),
            "Planner run finished"
        );
        log.system_action(
            "planner_output",
            json!({
                "planner_id": planner_id,
                "tasks": tasks.len(),
                "delegations": delegations.len(),
            }),
        );

        Ok(PlanOutcome {
            response,
            tasks,
            delegations,
        })
    }
}
