//! 轮次调度（主控循环）
//!
//! 一轮：root planner -> 所有可运行的 sub-planner（按注册顺序串行）-> 取 pending 任务
//! -> 工作树可用时并发派发一批（上限 2 * max_workers，同时运行数受 WorkerPool 限制）
//! -> 返回本轮完成的任务。
//!
//! 只有 root planner 的 LLM 彻底失败会中止本轮；sub-planner 与单个任务的失败只记日志。
//! 认领后派发失败的任务保持 running，不回退。
//! 多轮运行（run_rounds）时，单轮失败只影响该轮。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;

use crate::config::{self, AppConfig};
use crate::core::session::Session;
use crate::core::task_store::{Task, ROOT_PLANNER_ID};
use crate::core::worker_pool::WorkerPool;
use crate::core::HarnessError;
use crate::llm::create_client;
use crate::react::handoff::{gather_handoffs, validate_handoff, write_handoff};
use crate::react::{
    worker_system_prompt, MarkdownExtractor, PlanOutcome, PlannerAgent, ResponseExtractor,
    WorkerAgent,
};
use crate::repo::{CopyProvisioner, Provisioner};
use crate::tools::default_executor;

/// 一轮的结果；error 为 Some 时该轮被中止
#[derive(Debug)]
pub struct RoundReport {
    pub round: usize,
    pub completed: Vec<Task>,
    pub error: Option<HarnessError>,
}

pub struct RoundScheduler {
    planner: Arc<PlannerAgent>,
    worker: Arc<WorkerAgent>,
    provisioner: Arc<dyn Provisioner>,
    repo_path: PathBuf,
    pool: WorkerPool,
}

impl RoundScheduler {
    pub fn new(
        planner: Arc<PlannerAgent>,
        worker: Arc<WorkerAgent>,
        provisioner: Arc<dyn Provisioner>,
        repo_path: impl Into<PathBuf>,
        max_workers: usize,
    ) -> Self {
        Self {
            planner,
            worker,
            provisioner,
            repo_path: repo_path.into(),
            pool: WorkerPool::new(max_workers),
        }
    }

    /// 按配置组装：LLM 客户端、prompt、默认工具集与整目录复制
    pub fn from_config(cfg: &AppConfig, repo_path: impl Into<PathBuf>) -> Result<Self, HarnessError> {
        let client = Arc::new(create_client(cfg)?);
        let extractor: Arc<dyn ResponseExtractor> = Arc::new(MarkdownExtractor);

        let planner_prompt = config::load_prompt("planner_system.txt")
            .unwrap_or_else(|| config::default_planner_prompt().to_string());
        let worker_prompt = config::load_prompt("worker_system.txt")
            .unwrap_or_else(|| config::default_worker_prompt().to_string());

        let planner = PlannerAgent::new(
            Arc::clone(&client),
            &cfg.llm.model,
            planner_prompt,
            Arc::clone(&extractor),
        );
        let executor = Arc::new(default_executor(&cfg.tools));
        let worker = WorkerAgent::new(
            client,
            &cfg.llm.model,
            worker_system_prompt(&worker_prompt, &executor),
            executor,
            extractor,
            cfg.worker.max_iterations,
        );
        Ok(Self::new(
            Arc::new(planner),
            Arc::new(worker),
            Arc::new(CopyProvisioner),
            repo_path,
            cfg.concurrency.max_workers,
        ))
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn max_workers(&self) -> usize {
        self.pool.max_workers()
    }

    /// 每轮最多派发的任务数
    pub fn batch_size(&self) -> usize {
        self.pool.max_workers() * 2
    }

    /// 运行一轮，返回本轮进入 done 的任务
    pub async fn run_round(
        &self,
        session: &Session,
        instruction: &str,
    ) -> Result<Vec<Task>, HarnessError> {
        let log = session.log();

        // 1) root planner：失败即中止本轮
        let root_handoffs = session.tasks().handoffs_for(ROOT_PLANNER_ID).await;
        match self
            .run_planner(session, ROOT_PLANNER_ID, instruction, &root_handoffs)
            .await
        {
            Ok(outcome) => self.apply_outcome(session, ROOT_PLANNER_ID, outcome).await?,
            Err(e) => {
                log.log(
                    "planner_error",
                    "system",
                    json!({ "planner_id": ROOT_PLANNER_ID, "error": e.to_string() }),
                );
                tracing::error!(error = %e, "Root planner failed, aborting round");
                return Err(HarnessError::RootPlanner(e));
            }
        }

        // 2) sub-planner：逐个串行，失败跳过且不标记已运行
        for sub in session.planners().eligible_to_run(session.tasks()).await {
            let handoffs = session.tasks().handoffs_for(&sub.id).await;
            match self.run_planner(session, &sub.id, &sub.scope, &handoffs).await {
                Ok(outcome) => {
                    self.apply_outcome(session, &sub.id, outcome).await?;
                    session.planners().mark_run(&sub.id, handoffs.len()).await?;
                }
                Err(e) => {
                    log.log(
                        "planner_error",
                        "system",
                        json!({ "planner_id": sub.id, "error": e.to_string() }),
                    );
                    tracing::warn!(planner = %sub.id, error = %e, "Sub-planner failed, skipping this round");
                }
            }
        }

        // 3) pending 任务
        let pending = session.tasks().pending().await;
        if pending.is_empty() {
            tracing::info!("No pending tasks this round");
            return Ok(Vec::new());
        }

        // 4) 工作树不可用：只规划，不派发
        if !self.repo_path.is_dir() {
            log.system_action(
                "skip_workers",
                json!({
                    "reason": "repo path not set or missing",
                    "repo_path": self.repo_path.display().to_string(),
                    "pending": pending.len(),
                }),
            );
            tracing::warn!(repo = %self.repo_path.display(), "Repo unavailable, skipping dispatch");
            return Ok(Vec::new());
        }

        // 5) 并发派发一批
        let batch: Vec<Task> = pending.into_iter().take(self.batch_size()).collect();
        log.system_action(
            "dispatch",
            json!({
                "count": batch.len(),
                "max_workers": self.pool.max_workers(),
                "task_ids": batch.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            }),
        );
        let results = join_all(batch.iter().map(|task| self.dispatch_one(session, task))).await;

        // 6) 本轮完成的任务
        let completed: Vec<Task> = results.into_iter().flatten().collect();
        tracing::info!(completed = completed.len(), dispatched = batch.len(), "Round finished");
        Ok(completed)
    }

    /// 连续运行 rounds 轮（从 1 计数）。单轮失败记日志后继续下一轮，每轮结束回调 on_round。
    pub async fn run_rounds(
        &self,
        session: &Session,
        instruction: &str,
        rounds: usize,
        mut on_round: impl FnMut(&RoundReport),
    ) -> Vec<RoundReport> {
        let mut reports = Vec::with_capacity(rounds);
        for round in 1..=rounds {
            session
                .log()
                .system_action("round_start", json!({ "round": round }));
            let report = match self.run_round(session, instruction).await {
                Ok(completed) => RoundReport {
                    round,
                    completed,
                    error: None,
                },
                Err(e) => {
                    session.log().log(
                        "round_failed",
                        "system",
                        json!({ "round": round, "error": e.to_string() }),
                    );
                    tracing::error!(round, error = %e, "Round failed, continuing");
                    RoundReport {
                        round,
                        completed: Vec::new(),
                        error: Some(e),
                    }
                }
            };
            on_round(&report);
            reports.push(report);
        }
        reports
    }

    async fn run_planner(
        &self,
        session: &Session,
        planner_id: &str,
        scope: &str,
        handoffs: &[Task],
    ) -> Result<PlanOutcome, crate::llm::LlmError> {
        let (handoffs_md, count) = gather_handoffs(handoffs).await;
        session.log().system_action(
            "planner_run",
            json!({ "planner_id": planner_id, "handoffs_count": count }),
        );
        self.planner
            .run(planner_id, scope, handoffs_md.as_deref(), session.log())
            .await
    }

    /// 委派注册为 sub-planner，任务写入存储
    async fn apply_outcome(
        &self,
        session: &Session,
        planner_id: &str,
        outcome: PlanOutcome,
    ) -> Result<(), HarnessError> {
        for scope in outcome.delegations {
            let sub = session.planners().add_sub(planner_id, scope).await?;
            session.log().system_action(
                "sub_planner_created",
                json!({ "sub_id": sub.id, "parent_id": planner_id }),
            );
        }
        if !outcome.tasks.is_empty() {
            let ids: Vec<String> = outcome.tasks.iter().map(|t| t.id.clone()).collect();
            session.tasks().add(outcome.tasks).await?;
            session.log().system_action(
                "tasks_created",
                json!({ "planner_id": planner_id, "count": ids.len(), "task_ids": ids }),
            );
        }
        Ok(())
    }

    /// 单个任务：占槽 -> 准备副本 -> 认领 -> Worker -> 写 handoff -> complete。失败返回 None。
    async fn dispatch_one(&self, session: &Session, task: &Task) -> Option<Task> {
        let job = async {
            let worker_id = format!("w-{}", task.id);
            let log = session.log();
            let report = |stage: &str, error: String| {
                log.log(
                    "worker_error",
                    "system",
                    json!({ "task_id": task.id, "worker_id": worker_id, "stage": stage, "error": error }),
                );
                tracing::warn!(task_id = %task.id, stage, error = %error, "Dispatch failed");
            };

            let workdir = match self
                .provisioner
                .provision(&self.repo_path, &session.workers_root(), &worker_id)
                .await
            {
                Ok(dir) => dir,
                Err(e) => {
                    report("provision", e.to_string());
                    return None;
                }
            };

            let claimed = match session.tasks().claim(&task.id, &worker_id).await {
                Ok(Some(t)) => t,
                Ok(None) => {
                    tracing::debug!(task_id = %task.id, "Task already claimed elsewhere");
                    return None;
                }
                Err(e) => {
                    report("claim", e.to_string());
                    return None;
                }
            };

            let handoff = match self.worker.execute(&claimed, &workdir, log).await {
                Ok(text) => text,
                Err(e) => {
                    report("worker", e.to_string());
                    return None;
                }
            };

            let handoff_path = session.handoff_path(&worker_id);
            if let Err(e) = write_handoff(&handoff_path, &handoff).await {
                report("write_handoff", e.to_string());
                return None;
            }
            let (ok, missing) = validate_handoff(&handoff);
            if !ok {
                tracing::warn!(task_id = %task.id, ?missing, "Handoff looks incomplete");
            }
            log.handoff(&worker_id, &task.id, &handoff_path);

            if let Err(e) = session.tasks().complete(&task.id, &handoff_path).await {
                report("complete", e.to_string());
                return None;
            }
            session.tasks().get(&task.id).await
        };

        match self.pool.run(job).await {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "Worker pool unavailable");
                None
            }
        }
    }
}
