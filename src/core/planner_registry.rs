//! Sub-planner 注册表
//!
//! root planner 隐式存在、每轮都会运行，不在注册表中。
//! Sub-planner 按插入顺序保存，整表写入 `<session>/planners.json`。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::snapshot::{read_snapshot, write_snapshot};
use crate::core::task_store::{short_id, TaskStore, ROOT_PLANNER_ID};
use crate::core::HarnessError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPlanner {
    pub id: String,
    pub parent_id: String,
    pub scope: String,
    /// 从未运行过
    #[serde(default = "default_true")]
    pub is_new: bool,
    /// 上次运行时已看到的 done handoff 数
    #[serde(default)]
    pub handoffs_seen: usize,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Default)]
struct PlannersFile {
    #[serde(default)]
    sub_planners: Vec<SubPlanner>,
}

pub struct PlannerRegistry {
    path: PathBuf,
    planners: RwLock<Vec<SubPlanner>>,
}

impl PlannerRegistry {
    /// 打开 `<session_root>/planners.json`；存在则恢复
    pub fn open(session_root: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let session_root = session_root.as_ref();
        std::fs::create_dir_all(session_root)?;
        let path = session_root.join("planners.json");
        let planners = read_snapshot::<PlannersFile>(&path)?
            .map(|f| f.sub_planners)
            .unwrap_or_default();
        if !planners.is_empty() {
            tracing::info!(planners = planners.len(), "Restored planner registry");
        }
        Ok(Self {
            path,
            planners: RwLock::new(planners),
        })
    }

    async fn save(&self, planners: &[SubPlanner]) -> Result<(), HarnessError> {
        write_snapshot(
            &self.path,
            &PlannersFile {
                sub_planners: planners.to_vec(),
            },
        )
        .await
    }

    /// 注册新的 sub-planner；parent 必须是 root 或已注册的 planner
    pub async fn add_sub(
        &self,
        parent_id: &str,
        scope: impl Into<String>,
    ) -> Result<SubPlanner, HarnessError> {
        let mut planners = self.planners.write().await;
        if parent_id != ROOT_PLANNER_ID && !planners.iter().any(|p| p.id == parent_id) {
            return Err(HarnessError::UnknownPlanner(parent_id.to_string()));
        }
        let planner = SubPlanner {
            id: format!("sub-{}", short_id()),
            parent_id: parent_id.to_string(),
            scope: scope.into(),
            is_new: true,
            handoffs_seen: 0,
        };
        planners.push(planner.clone());
        if let Err(e) = self.save(&planners).await {
            planners.pop();
            return Err(e);
        }
        tracing::info!(id = %planner.id, parent = %parent_id, "Registered sub-planner");
        Ok(planner)
    }

    pub async fn get(&self, id: &str) -> Option<SubPlanner> {
        self.planners.read().await.iter().find(|p| p.id == id).cloned()
    }

    pub async fn all(&self) -> Vec<SubPlanner> {
        self.planners.read().await.clone()
    }

    /// 本轮需要运行的 sub-planner，按注册顺序；每次调用都从任务存储重新计算
    pub async fn eligible_to_run(&self, tasks: &TaskStore) -> Vec<SubPlanner> {
        let planners = self.planners.read().await.clone();
        let mut eligible = Vec::new();
        for p in planners {
            if p.is_new || tasks.handoffs_for(&p.id).await.len() > p.handoffs_seen {
                eligible.push(p);
            }
        }
        eligible
    }

    /// 记录一次运行：清除 is_new，并记下本次已处理的 handoff 数。root 与未知 ID 忽略。
    pub async fn mark_run(&self, id: &str, handoffs_seen: usize) -> Result<(), HarnessError> {
        let mut planners = self.planners.write().await;
        let Some(idx) = planners.iter().position(|p| p.id == id) else {
            return Ok(());
        };
        let previous = planners[idx].clone();
        planners[idx].is_new = false;
        planners[idx].handoffs_seen = previous.handoffs_seen.max(handoffs_seen);
        if let Err(e) = self.save(&planners).await {
            planners[idx] = previous;
            return Err(e);
        }
        Ok(())
    }
}
