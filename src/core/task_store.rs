//! 任务存储
//!
//! Planner 产出任务，Worker 认领并完成任务。状态只会前进：pending -> running -> done。
//! 每次修改后整表写入 `<session>/tasks.json`；重启时 running 的任务恢复为 pending。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::core::snapshot::{read_snapshot, write_snapshot};
use crate::core::HarnessError;

/// 隐式 root planner 的保留 ID
pub const ROOT_PLANNER_ID: &str = "root";

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 等待认领
    #[default]
    Pending,
    /// 已被某个 Worker 认领
    Running,
    /// 已产出 handoff
    Done,
}

/// 一个工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// 创建该任务的 planner，创建后不变
    pub planner_id: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub worker_id: Option<String>,
    /// 仅 done 状态才有
    #[serde(default)]
    pub handoff_path: Option<PathBuf>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Task {
    pub fn new(planner_id: impl Into<String>, description: impl Into<String>) -> Self {
        let mut meta = Map::new();
        meta.insert(
            "created_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        Self {
            id: format!("task-{}", short_id()),
            planner_id: planner_id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            worker_id: None,
            handoff_path: None,
            meta,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

/// 8 位十六进制短 ID
pub(crate) fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// tasks.json 的顶层结构：{"tasks": {id: task, ...}}，按插入顺序
#[derive(Serialize, Deserialize, Default)]
struct TasksFile {
    #[serde(default)]
    tasks: Map<String, Value>,
}

/// 内存表：order 记录插入顺序，pending() 按此顺序返回
#[derive(Default)]
struct TaskTable {
    order: Vec<String>,
    tasks: HashMap<String, Task>,
}

impl TaskTable {
    fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    fn to_file(&self) -> Result<TasksFile, HarnessError> {
        let mut tasks = Map::new();
        for t in self.iter() {
            tasks.insert(t.id.clone(), serde_json::to_value(t)?);
        }
        Ok(TasksFile { tasks })
    }
}

/// 任务存储：内存表 + JSON 快照。所有修改都经由 add / claim / complete。
pub struct TaskStore {
    path: PathBuf,
    table: RwLock<TaskTable>,
}

impl TaskStore {
    /// 打开 `<session_root>/tasks.json`；存在则恢复
    pub fn open(session_root: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let session_root = session_root.as_ref();
        std::fs::create_dir_all(session_root)?;
        let path = session_root.join("tasks.json");

        let mut table = TaskTable::default();
        let mut requeued = 0usize;
        if let Some(file) = read_snapshot::<TasksFile>(&path)? {
            for (_, value) in file.tasks {
                let mut task: Task = serde_json::from_value(value)?;
                // 没有心跳，无法区分仍在跑的 Worker；重启后一律重新排队
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Pending;
                    task.worker_id = None;
                    requeued += 1;
                }
                table.order.push(task.id.clone());
                table.tasks.insert(task.id.clone(), task);
            }
        }
        if !table.order.is_empty() {
            tracing::info!(
                tasks = table.order.len(),
                requeued,
                path = %path.display(),
                "Restored task store"
            );
        }

        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, table: &TaskTable) -> Result<(), HarnessError> {
        write_snapshot(&self.path, &table.to_file()?).await
    }

    /// 替换一条记录并落盘；写入失败时恢复旧记录，内存与磁盘保持一致
    async fn commit(&self, table: &mut TaskTable, updated: Task) -> Result<(), HarnessError> {
        let previous = table.tasks.insert(updated.id.clone(), updated);
        if let Err(e) = self.save(table).await {
            if let Some(prev) = previous {
                table.tasks.insert(prev.id.clone(), prev);
            }
            return Err(e);
        }
        Ok(())
    }

    /// 追加一批任务（统一置为 pending）；任一 ID 重复则整批拒绝
    pub async fn add(&self, tasks: Vec<Task>) -> Result<(), HarnessError> {
        if tasks.is_empty() {
            return Ok(());
        }
        let mut table = self.table.write().await;
        let mut batch_ids = std::collections::HashSet::new();
        for t in &tasks {
            if table.tasks.contains_key(&t.id) || !batch_ids.insert(t.id.as_str()) {
                return Err(HarnessError::DuplicateTask(t.id.clone()));
            }
        }
        let before = table.order.len();
        for mut t in tasks {
            t.status = TaskStatus::Pending;
            t.worker_id = None;
            t.handoff_path = None;
            table.order.push(t.id.clone());
            table.tasks.insert(t.id.clone(), t);
        }
        if let Err(e) = self.save(&table).await {
            let added: Vec<String> = table.order.drain(before..).collect();
            for id in added {
                table.tasks.remove(&id);
            }
            return Err(e);
        }
        Ok(())
    }

    /// 所有 pending 任务，按插入顺序
    pub async fn pending(&self) -> Vec<Task> {
        self.table
            .read()
            .await
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect()
    }

    /// 原子地 pending -> running 并记录 worker_id；任务不存在或不是 pending 时返回 None
    pub async fn claim(&self, task_id: &str, worker_id: &str) -> Result<Option<Task>, HarnessError> {
        let mut table = self.table.write().await;
        let mut claimed = match table.tasks.get(task_id) {
            Some(t) if t.status == TaskStatus::Pending => t.clone(),
            _ => return Ok(None),
        };
        claimed.status = TaskStatus::Running;
        claimed.worker_id = Some(worker_id.to_string());
        self.commit(&mut table, claimed.clone()).await?;
        Ok(Some(claimed))
    }

    /// running -> done 并记录 handoff 路径；未知 ID 或非 running 状态时静默忽略
    pub async fn complete(&self, task_id: &str, handoff_path: &Path) -> Result<(), HarnessError> {
        let mut table = self.table.write().await;
        let mut done = match table.tasks.get(task_id) {
            Some(t) if t.status == TaskStatus::Running => t.clone(),
            Some(t) => {
                tracing::debug!(task_id, status = ?t.status, "complete ignored: task not running");
                return Ok(());
            }
            None => {
                tracing::debug!(task_id, "complete ignored: unknown task");
                return Ok(());
            }
        };
        done.status = TaskStatus::Done;
        done.handoff_path = Some(handoff_path.to_path_buf());
        self.commit(&mut table, done).await
    }

    /// 某 planner 名下已完成且有 handoff 的任务，按插入顺序
    pub async fn handoffs_for(&self, planner_id: &str) -> Vec<Task> {
        self.table
            .read()
            .await
            .iter()
            .filter(|t| t.planner_id == planner_id && t.is_done() && t.handoff_path.is_some())
            .cloned()
            .collect()
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.table.read().await.tasks.get(task_id).cloned()
    }

    pub async fn all(&self) -> Vec<Task> {
        self.table.read().await.iter().cloned().collect()
    }

    pub async fn count(&self, status: TaskStatus) -> usize {
        self.table
            .read()
            .await
            .iter()
            .filter(|t| t.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_lifecycle_pending_running_done() {
        let (_dir, store) = store();
        let task = Task::new(ROOT_PLANNER_ID, "Write README");
        let id = task.id.clone();
        store.add(vec![task]).await.unwrap();

        assert_eq!(store.pending().await.len(), 1);

        let claimed = store.claim(&id, "w-1").await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.worker_id.as_deref(), Some("w-1"));
        assert!(store.pending().await.is_empty());

        store.complete(&id, Path::new("/tmp/handoff.md")).await.unwrap();
        let done = store.get(&id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.handoff_path, Some(PathBuf::from("/tmp/handoff.md")));
        assert_eq!(store.handoffs_for(ROOT_PLANNER_ID).await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_skipping_or_reversing_states() {
        let (_dir, store) = store();
        let task = Task::new(ROOT_PLANNER_ID, "Add LICENSE file");
        let id = task.id.clone();
        store.add(vec![task]).await.unwrap();

        // pending -> done 不允许
        store.complete(&id, Path::new("h.md")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().status, TaskStatus::Pending);

        store.claim(&id, "w").await.unwrap().unwrap();
        store.complete(&id, Path::new("h.md")).await.unwrap();

        // done 之后不能再被认领
        assert!(store.claim(&id, "w2").await.unwrap().is_none());
        assert_eq!(store.get(&id).await.unwrap().status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn test_complete_unknown_or_done_is_noop() {
        let (_dir, store) = store();
        store.complete("task-missing", Path::new("x.md")).await.unwrap();

        let task = Task::new(ROOT_PLANNER_ID, "Some finished work");
        let id = task.id.clone();
        store.add(vec![task]).await.unwrap();
        store.claim(&id, "w").await.unwrap();
        store.complete(&id, Path::new("first.md")).await.unwrap();
        store.complete(&id, Path::new("second.md")).await.unwrap();
        assert_eq!(
            store.get(&id).await.unwrap().handoff_path,
            Some(PathBuf::from("first.md"))
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (_dir, store) = store();
        let task = Task::new(ROOT_PLANNER_ID, "Write README");
        store.add(vec![task.clone()]).await.unwrap();
        let err = store.add(vec![task]).await.unwrap_err();
        assert!(matches!(err, HarnessError::DuplicateTask(_)));

        let twin = Task::new(ROOT_PLANNER_ID, "twin task here");
        let err = store.add(vec![twin.clone(), twin]).await.unwrap_err();
        assert!(matches!(err, HarnessError::DuplicateTask(_)));
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_keeps_insertion_order() {
        let (_dir, store) = store();
        let tasks: Vec<Task> = (0..5)
            .map(|i| Task::new(ROOT_PLANNER_ID, format!("task number {i}")))
            .collect();
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        store.add(tasks).await.unwrap();
        let pending: Vec<String> = store.pending().await.into_iter().map(|t| t.id).collect();
        assert_eq!(pending, ids);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claim_exactly_once() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let task = Task::new(ROOT_PLANNER_ID, "Contended task");
        let id = task.id.clone();
        store.add(vec![task]).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = id.clone();
                tokio::spawn(async move { store.claim(&id, &format!("w-{i}")).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_reload_round_trip_and_requeue_running() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (
            Task::new(ROOT_PLANNER_ID, "pending task"),
            Task::new("sub-1", "running task"),
            Task::new(ROOT_PLANNER_ID, "done task"),
        );
        let (a_id, b_id, c_id) = (a.id.clone(), b.id.clone(), c.id.clone());
        let before = {
            let store = TaskStore::open(dir.path()).unwrap();
            store.add(vec![a, b, c]).await.unwrap();
            store.claim(&b_id, "w-b").await.unwrap();
            store.claim(&c_id, "w-c").await.unwrap();
            store.complete(&c_id, Path::new("c.md")).await.unwrap();
            store.all().await
        };

        let reopened = TaskStore::open(dir.path()).unwrap();
        let after = reopened.all().await;
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert_eq!(after[0].id, a_id);

        let b = reopened.get(&b_id).await.unwrap();
        assert_eq!(b.status, TaskStatus::Pending);
        assert!(b.worker_id.is_none());
        assert_eq!(reopened.count(TaskStatus::Done).await, 1);
    }

    /// 把 tasks.json 换成非空目录，之后的快照 rename 都会失败
    fn break_snapshot(store: &TaskStore) {
        std::fs::remove_file(store.path()).unwrap();
        std::fs::create_dir_all(store.path().join("blocker")).unwrap();
    }

    #[tokio::test]
    async fn test_failed_save_leaves_memory_unchanged() {
        let (_dir, store) = store();
        let first = Task::new(ROOT_PLANNER_ID, "claimed before the disk broke");
        let second = Task::new(ROOT_PLANNER_ID, "still pending");
        let (first_id, second_id) = (first.id.clone(), second.id.clone());
        store.add(vec![first, second]).await.unwrap();
        store.claim(&first_id, "w-1").await.unwrap().unwrap();
        break_snapshot(&store);

        assert!(store.complete(&first_id, Path::new("h.md")).await.is_err());
        let first = store.get(&first_id).await.unwrap();
        assert_eq!(first.status, TaskStatus::Running);
        assert!(first.handoff_path.is_none());
        assert!(store.handoffs_for(ROOT_PLANNER_ID).await.is_empty());

        assert!(store.claim(&second_id, "w-2").await.is_err());
        let second = store.get(&second_id).await.unwrap();
        assert_eq!(second.status, TaskStatus::Pending);
        assert!(second.worker_id.is_none());

        let extra = Task::new(ROOT_PLANNER_ID, "never persisted");
        let extra_id = extra.id.clone();
        assert!(store.add(vec![extra]).await.is_err());
        assert!(store.get(&extra_id).await.is_none());
        assert_eq!(store.all().await.len(), 2);
    }
}
