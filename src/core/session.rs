//! 会话：一次运行的目录与其中的任务存储、planner 注册表、事件日志
//!
//! 目录布局：
//! ```text
//! <sessions_root>/<session_id>/
//!   tasks.json
//!   planners.json
//!   harness.log
//!   workers/<worker_id>/{repo/, handoff.md}
//! ```

use std::path::{Path, PathBuf};

use crate::core::event_log::EventLog;
use crate::core::planner_registry::PlannerRegistry;
use crate::core::task_store::TaskStore;
use crate::core::HarnessError;

pub struct Session {
    id: String,
    root: PathBuf,
    tasks: TaskStore,
    planners: PlannerRegistry,
    log: EventLog,
}

impl Session {
    /// 新建会话，ID 为 12 位十六进制
    pub fn create(sessions_root: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let session = Self::load(sessions_root.as_ref(), id)?;
        tracing::info!(session = %session.id, root = %session.root.display(), "Session created");
        Ok(session)
    }

    /// 恢复已有会话；目录不存在时报错
    pub fn open(sessions_root: impl AsRef<Path>, id: &str) -> Result<Self, HarnessError> {
        let dir = sessions_root.as_ref().join(id);
        if !dir.is_dir() {
            return Err(HarnessError::Config(format!(
                "session not found: {}",
                dir.display()
            )));
        }
        let session = Self::load(sessions_root.as_ref(), id.to_string())?;
        tracing::info!(session = %session.id, "Session resumed");
        Ok(session)
    }

    fn load(sessions_root: &Path, id: String) -> Result<Self, HarnessError> {
        let root = sessions_root.join(&id);
        std::fs::create_dir_all(root.join("workers"))?;
        Ok(Self {
            tasks: TaskStore::open(&root)?,
            planners: PlannerRegistry::open(&root)?,
            log: EventLog::open(root.join("harness.log")),
            id,
            root,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workers_root(&self) -> PathBuf {
        self.root.join("workers")
    }

    /// `workers/<worker_id>/handoff.md`
    pub fn handoff_path(&self, worker_id: &str) -> PathBuf {
        self.workers_root().join(worker_id).join("handoff.md")
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn planners(&self) -> &PlannerRegistry {
        &self.planners
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }
}
