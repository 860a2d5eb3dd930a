//! 编排核心：会话状态（任务存储、planner 注册表、事件日志）、Worker 池与轮次调度

pub mod error;
pub mod event_log;
pub mod planner_registry;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod task_store;
pub mod worker_pool;

pub use error::HarnessError;
pub use event_log::EventLog;
pub use planner_registry::{PlannerRegistry, SubPlanner};
pub use scheduler::{RoundReport, RoundScheduler};
pub use session::Session;
pub use task_store::{Task, TaskStatus, TaskStore, ROOT_PLANNER_ID};
pub use worker_pool::WorkerPool;
