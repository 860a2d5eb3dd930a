//! Agent 角色：Planner 与 Worker，以及回复抽取与 handoff 文档

pub mod extract;
pub mod handoff;
pub mod planner;
pub mod worker;

pub use extract::{extract_handoff, MarkdownExtractor, ResponseExtractor, ToolCall, WorkerStep};
pub use handoff::{gather_handoffs, validate_handoff, BUDGET_EXCEEDED_HANDOFF};
pub use planner::{build_planner_prompt, PlanOutcome, PlannerAgent};
pub use worker::{worker_system_prompt, WorkerAgent};
