//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TASUKI__*` 覆盖（双下划线表示嵌套，如 `TASUKI__LLM__PROVIDER=openai`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 打包进二进制的默认配置（`tasuki init` 写出）
const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");
const DEFAULT_PLANNER_PROMPT: &str = include_str!("../config/prompts/planner_system.txt");
const DEFAULT_WORKER_PROMPT: &str = include_str!("../config/prompts/worker_system.txt");

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionSection,
    pub repo: RepoSection,
    pub concurrency: ConcurrencySection,
    pub llm: LlmSection,
    pub worker: WorkerSection,
    pub tools: ToolsSection,
}

/// [session] 段：会话目录根
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_session_root")]
    pub root: PathBuf,
}

fn default_session_root() -> PathBuf {
    PathBuf::from(".tasuki/sessions")
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            root: default_session_root(),
        }
    }
}

/// [repo] 段：Worker 操作的源仓库，未设置时用当前目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RepoSection {
    pub path: Option<PathBuf>,
}

/// [concurrency] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencySection {
    /// 同时运行的 Worker 上限
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize {
    4
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

/// [llm] 段：后端、主模型、回退链与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / cursor / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// 主模型触发限流后依次尝试的模型
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,
    #[serde(default = "default_cursor_cli_path")]
    pub cursor_cli_path: String,
    #[serde(default = "default_cursor_timeout_secs")]
    pub cursor_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

fn default_provider() -> String {
    "cursor".to_string()
}

fn default_model() -> String {
    "gpt-5.2-codex-xhigh".to_string()
}

fn default_fallback_models() -> Vec<String> {
    vec!["opus-4.6-thinking".into(), "auto".into()]
}

fn default_cursor_cli_path() -> String {
    "agent".to_string()
}

fn default_cursor_timeout_secs() -> u64 {
    600
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            fallback_models: default_fallback_models(),
            cursor_cli_path: default_cursor_cli_path(),
            cursor_timeout_secs: default_cursor_timeout_secs(),
            retry: RetrySection::default(),
        }
    }
}

/// [llm.retry] 段：指数退避参数
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_secs() -> f64 {
    2.0
}

fn default_max_delay_secs() -> f64 {
    60.0
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// 退避等待的上限（秒）
const MAX_BACKOFF_SECS: f64 = 3600.0;

/// 负数与 NaN 视为 0，超大值与 inf 截到 MAX_BACKOFF_SECS
fn backoff_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs.min(MAX_BACKOFF_SECS))
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: backoff_secs(self.base_delay_secs),
            max_delay: backoff_secs(self.max_delay_secs),
        }
    }
}

/// [worker] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// 单个任务的工具循环上限
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    20
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

/// [tools] 段：命令超时与输出截断
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_max_tool_timeout_secs")]
    pub max_timeout_secs: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

fn default_tool_timeout_secs() -> u64 {
    120
}

fn default_max_tool_timeout_secs() -> u64 {
    300
}

fn default_max_output_chars() -> usize {
    8000
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_tool_timeout_secs(),
            max_timeout_secs: default_max_tool_timeout_secs(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 TASUKI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TASUKI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TASUKI")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("llm.fallback_models"),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读取 prompts/<name>；找不到时返回 None，由调用方使用内置默认
pub fn load_prompt(name: &str) -> Option<String> {
    ["config/prompts", "../config/prompts"]
        .into_iter()
        .map(|dir| Path::new(dir).join(name))
        .find_map(|p| std::fs::read_to_string(p).ok())
        .filter(|s| !s.trim().is_empty())
}

pub fn default_planner_prompt() -> &'static str {
    DEFAULT_PLANNER_PROMPT
}

pub fn default_worker_prompt() -> &'static str {
    DEFAULT_WORKER_PROMPT
}

/// 在 target（默认当前目录）下生成 config/，已存在时拒绝覆盖
pub fn init_project(target: Option<&Path>) -> std::io::Result<PathBuf> {
    let base = match target {
        Some(t) => t.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let dest = base.join("config");
    if dest.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists, refusing to overwrite", dest.display()),
        ));
    }
    std::fs::create_dir_all(dest.join("prompts"))?;
    std::fs::write(dest.join("default.toml"), DEFAULT_CONFIG_TOML)?;
    std::fs::write(dest.join("prompts/planner_system.txt"), DEFAULT_PLANNER_PROMPT)?;
    std::fs::write(dest.join("prompts/worker_system.txt"), DEFAULT_WORKER_PROMPT)?;
    Ok(dest)
}
