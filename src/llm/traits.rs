//! LLM 调用边界
//!
//! 所有后端（OpenAI 兼容 HTTP / Cursor CLI / Mock）实现 ChatProvider：一次 chat 只调用一个模型，
//! 重试与模型回退由 ResilientClient 统一负责。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// 限流 / 配额类错误的关键词（小写子串匹配）
const RATE_LIMIT_KEYWORDS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "quota exceeded",
    "capacity",
    "limit reached",
    "usage limit",
    "model limit",
    "429",
];

/// LLM 调用错误
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("CLI error: {0}")]
    Cli(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM config error: {0}")]
    Config(String),

    /// 主模型与全部回退模型均失败
    #[error("all models {models:?} failed, last error: {last_error}")]
    AllModelsExhausted { models: Vec<String>, last_error: String },
}

impl LlmError {
    /// 按错误文本判断是否为限流 / 配额耗尽（此类错误才值得退避重试）
    pub fn is_rate_limited(&self) -> bool {
        is_rate_limit_text(&self.to_string())
    }
}

pub fn is_rate_limit_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// 单次 chat 请求：model + system + 历史轮次 + 本轮 user
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub history: &'a [Message],
}

/// 远程调用边界：返回回复文本或错误，不做任何重试
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 后端名（日志用）
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String, LlmError>;
}

/// 重试配置：每个模型最多 max_retries 次，退避 min(base * 2^attempt, max)
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// 第 attempt 次（从 0 开始）失败后的等待时长
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        assert!(LlmError::Api("HTTP 429 Too Many Requests".into()).is_rate_limited());
        assert!(LlmError::Cli("Usage LIMIT reached for today".into()).is_rate_limited());
        assert!(LlmError::Api("Quota exceeded for model".into()).is_rate_limited());
        assert!(LlmError::Api("server at capacity".into()).is_rate_limited());
        assert!(!LlmError::Api("401 invalid api key".into()).is_rate_limited());
        assert!(!LlmError::Timeout(30).is_rate_limited());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let retry = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(retry.backoff(0), Duration::from_secs(2));
        assert_eq!(retry.backoff(1), Duration::from_secs(4));
        assert_eq!(retry.backoff(4), Duration::from_secs(32));
        assert_eq!(retry.backoff(5), Duration::from_secs(60));
        assert_eq!(retry.backoff(40), Duration::from_secs(60));
    }
}
