//! LLM 层：调用边界、后端实现（OpenAI 兼容 / Cursor CLI / Mock）与带回退的 ResilientClient

pub mod cursor_cli;
pub mod message;
pub mod mock;
pub mod openai;
pub mod resilient;
pub mod traits;

use std::sync::Arc;

pub use cursor_cli::CursorCliProvider;
pub use message::{Message, Role};
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use resilient::ResilientClient;
pub use traits::{is_rate_limit_text, ChatProvider, ChatRequest, LlmError, RetryConfig};

use crate::config::AppConfig;

/// 根据 [llm].provider 创建后端
pub fn create_provider(cfg: &AppConfig) -> Result<Arc<dyn ChatProvider>, LlmError> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "openai" => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI compatible LLM");
            Ok(Arc::new(OpenAiProvider::new(
                cfg.llm.base_url.as_deref(),
                cfg.llm.api_key.as_deref(),
            )))
        }
        "cursor" => {
            tracing::info!(model = %cfg.llm.model, "Using Cursor CLI LLM");
            Ok(Arc::new(CursorCliProvider::new(
                &cfg.llm.cursor_cli_path,
                cfg.llm.api_key.clone(),
                cfg.llm.cursor_timeout_secs,
            )))
        }
        "mock" => {
            tracing::warn!("Using Mock LLM");
            Ok(Arc::new(MockProvider::echo()))
        }
        other => Err(LlmError::Config(format!("unknown llm provider: {other}"))),
    }
}

/// 后端 + [llm] 段中的回退链与重试配置
pub fn create_client(cfg: &AppConfig) -> Result<ResilientClient, LlmError> {
    Ok(ResilientClient::new(
        create_provider(cfg)?,
        cfg.llm.fallback_models.clone(),
        cfg.llm.retry.to_retry_config(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_by_name() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "MOCK".into();
        assert_eq!(create_provider(&cfg).unwrap().name(), "mock");

        cfg.llm.provider = "openai".into();
        cfg.llm.api_key = Some("sk-test".into());
        assert_eq!(create_provider(&cfg).unwrap().name(), "openai");

        cfg.llm.provider = "carrier-pigeon".into();
        assert!(matches!(create_provider(&cfg), Err(LlmError::Config(_))));
    }
}
