//! 带重试与模型回退的 LLM 调用
//!
//! 候选列表 = 主模型 + 回退链（去掉与主模型重复的项，保持首次出现顺序）。
//! 限流类错误在同一模型上指数退避重试，至多 max_retries 次后换下一个模型；
//! 其它错误立即换下一个模型。全部失败时返回 AllModelsExhausted。

use std::sync::Arc;

use crate::llm::{ChatProvider, ChatRequest, LlmError, Message, RetryConfig};

pub struct ResilientClient {
    provider: Arc<dyn ChatProvider>,
    fallback_models: Vec<String>,
    retry: RetryConfig,
}

impl ResilientClient {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        fallback_models: Vec<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            provider,
            fallback_models,
            retry,
        }
    }

    /// 主模型在前，回退链中去重
    pub fn candidates(&self, primary: &str) -> Vec<String> {
        let mut models: Vec<String> = vec![primary.to_string()];
        for m in &self.fallback_models {
            if !models.iter().any(|seen| seen == m) {
                models.push(m.clone());
            }
        }
        models
    }

    /// 一次逻辑上的 LLM 调用；回退模型的结果与主模型等价返回
    pub async fn invoke(
        &self,
        primary_model: &str,
        system: &str,
        user: &str,
        history: &[Message],
    ) -> Result<String, LlmError> {
        let models = self.candidates(primary_model);
        let max_retries = self.retry.max_retries.max(1);
        let mut last_error: Option<LlmError> = None;

        for model in &models {
            let request = ChatRequest {
                model: model.as_str(),
                system,
                user,
                history,
            };

            for attempt in 0..max_retries {
                match self.provider.chat(&request).await {
                    Ok(text) => {
                        if model.as_str() != primary_model {
                            tracing::warn!(
                                model = %model,
                                primary = %primary_model,
                                "Succeeded with fallback model"
                            );
                        }
                        return Ok(text);
                    }
                    Err(e) if e.is_rate_limited() => {
                        let is_last = attempt + 1 >= max_retries;
                        if is_last {
                            tracing::warn!(
                                model = %model,
                                retries = max_retries,
                                error = %e,
                                "Still rate limited, moving to next fallback model"
                            );
                        } else {
                            let delay = self.retry.backoff(attempt);
                            tracing::warn!(
                                model = %model,
                                attempt = attempt + 1,
                                max_retries,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Rate limited, backing off"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        last_error = Some(e);
                    }
                    Err(e) => {
                        tracing::warn!(model = %model, error = %e, "LLM call failed, trying next model");
                        last_error = Some(e);
                        break;
                    }
                }
            }
        }

        Err(LlmError::AllModelsExhausted {
            models,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }
}
