//! Mock 后端（用于测试与离线运行，无需 API）
//!
//! 回复由闭包决定，并记录每次被调用的模型名，便于断言重试 / 回退行为。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatProvider, ChatRequest, LlmError};

type Handler = dyn Fn(&ChatRequest<'_>) -> Result<String, LlmError> + Send + Sync;

pub struct MockProvider {
    handler: Box<Handler>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    pub fn new(
        handler: impl Fn(&ChatRequest<'_>) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 总是返回同一段文本
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// 回显 user 首行，包成一份 handoff（`provider = "mock"` 时使用）
    pub fn echo() -> Self {
        Self::new(|req| {
            let first_line = req.user.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            Ok(format!(
                "# Summary\n\nEcho from mock ({}): {}",
                req.model,
                first_line.trim()
            ))
        })
    }

    /// 按调用顺序记录的模型名
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.model.to_string());
        }
        (self.handler)(request)
    }
}
