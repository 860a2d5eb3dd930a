//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找。
//! 参数是 JSON 对象（值均为字符串，来自 `<tool_call>` 中的 `key: value` 行），
//! 工作目录由调用方在每次执行时传入。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（`<tool_call>` 中 `tool:` 的取值）
    fn name(&self) -> &str;

    /// 工具描述（写进 worker 的 system prompt）
    fn description(&self) -> &str;

    /// 在 cwd 中执行；失败以 Err(文本) 返回，由执行器转成 `ERROR:` 反馈
    async fn execute(&self, args: &Value, cwd: &Path) -> Result<String, String>;
}

/// 按名称排序存储，保证列出顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// "- name: description" 列表，拼进 worker 的 system prompt
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|(name, tool)| format!("- {}: {}", name, tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 取字符串参数
pub fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// 取整数参数，接受数字或数字字符串
pub fn arg_u64(args: &Value, key: &str) -> Option<u64> {
    match args.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl Tool for Noop {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        async fn execute(&self, _args: &Value, _cwd: &Path) -> Result<String, String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Noop("zeta"));
        registry.register(Noop("alpha"));
        assert_eq!(registry.tool_names(), vec!["alpha", "zeta"]);
        assert!(registry.describe().starts_with("- alpha: does nothing"));
    }

    #[test]
    fn test_arg_helpers() {
        let args = json!({ "path": "a.txt", "timeout": "30", "n": 5 });
        assert_eq!(arg_str(&args, "path"), Some("a.txt"));
        assert_eq!(arg_u64(&args, "timeout"), Some(30));
        assert_eq!(arg_u64(&args, "n"), Some(5));
        assert_eq!(arg_u64(&args, "path"), None);
    }
}
