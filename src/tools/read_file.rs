//! read_file：读取工作目录内的文件
//!
//! 路径必须落在工作目录内（先按词法规整 `..`，存在的文件再 canonicalize 检查符号链接）。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::text::truncate_chars;
use crate::tools::registry::arg_str;
use crate::tools::Tool;

/// 把 file_path 解析到 root 之内；越界返回 Err
pub(crate) fn resolve_in_root(root: &Path, file_path: &str) -> Result<PathBuf, String> {
    if file_path.trim().is_empty() {
        return Err("ERROR: 'path' is required".to_string());
    }
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let path = Path::new(file_path.trim());
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(format!("ERROR: path '{file_path}' escapes the working directory"));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    let resolved = normalized.canonicalize().unwrap_or(normalized);
    if !resolved.starts_with(&root) {
        return Err(format!(
            "ERROR: path '{file_path}' escapes the working directory"
        ));
    }
    Ok(resolved)
}

pub struct ReadFileTool {
    max_chars: usize,
}

impl ReadFileTool {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file in the repository. Args: path (relative to the repository root)."
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<String, String> {
        let file_path = arg_str(args, "path").unwrap_or("");
        let path = resolve_in_root(cwd, file_path)?;
        if !path.is_file() {
            return Err(format!("ERROR: file not found: {file_path}"));
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("ERROR: {e}"))?;

        let total = content.chars().count();
        if total > self.max_chars {
            return Ok(format!(
                "{}\n... (truncated, total {} chars)",
                truncate_chars(&content, self.max_chars),
                total
            ));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_read_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "0123456789").unwrap();

        let full = ReadFileTool::new(100)
            .execute(&json!({ "path": "src/lib.rs" }), dir.path())
            .await
            .unwrap();
        assert_eq!(full, "0123456789");

        let cut = ReadFileTool::new(4)
            .execute(&json!({ "path": "./src/lib.rs" }), dir.path())
            .await
            .unwrap();
        assert_eq!(cut, "0123\n... (truncated, total 10 chars)");
    }

    #[tokio::test]
    async fn test_missing_and_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(100);
        let err = tool
            .execute(&json!({ "path": "nope.txt" }), dir.path())
            .await
            .unwrap_err();
        assert!(err.contains("file not found"));

        let err = tool
            .execute(&json!({ "path": "../../etc/passwd" }), dir.path())
            .await
            .unwrap_err();
        assert!(err.contains("escapes the working directory"));

        let err = tool
            .execute(&json!({ "path": "/etc/passwd" }), dir.path())
            .await
            .unwrap_err();
        assert!(err.contains("escapes the working directory"));
    }
}
