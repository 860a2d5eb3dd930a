//! edit_file：整文件写入，或替换第一次出现的片段
//!
//! - `{path, content}`：写入全文，自动创建父目录
//! - `{path, old, new}`：把第一次出现的 old 替换为 new

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::read_file::resolve_in_root;
use crate::tools::registry::arg_str;
use crate::tools::Tool;

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Write or patch a file. Args: path plus either content (full file) or old and new (replace first occurrence)."
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<String, String> {
        let file_path = arg_str(args, "path").unwrap_or("");
        let path = resolve_in_root(cwd, file_path)?;

        if let Some(content) = arg_str(args, "content") {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("ERROR: {e}"))?;
            }
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| format!("ERROR: {e}"))?;
            return Ok(format!(
                "OK: wrote {} chars to {}",
                content.chars().count(),
                file_path
            ));
        }

        let (Some(old), Some(new)) = (arg_str(args, "old"), arg_str(args, "new")) else {
            return Err("ERROR: provide 'content', or both 'old' and 'new'".to_string());
        };
        if old.is_empty() {
            return Err("ERROR: 'old' must not be empty".to_string());
        }
        let current = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| format!("ERROR: file not found: {file_path}"))?;
        if !current.contains(old) {
            return Err(format!("ERROR: 'old' text not found in {file_path}"));
        }
        let updated = current.replacen(old, new, 1);
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| format!("ERROR: {e}"))?;
        Ok(format!("OK: replaced in {file_path}"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_full_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let out = EditFileTool
            .execute(&json!({ "path": "docs/README.md", "content": "# Title\n" }), dir.path())
            .await
            .unwrap();
        assert_eq!(out, "OK: wrote 8 chars to docs/README.md");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("docs/README.md")).unwrap(),
            "# Title\n"
        );
    }

    #[tokio::test]
    async fn test_replace_first_occurrence_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "foo foo").unwrap();
        let out = EditFileTool
            .execute(&json!({ "path": "a.txt", "old": "foo", "new": "bar" }), dir.path())
            .await
            .unwrap();
        assert_eq!(out, "OK: replaced in a.txt");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "bar foo");

        let err = EditFileTool
            .execute(&json!({ "path": "a.txt", "old": "zzz", "new": "y" }), dir.path())
            .await
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn test_missing_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let err = EditFileTool
            .execute(&json!({ "path": "a.txt" }), dir.path())
            .await
            .unwrap_err();
        assert!(err.starts_with("ERROR: provide"));
        assert!(EditFileTool
            .execute(&json!({ "path": "../x", "content": "y" }), dir.path())
            .await
            .is_err());
    }
}
