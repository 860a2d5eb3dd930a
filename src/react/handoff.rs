//! Handoff 文档：Worker 完成（或放弃）任务时提交给 planner 的 Markdown 报告

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::task_store::Task;

/// 推荐包含的章节（只做提示，不阻断）
pub const RECOMMENDED_SECTIONS: &[&str] = &[
    "summary",
    "what was done",
    "notes",
    "concerns",
    "discoveries",
    "feedback",
];

/// 迭代预算耗尽时的兜底 handoff
pub const BUDGET_EXCEEDED_HANDOFF: &str = "# Summary\n\nTask processing reached iteration limit. Partial work may have been done.\n\n# Notes / Concerns\n\nMax tool iterations reached.";

/// 按 `#` 标题切分，键为小写标题文本
pub fn parse_sections(content: &str) -> BTreeMap<String, String> {
    let mut sections = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut buf: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.starts_with('#') {
            if let Some(title) = current.take() {
                sections.insert(title, buf.join("\n").trim().to_string());
            }
            current = Some(line.trim_start_matches('#').trim().to_lowercase());
            buf.clear();
        } else {
            buf.push(line);
        }
    }
    if let Some(title) = current {
        sections.insert(title, buf.join("\n").trim().to_string());
    }
    sections
}

/// 宽松校验：返回 (是否合格, 缺少的推荐章节)
pub fn validate_handoff(content: &str) -> (bool, Vec<&'static str>) {
    let sections = parse_sections(content);
    let missing = RECOMMENDED_SECTIONS
        .iter()
        .copied()
        .filter(|s| !sections.keys().any(|k| k.contains(s)))
        .collect();
    let has_summary = sections
        .keys()
        .any(|k| k.contains("summary") || k.contains("done") || k.contains("change"));
    let ok = content.trim().chars().count() >= 100 && (has_summary || !sections.is_empty());
    (ok, missing)
}

pub async fn write_handoff(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

pub async fn read_handoff(path: &Path) -> std::io::Result<String> {
    tokio::fs::read_to_string(path).await
}

/// 拼接 planner prompt 中的 handoff 段；文件缺失的任务跳过。返回 (Markdown, 实际条数)
pub async fn gather_handoffs(tasks: &[Task]) -> (Option<String>, usize) {
    let mut blocks = Vec::new();
    for task in tasks {
        let Some(path) = task.handoff_path.as_deref() else {
            continue;
        };
        match read_handoff(path).await {
            Ok(content) => blocks.push(format!("--- Task {} ---\n{}", task.id, content)),
            Err(e) => {
                tracing::warn!(task_id = %task.id, path = %path.display(), error = %e, "Handoff unreadable");
            }
        }
    }
    let count = blocks.len();
    let md = (!blocks.is_empty()).then(|| blocks.join("\n\n"));
    (md, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task_store::ROOT_PLANNER_ID;

    #[test]
    fn test_parse_sections() {
        let sections = parse_sections("# Summary\nDid it\n\n## What was done\n- a\n- b\n# Notes");
        assert_eq!(sections["summary"], "Did it");
        assert_eq!(sections["what was done"], "- a\n- b");
        assert_eq!(sections["notes"], "");
    }

    #[test]
    fn test_validate_handoff() {
        let (ok, missing) = validate_handoff("# Summary\nshort");
        assert!(!ok);
        assert!(missing.contains(&"feedback"));
        assert!(!missing.contains(&"summary"));

        let long = format!("# Summary\n{}\n# What was done\nx\n", "detail ".repeat(20));
        assert!(validate_handoff(&long).0);
        assert!(validate_handoff(BUDGET_EXCEEDED_HANDOFF).0);
    }

    #[tokio::test]
    async fn test_gather_handoffs_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w-1/handoff.md");
        write_handoff(&path, "# Summary\nok").await.unwrap();

        let mut with_file = Task::new(ROOT_PLANNER_ID, "first task here");
        with_file.handoff_path = Some(path);
        let mut missing = Task::new(ROOT_PLANNER_ID, "second task here");
        missing.handoff_path = Some(dir.path().join("gone.md"));

        let (md, count) = gather_handoffs(&[with_file.clone(), missing]).await;
        assert_eq!(count, 1);
        assert_eq!(
            md.unwrap(),
            format!("--- Task {} ---\n# Summary\nok", with_file.id)
        );
        assert_eq!(gather_handoffs(&[]).await, (None, 0));
    }
}
