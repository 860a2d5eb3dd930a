//! Worker 工作副本的准备与仓库概览
//!
//! 每个 Worker 在 `<workers_root>/<worker_id>/repo` 中拥有源仓库的独立副本，派发期间独占。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::core::HarnessError;

/// 会话数据目录名，复制时跳过
const SESSION_DIR_NAME: &str = ".tasuki";

/// 为某个 worker 准备隔离的可写工作目录
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(
        &self,
        source: &Path,
        workers_root: &Path,
        worker_id: &str,
    ) -> Result<PathBuf, HarnessError>;
}

/// 整目录复制（含顶层 .git，跳过 .tasuki 与 workers_root 自身）
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyProvisioner;

#[async_trait]
impl Provisioner for CopyProvisioner {
    async fn provision(
        &self,
        source: &Path,
        workers_root: &Path,
        worker_id: &str,
    ) -> Result<PathBuf, HarnessError> {
        let source = source.to_path_buf();
        let dest = workers_root.join(worker_id).join("repo");
        let workers_root = workers_root.to_path_buf();
        let out = dest.clone();
        tokio::task::spawn_blocking(move || copy_tree(&source, &dest, &workers_root))
            .await
            .map_err(|e| HarnessError::Provision(e.to_string()))??;
        tracing::debug!(worker_id, dest = %out.display(), "Worker repo ready");
        Ok(out)
    }
}

fn copy_tree(source: &Path, dest: &Path, workers_root: &Path) -> Result<(), HarnessError> {
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;
    if !source.is_dir() {
        return Ok(());
    }

    let skip_root = workers_root.canonicalize().ok();
    let walker = WalkDir::new(source).min_depth(1).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        if name == SESSION_DIR_NAME || (name == ".git" && e.depth() > 1) {
            return false;
        }
        match (&skip_root, e.path().canonicalize()) {
            (Some(root), Ok(p)) => !p.starts_with(root),
            _ => true,
        }
    });

    for entry in walker {
        let entry = entry.map_err(|e| HarnessError::Provision(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| HarnessError::Provision(e.to_string()))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if let Err(e) = std::fs::copy(entry.path(), &target) {
            // 断开的符号链接等
            tracing::warn!(path = %entry.path().display(), error = %e, "Skipped while copying repo");
        }
    }
    Ok(())
}

/// 顶层目录概览（跳过点文件），最多 max_entries 项
pub fn list_repo(path: &Path, max_entries: usize) -> std::io::Result<String> {
    let mut entries: Vec<(String, bool)> = std::fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .map(|e| {
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (e.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .filter(|(name, _)| !name.starts_with('.'))
        .collect();
    entries.sort();

    let mut lines = Vec::new();
    for (i, (name, is_dir)) in entries.into_iter().enumerate() {
        if i >= max_entries {
            lines.push("...".to_string());
            break;
        }
        lines.push(if is_dir {
            format!("- {name}/")
        } else {
            format!("- {name}")
        });
    }
    if lines.is_empty() {
        return Ok("(empty)".to_string());
    }
    Ok(lines.join("\n"))
}
