//! 整表快照持久化
//!
//! 每次写入都重写整个文件：先写同目录临时文件再 rename，读者永远看不到写了一半的 JSON。
//! 写入走 tokio::fs，不阻塞运行时线程。

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use crate::core::HarnessError;

/// 将 value 以 pretty JSON 原子地写入 path；父目录不存在时自动创建
pub async fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), HarnessError> {
    let data = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// 读取快照；文件不存在时返回 None
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, HarnessError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}
