//! Worker 池：用 Semaphore 限制同时运行的派发数

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::core::HarnessError;

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// 当前空闲槽位数
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// 占用一个槽位运行 job，job 结束后释放
    pub async fn run<F, T>(&self, job: F) -> Result<T, HarnessError>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| HarnessError::PoolClosed)?;
        Ok(job.await)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}
