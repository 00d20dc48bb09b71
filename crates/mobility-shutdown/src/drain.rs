use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("Task did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Task failed: {0}")]
    Join(#[from] JoinError),
}

/// 在宽限期内等待任务结束，超时则中止任务
///
/// 中止会 drop 任务持有的全部资源。
pub async fn drain_with_grace<T>(
    handle: &mut JoinHandle<T>,
    grace: Duration,
) -> Result<T, DrainError> {
    info!(grace = ?grace, "Draining task");

    match timeout(grace, &mut *handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DrainError::Join(e)),
        Err(_) => {
            warn!("Drain timed out after {:?}, aborting task", grace);
            handle.abort();
            Err(DrainError::Timeout(grace))
        }
    }
}
