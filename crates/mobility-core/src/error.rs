use std::time::Duration;
use thiserror::Error;

/// 管道统一错误类型
#[derive(Error, Debug)]
pub enum MobilityError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid broker endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Subscription to '{topic}' closed by the broker")]
    StreamClosed { topic: String },

    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, MobilityError>;

impl MobilityError {
    /// 是否为瞬时错误（可在下一轮继续）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MobilityError::Transport(_) | MobilityError::Serialization(_)
        )
    }
}

impl From<tokio::task::JoinError> for MobilityError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            MobilityError::Internal(format!("task panicked: {}", err))
        } else {
            MobilityError::Internal(format!("task cancelled: {}", err))
        }
    }
}
