use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 主题上的一条记录（键 + 值）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub key: String,
    pub value: Bytes,
}

impl Record {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// 消息传输接口
///
/// 同一个键的记录按发布顺序投递；跨键顺序由具体实现决定。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发布一条记录
    async fn publish(&self, topic: &str, key: &str, value: Bytes) -> Result<()>;

    /// 订阅主题。返回的序列是惰性的、可能无限的，且不可重启。
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    /// 传输名称
    fn name(&self) -> &str;
}

pub type SharedTransport = Arc<dyn Transport>;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// 订阅句柄
///
/// 持有底层订阅资源，drop 时释放（包括取消和 panic 展开的路径）。
pub struct Subscription {
    topic: String,
    records: BoxStream<'static, Result<Record>>,
    release: Option<ReleaseHook>,
}

impl Subscription {
    pub fn new<S>(topic: impl Into<String>, records: S) -> Self
    where
        S: Stream<Item = Result<Record>> + Send + 'static,
    {
        Self {
            topic: topic.into(),
            records: records.boxed(),
            release: None,
        }
    }

    /// 注册释放回调，在订阅被 drop 时执行一次
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 等待下一条记录。`None` 表示 broker 已关闭该订阅。
    pub async fn next(&mut self) -> Option<Result<Record>> {
        self.records.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!(topic = %self.topic, "Releasing subscription");
            release();
        }
    }
}
