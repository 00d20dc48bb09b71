use async_trait::async_trait;
use mobility_types::MobilityEvent;
use std::future::Future;
use tracing::info;

/// 单条记录处理器
///
/// 返回错误只影响当前记录，消费者会记录日志并继续处理下一条。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
}

/// 解码事件并输出日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl RecordHandler for LoggingHandler {
    async fn handle(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let event = MobilityEvent::from_json(value)?;
        info!(
            key = %key,
            event_id = %event.event_id,
            vehicle_id = %event.vehicle_id,
            event_type = %event.event_type,
            speed = event.speed,
            latitude = event.latitude,
            longitude = event.longitude,
            "Processing event"
        );
        Ok(())
    }
}

/// 闭包适配器
///
/// 闭包拿到的是记录的拥有副本，便于在 future 中使用。
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RecordHandler for FnHandler<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        (self.f)(key.to_string(), value.to_vec()).await
    }
}
