use crate::consumer::{ConsumerSummary, StreamConsumer};
use crate::handler::RecordHandler;
use mobility_config::ProcessorConfig;
use mobility_core::{MobilityError, Result, SharedTransport};
use mobility_shutdown::{drain_with_grace, DrainError, ShutdownListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 管道运行器
///
/// 在独立任务中启动消费者并阻塞等待。收到关闭信号后给消费者一个宽限期
/// 处理完当前记录，超时则中止任务（订阅随之释放）。
pub struct PipelineRunner {
    transport: SharedTransport,
    topic: String,
    handler: Arc<dyn RecordHandler>,
    grace: Duration,
}

impl PipelineRunner {
    pub fn new(
        transport: SharedTransport,
        topic: impl Into<String>,
        handler: Arc<dyn RecordHandler>,
    ) -> Self {
        Self {
            transport,
            topic: topic.into(),
            handler,
            grace: Duration::from_secs(5),
        }
    }

    pub fn from_config(
        transport: SharedTransport,
        config: &ProcessorConfig,
        handler: Arc<dyn RecordHandler>,
    ) -> Self {
        Self::new(transport, config.topic.clone(), handler).with_grace(config.shutdown_grace())
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// 运行直到消费者退出
    pub async fn run_blocking(&self, shutdown: ShutdownListener) -> Result<ConsumerSummary> {
        info!(topic = %self.topic, grace = ?self.grace, "Starting stream processing pipeline");

        let consumer = StreamConsumer::new(self.transport.clone());
        let topic = self.topic.clone();
        let handler = self.handler.clone();
        let consumer_shutdown = shutdown.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            consumer
                .subscribe(&topic, handler, consumer_shutdown)
                .await
        }));

        let mut shutdown = shutdown;
        let outcome = tokio::select! {
            joined = &mut task.0 => joined.map_err(MobilityError::from),
            signal = shutdown.recv() => {
                info!(?signal, "Shutdown requested, waiting for consumer to drain");
                match drain_with_grace(&mut task.0, self.grace).await {
                    Ok(result) => Ok(result),
                    Err(DrainError::Timeout(grace)) => {
                        warn!(grace = ?grace, "Consumer did not stop in time, aborted");
                        return Err(MobilityError::ShutdownTimeout(grace));
                    }
                    Err(DrainError::Join(e)) => Err(MobilityError::from(e)),
                }
            }
        };

        let summary = outcome??;
        info!(
            received = summary.received,
            handled = summary.handled,
            failed = summary.failed,
            "Pipeline stopped"
        );
        Ok(summary)
    }
}

/// 调用方放弃等待时中止消费者任务
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
