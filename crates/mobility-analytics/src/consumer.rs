use crate::handler::RecordHandler;
use mobility_core::{MobilityError, Result, SharedTransport};
use mobility_shutdown::ShutdownListener;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 一次消费的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub received: u64,
    pub handled: u64,
    pub failed: u64,
}

/// 流消费者
///
/// 按投递顺序逐条处理记录，同一个 key 的记录保持顺序。
pub struct StreamConsumer {
    transport: SharedTransport,
}

impl StreamConsumer {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    /// 订阅主题并处理记录，直到关闭信号、流结束或流出错
    ///
    /// 订阅在任何退出路径上都会被释放。
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn RecordHandler>,
        mut shutdown: ShutdownListener,
    ) -> Result<ConsumerSummary> {
        let mut subscription = self.transport.subscribe(topic).await?;
        info!(topic = %topic, transport = %self.transport.name(), "Stream consumer subscribed");

        let mut summary = ConsumerSummary::default();

        loop {
            let record = tokio::select! {
                biased;
                signal = shutdown.recv() => {
                    info!(?signal, topic = %topic, "Stream consumer shutting down");
                    break;
                }
                next = subscription.next() => next,
            };

            let record = match record {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    error!(topic = %topic, error = %e, "Subscription failed");
                    return Err(e);
                }
                None => {
                    warn!(topic = %topic, "Subscription closed by the broker");
                    return Err(MobilityError::StreamClosed {
                        topic: topic.to_string(),
                    });
                }
            };

            summary.received += 1;
            debug!(topic = %record.topic, key = %record.key, bytes = record.value.len(), "Record received");

            match handler.handle(&record.key, &record.value).await {
                Ok(()) => summary.handled += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(key = %record.key, error = %e, "Error processing record");
                }
            }
        }

        info!(
            received = summary.received,
            handled = summary.handled,
            failed = summary.failed,
            "Stream consumer stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{FnHandler, MockRecordHandler};
    use bytes::Bytes;
    use mobility_core::{MemoryBroker, Subscription, Transport};
    use mobility_shutdown::SignalHandler;
    use std::sync::Mutex;
    use std::time::Duration;

    fn collecting_handler(seen: Arc<Mutex<Vec<(String, Vec<u8>)>>>) -> Arc<dyn RecordHandler> {
        Arc::new(FnHandler::new(move |key: String, value: Vec<u8>| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push((key, value));
                Ok::<(), anyhow::Error>(())
            }
        }))
    }

    async fn wait_for_subscriber(broker: &MemoryBroker, topic: &str) {
        while broker.subscriber_count(topic) == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_consumer() {
        let broker = MemoryBroker::new("consumer-errors", 16);
        let consumer = StreamConsumer::new(Arc::new(broker.clone()));
        let (signals, listener) = SignalHandler::new();

        let mut handler = MockRecordHandler::new();
        handler
            .expect_handle()
            .withf(|key, _| key.starts_with("VH-1"))
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("bad record")));
        handler
            .expect_handle()
            .withf(|key, _| key.starts_with("VH-2"))
            .times(1)
            .returning(|_, _| Ok(()));

        let task = tokio::spawn(async move {
            consumer
                .subscribe("events", Arc::new(handler), listener)
                .await
        });
        wait_for_subscriber(&broker, "events").await;

        broker.publish("events", "VH-1", Bytes::from_static(b"x")).await.unwrap();
        broker.publish("events", "VH-2", Bytes::from_static(b"y")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        signals.trigger_shutdown();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(
            summary,
            ConsumerSummary {
                received: 2,
                handled: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_records_handled_in_delivery_order() {
        let broker = MemoryBroker::new("consumer-order", 64);
        let consumer = StreamConsumer::new(Arc::new(broker.clone()));
        let (signals, listener) = SignalHandler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = collecting_handler(seen.clone());

        let task = tokio::spawn(async move { consumer.subscribe("events", handler, listener).await });
        wait_for_subscriber(&broker, "events").await;

        for i in 0..20u8 {
            let key = if i % 2 == 0 { "VH-1" } else { "VH-2" };
            broker.publish("events", key, Bytes::from(vec![i])).await.unwrap();
        }

        while seen.lock().unwrap().len() < 20 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        signals.trigger_shutdown();
        task.await.unwrap().unwrap();

        let seen = seen.lock().unwrap();
        for key in ["VH-1", "VH-2"] {
            let values: Vec<u8> = seen
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v[0])
                .collect();
            let mut sorted = values.clone();
            sorted.sort();
            assert_eq!(values, sorted);
            assert_eq!(values.len(), 10);
        }
    }

    #[tokio::test]
    async fn test_cancellation_returns_ok_and_releases_subscription() {
        let broker = MemoryBroker::new("consumer-cancel", 16);
        let consumer = StreamConsumer::new(Arc::new(broker.clone()));
        let (signals, listener) = SignalHandler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let handler = collecting_handler(seen.clone());
            async move { consumer.subscribe("events", handler, listener).await }
        });
        wait_for_subscriber(&broker, "events").await;
        assert_eq!(broker.subscriber_count("events"), 1);

        signals.trigger_shutdown();
        let summary = task.await.unwrap().unwrap();

        assert_eq!(summary, ConsumerSummary::default());
        assert_eq!(broker.subscriber_count("events"), 0);
    }

    #[tokio::test]
    async fn test_broker_closure_is_stream_closed() {
        let broker = MemoryBroker::new("consumer-closed", 16);
        let consumer = StreamConsumer::new(Arc::new(broker.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = collecting_handler(seen);

        let task = tokio::spawn(async move {
            consumer
                .subscribe("events", handler, ShutdownListener::never())
                .await
        });
        wait_for_subscriber(&broker, "events").await;
        broker.close();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(MobilityError::StreamClosed { topic }) if topic == "events"));
    }

    #[tokio::test]
    async fn test_stream_error_is_returned() {
        struct FailingTransport;

        #[async_trait::async_trait]
        impl Transport for FailingTransport {
            async fn publish(&self, _topic: &str, _key: &str, _value: Bytes) -> Result<()> {
                Ok(())
            }

            async fn subscribe(&self, topic: &str) -> Result<Subscription> {
                let records = futures::stream::iter(vec![Err(MobilityError::Connection(
                    "connection reset".to_string(),
                ))]);
                Ok(Subscription::new(topic, records))
            }

            fn name(&self) -> &str {
                "failing"
            }
        }

        let consumer = StreamConsumer::new(Arc::new(FailingTransport));
        let handler = collecting_handler(Arc::new(Mutex::new(Vec::new())));
        let result = consumer
            .subscribe("events", handler, ShutdownListener::never())
            .await;

        assert!(matches!(result, Err(MobilityError::Connection(_))));
    }

    #[tokio::test]
    async fn test_handler_panic_releases_subscription() {
        let broker = MemoryBroker::new("consumer-panic", 16);
        let consumer = StreamConsumer::new(Arc::new(broker.clone()));
        let handler: Arc<dyn RecordHandler> =
            Arc::new(FnHandler::new(|key: String, _value: Vec<u8>| async move {
                assert!(key.is_empty(), "handler exploded");
                Ok::<(), anyhow::Error>(())
            }));

        let task = tokio::spawn(async move {
            consumer
                .subscribe("events", handler, ShutdownListener::never())
                .await
        });
        wait_for_subscriber(&broker, "events").await;
        broker.publish("events", "VH-1", Bytes::from_static(b"{}")).await.unwrap();

        let err = task.await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(broker.subscriber_count("events"), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_propagates() {
        let broker = MemoryBroker::new("consumer-fail", 16);
        broker.close();
        let consumer = StreamConsumer::new(Arc::new(broker));
        let handler = collecting_handler(Arc::new(Mutex::new(Vec::new())));

        let result = consumer
            .subscribe("events", handler, ShutdownListener::never())
            .await;
        assert!(matches!(result, Err(MobilityError::Connection(_))));
    }
}
