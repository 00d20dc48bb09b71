use crate::error::{MobilityError, Result};
use crate::transport::{Record, Subscription, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

fn registry() -> &'static Mutex<HashMap<String, MemoryBroker>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, MemoryBroker>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// 进程内 broker
///
/// 每个主题一个 broadcast 通道。没有订阅者时发布的记录被丢弃，
/// 落后的订阅者跳过丢失的记录并继续。
#[derive(Clone)]
pub struct MemoryBroker {
    name: String,
    capacity: usize,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Record>>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryBroker {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            topics: Arc::new(RwLock::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 按名称获取进程内共享的 broker，不存在时创建
    pub fn shared(name: &str, capacity: usize) -> Self {
        let mut brokers = registry().lock().unwrap_or_else(|e| e.into_inner());
        brokers
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(broker = %name, capacity, "Creating in-memory broker");
                MemoryBroker::new(name, capacity)
            })
            .clone()
    }

    /// 当前主题的活跃订阅数
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// 关闭 broker，结束所有订阅
    ///
    /// 共享注册表中的同名条目一并移除，之后按名称获取会得到新的 broker。
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        {
            let mut brokers = registry().lock().unwrap_or_else(|e| e.into_inner());
            if brokers
                .get(&self.name)
                .is_some_and(|shared| Arc::ptr_eq(&shared.topics, &self.topics))
            {
                brokers.remove(&self.name);
            }
        }
        let dropped = {
            let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
            let count = topics.len();
            topics.clear();
            count
        };
        info!(broker = %self.name, topics = dropped, "In-memory broker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn sender(&self, topic: &str) -> Result<broadcast::Sender<Record>> {
        if self.is_closed() {
            return Err(MobilityError::Connection(format!(
                "broker '{}' is closed",
                self.name
            )));
        }

        if let Some(sender) = self
            .topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
        {
            return Ok(sender.clone());
        }

        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.clone())
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, value: Bytes) -> Result<()> {
        let sender = self.sender(topic)?;
        match sender.send(Record::new(topic, key, value)) {
            Ok(receivers) => {
                debug!(topic = %topic, key = %key, receivers, "Record published");
            }
            Err(_) => {
                debug!(topic = %topic, key = %key, "No active subscribers, record dropped");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let rx = self.sender(topic)?.subscribe();
        let topic_name = topic.to_string();

        let records = futures::stream::unfold(rx, move |mut rx| {
            let topic = topic_name.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(record) => return Some((Ok(record), rx)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "Subscriber lagged, records lost");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });

        info!(broker = %self.name, topic = %topic, "Subscribed to in-memory topic");
        Ok(Subscription::new(topic, records))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
