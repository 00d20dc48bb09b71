use crate::endpoint::ConnectOptions;
use crate::error::{MobilityError, Result};
use crate::transport::{Record, Subscription, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Packet, Publish,
    QoS, SubAck, SubscribeReasonCode,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// MQTT 传输
///
/// 记录 `(key, value)` 发布到 `<topic>/<key>`，订阅过滤 `<topic>/+`，
/// 从最后一级主题还原键。因此键不能为空，也不能包含 `/`、`+`、`#`。
pub struct MqttTransport {
    client: AsyncClient,
    publisher: JoinHandle<()>,
    name: String,
    host: String,
    port: u16,
    options: ConnectOptions,
}

impl MqttTransport {
    /// 创建发布客户端。连接在后台建立，不在此处等待。
    pub async fn connect(host: &str, port: u16, options: &ConnectOptions) -> Result<Self> {
        let client_id = format!("{}-pub-{}", options.client_id, Uuid::new_v4().simple());
        let mqtt_options = Self::mqtt_options(&client_id, host, port, options);
        let (client, eventloop) = AsyncClient::new(mqtt_options, options.channel_capacity.max(1));

        let publisher = tokio::spawn(Self::drive_publisher(eventloop, client_id.clone()));

        info!(
            broker = %format!("{}:{}", host, port),
            client_id = %client_id,
            "MQTT transport created"
        );

        Ok(Self {
            client,
            publisher,
            name: format!("mqtt://{}:{}", host, port),
            host: host.to_string(),
            port,
            options: options.clone(),
        })
    }

    fn mqtt_options(client_id: &str, host: &str, port: u16, options: &ConnectOptions) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(client_id, host, port);
        mqtt_options.set_keep_alive(options.keep_alive.max(Duration::from_secs(5)));
        mqtt_options.set_clean_session(true);
        mqtt_options
    }

    /// 发布端事件循环。连接错误由 rumqttc 在下一次 poll 时重连；
    /// 所有客户端句柄释放后退出。
    async fn drive_publisher(mut eventloop: EventLoop, client_id: String) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(client_id = %client_id, "MQTT publisher connected");
                }
                Ok(Event::Incoming(packet)) => {
                    debug!(?packet, "Received MQTT packet");
                }
                Ok(Event::Outgoing(_)) => {}
                Err(ConnectionError::RequestsDone) => {
                    debug!(client_id = %client_id, "MQTT publisher released");
                    break;
                }
                Err(e) => {
                    error!(client_id = %client_id, error = %e, "MQTT connection error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// 等待 CONNACK 和 SUBACK
    ///
    /// 返回 SUBACK 之前已经到达的消息，避免丢失。
    async fn await_subscription(
        eventloop: &mut EventLoop,
        filter: &str,
    ) -> std::result::Result<Vec<Publish>, String> {
        let mut early = Vec::new();
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    check_suback(&ack, filter)?;
                    return Ok(early);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => early.push(publish),
                Ok(_) => continue,
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    /// 订阅端事件循环，记录转发到通道；连接错误结束订阅
    async fn drive_subscriber(
        mut eventloop: EventLoop,
        topic: String,
        early: Vec<Publish>,
        tx: mpsc::Sender<Result<Record>>,
    ) {
        for publish in early {
            if !forward(&topic, publish, &tx).await {
                return;
            }
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if !forward(&topic, publish, &tx).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(topic = %topic, error = %e, "MQTT subscription connection lost");
                    let _ = tx
                        .send(Err(MobilityError::Connection(e.to_string())))
                        .await;
                    break;
                }
            }
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.publisher.abort();
    }
}

/// 转发一条消息；接收端已关闭时返回 false
async fn forward(topic: &str, publish: Publish, tx: &mpsc::Sender<Result<Record>>) -> bool {
    let Some(key) = key_from_topic(topic, &publish.topic) else {
        warn!(topic = %publish.topic, "Ignoring record outside subscribed topic");
        return true;
    };
    let record = Record::new(topic, key, publish.payload);
    tx.send(Ok(record)).await.is_ok()
}

fn check_suback(ack: &SubAck, filter: &str) -> std::result::Result<(), String> {
    if ack.return_codes.is_empty()
        || ack
            .return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        return Err(format!("subscription to '{}' rejected by the broker", filter));
    }
    Ok(())
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, key: &str, value: Bytes) -> Result<()> {
        validate_topic(topic)?;
        validate_key(key)?;

        let wire_topic = record_topic(topic, key);
        self.client
            .try_publish(wire_topic, QoS::AtLeastOnce, false, value.to_vec())
            .map_err(|e| match e {
                ClientError::TryRequest(_) => {
                    MobilityError::Transport("MQTT request queue full".to_string())
                }
                other => MobilityError::Transport(other.to_string()),
            })?;

        debug!(topic = %topic, key = %key, "Record queued for MQTT publish");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        validate_topic(topic)?;

        let client_id = format!("{}-sub-{}", self.options.client_id, Uuid::new_v4().simple());
        let mqtt_options = Self::mqtt_options(&client_id, &self.host, self.port, &self.options);
        let (client, mut eventloop) = AsyncClient::new(mqtt_options, self.options.channel_capacity.max(1));

        let filter = subscription_filter(topic);
        client
            .subscribe(filter.clone(), QoS::AtLeastOnce)
            .await
            .map_err(|e| MobilityError::Connection(e.to_string()))?;

        let early = match timeout(
            self.options.connect_timeout,
            Self::await_subscription(&mut eventloop, &filter),
        )
        .await
        {
            Ok(Ok(early)) => early,
            Ok(Err(e)) => {
                return Err(MobilityError::Connection(format!(
                    "cannot subscribe on {}: {}",
                    self.name, e
                )))
            }
            Err(_) => {
                return Err(MobilityError::Connection(format!(
                    "subscription on {} not acknowledged within {:?}",
                    self.name, self.options.connect_timeout
                )))
            }
        };

        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let task = tokio::spawn(Self::drive_subscriber(eventloop, topic.to_string(), early, tx));

        info!(
            client_id = %client_id,
            filter = %filter,
            "Subscribed to MQTT topic"
        );

        let records = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Subscription::new(topic, records).on_release(move || {
            let _ = client.try_disconnect();
            task.abort();
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 记录在 MQTT 上的实际主题
pub fn record_topic(topic: &str, key: &str) -> String {
    format!("{}/{}", topic, key)
}

pub fn subscription_filter(topic: &str) -> String {
    format!("{}/+", topic)
}

/// 从 `<topic>/<key>` 中取出键
pub fn key_from_topic(topic: &str, wire_topic: &str) -> Option<String> {
    let key = wire_topic.strip_prefix(topic)?.strip_prefix('/')?;
    if key.is_empty() || key.contains('/') {
        return None;
    }
    Some(key.to_string())
}

/// 键必须是单个非空的主题层级
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MobilityError::Transport(
            "record key must not be empty".to_string(),
        ));
    }
    if key.contains(['/', '+', '#']) {
        return Err(MobilityError::Transport(format!(
            "record key '{}' contains a reserved MQTT character ('/', '+' or '#')",
            key
        )));
    }
    Ok(())
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(MobilityError::Transport(format!(
            "invalid MQTT topic '{}'",
            topic
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// 读取一个 MQTT 报文，返回首字节和剩余部分
    async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = stream.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await?;
            len |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await?;
        Ok((header, body))
    }

    /// 最小 MQTT broker：应答 CONNACK，用给定返回码应答 SUBACK，
    /// 订阅成功后推送一条消息
    async fn start_broker(suback_code: u8, publish: Option<(&'static str, &'static [u8])>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let Ok((header, _)) = read_packet(&mut stream).await else {
                        return;
                    };
                    assert_eq!(header >> 4, 1, "expected CONNECT");
                    stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

                    while let Ok((header, body)) = read_packet(&mut stream).await {
                        if header >> 4 != 8 {
                            continue;
                        }
                        stream
                            .write_all(&[0x90, 0x03, body[0], body[1], suback_code])
                            .await
                            .unwrap();

                        if let (Some((topic, payload)), true) = (publish, suback_code != 0x80) {
                            let mut packet = vec![0x30, (2 + topic.len() + payload.len()) as u8];
                            packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
                            packet.extend_from_slice(topic.as_bytes());
                            packet.extend_from_slice(payload);
                            stream.write_all(&packet).await.unwrap();
                        }
                    }
                });
            }
        });

        port
    }

    fn fast_options() -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(2),
            ..ConnectOptions::default()
        }
    }

    #[test]
    fn test_build_topics() {
        assert_eq!(record_topic("mobility-events", "VH-17"), "mobility-events/VH-17");
        assert_eq!(subscription_filter("mobility-events"), "mobility-events/+");
    }

    #[test]
    fn test_key_from_topic() {
        assert_eq!(
            key_from_topic("mobility-events", "mobility-events/VH-17"),
            Some("VH-17".to_string())
        );
        assert_eq!(key_from_topic("mobility-events", "mobility-events/"), None);
        assert_eq!(key_from_topic("mobility-events", "mobility-events/a/b"), None);
        assert_eq!(key_from_topic("mobility-events", "other/VH-1"), None);
        assert_eq!(key_from_topic("mobility", "mobility-events/VH-1"), None);
    }

    #[test]
    fn test_valid_keys_survive_topic_roundtrip() {
        for key in ["VH-0", "VH-999", "vehicle.42", "車両-7"] {
            validate_key(key).unwrap();
            let wire = record_topic("mobility-events", key);
            assert_eq!(key_from_topic("mobility-events", &wire).as_deref(), Some(key));
        }
    }

    #[test]
    fn test_reserved_keys_rejected() {
        for key in ["", "fleet/VH-1", "VH+1", "VH#1"] {
            assert!(
                matches!(validate_key(key), Err(MobilityError::Transport(_))),
                "key {:?} accepted",
                key
            );
        }
    }

    #[test]
    fn test_suback_failure_rejected() {
        let ok = SubAck::new(1, vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)]);
        assert!(check_suback(&ok, "mobility-events/+").is_ok());

        let refused = SubAck::new(1, vec![SubscribeReasonCode::Failure]);
        let err = check_suback(&refused, "mobility-events/+").unwrap_err();
        assert!(err.contains("rejected"));
    }

    #[tokio::test]
    async fn test_publish_rejects_unroutable_keys() {
        let transport = MqttTransport::connect("127.0.0.1", 1, &ConnectOptions::default())
            .await
            .unwrap();

        for key in ["", "fleet/VH-1", "VH+1", "VH#1"] {
            let result = transport
                .publish("mobility-events", key, Bytes::from_static(b"{}"))
                .await;
            match result {
                Err(MobilityError::Transport(msg)) => assert!(!msg.contains("queue full"), "{}", msg),
                other => panic!("key {:?}: unexpected result {:?}", key, other),
            }
        }

        transport
            .publish("mobility-events", "VH-1", Bytes::from_static(b"{}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_drop_stops_publisher_loop() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let before = metrics.num_alive_tasks();

        let transport = MqttTransport::connect("127.0.0.1", 1, &ConnectOptions::default())
            .await
            .unwrap();
        assert_eq!(metrics.num_alive_tasks(), before + 1);

        drop(transport);
        timeout(Duration::from_secs(1), async {
            while metrics.num_alive_tasks() > before {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("publisher loop still running after drop");
    }

    #[tokio::test]
    async fn test_subscribe_unreachable_broker_is_fatal() {
        let options = ConnectOptions {
            connect_timeout: Duration::from_millis(500),
            ..ConnectOptions::default()
        };
        // 端口 1 上没有 broker
        let transport = MqttTransport::connect("127.0.0.1", 1, &options).await.unwrap();

        let result = transport.subscribe("mobility-events").await;
        assert!(matches!(result, Err(MobilityError::Connection(_))));
    }

    #[tokio::test]
    async fn test_subscribe_refused_by_broker_is_fatal() {
        let port = start_broker(0x80, None).await;
        let transport = MqttTransport::connect("127.0.0.1", port, &fast_options())
            .await
            .unwrap();

        match transport.subscribe("mobility-events").await {
            Err(MobilityError::Connection(msg)) => assert!(msg.contains("rejected"), "{}", msg),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_keyed_records() {
        let port = start_broker(0x01, Some(("mobility-events/VH-7", b"{\"speed\":1}"))).await;
        let transport = MqttTransport::connect("127.0.0.1", port, &fast_options())
            .await
            .unwrap();

        let mut sub = transport.subscribe("mobility-events").await.unwrap();
        let record = timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("no record delivered")
            .unwrap()
            .unwrap();

        assert_eq!(record.topic, "mobility-events");
        assert_eq!(record.key, "VH-7");
        assert_eq!(&record.value[..], b"{\"speed\":1}");
    }
}
