use crate::bus::MemoryBroker;
use crate::error::{MobilityError, Result};
use crate::transport::SharedTransport;
use mobility_config::BrokerConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Broker 连接地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEndpoint {
    /// `memory://<name>`
    Memory { name: String },
    /// `mqtt://host[:port]` 或 `tcp://host[:port]`
    Mqtt { host: String, port: u16 },
}

impl BrokerEndpoint {
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        let (scheme, rest) = endpoint
            .split_once("://")
            .ok_or_else(|| MobilityError::InvalidEndpoint(format!("missing scheme: '{}'", endpoint)))?;

        match scheme {
            "memory" => {
                let name = if rest.is_empty() { "default" } else { rest };
                Ok(BrokerEndpoint::Memory {
                    name: name.to_string(),
                })
            }
            "mqtt" | "tcp" => {
                let authority = rest.trim_end_matches('/');
                if authority.is_empty() {
                    return Err(MobilityError::InvalidEndpoint(format!(
                        "missing host: '{}'",
                        endpoint
                    )));
                }

                match authority.rsplit_once(':') {
                    Some((host, port)) => {
                        let port = port.parse::<u16>().map_err(|_| {
                            MobilityError::InvalidEndpoint(format!("invalid port: '{}'", endpoint))
                        })?;
                        Ok(BrokerEndpoint::Mqtt {
                            host: host.to_string(),
                            port,
                        })
                    }
                    None => Ok(BrokerEndpoint::Mqtt {
                        host: authority.to_string(),
                        port: DEFAULT_MQTT_PORT,
                    }),
                }
            }
            other => Err(MobilityError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerEndpoint::Memory { name } => write!(f, "memory://{}", name),
            BrokerEndpoint::Mqtt { host, port } => write!(f, "mqtt://{}:{}", host, port),
        }
    }
}

/// 连接参数
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    pub channel_capacity: usize,
}

impl ConnectOptions {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            connect_timeout: config.connect_timeout(),
            keep_alive: config.keep_alive(),
            channel_capacity: config.channel_capacity,
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            client_id: "mobility".to_string(),
            connect_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
            channel_capacity: 1024,
        }
    }
}

/// 根据地址创建传输客户端
pub async fn connect(endpoint: &BrokerEndpoint, options: &ConnectOptions) -> Result<SharedTransport> {
    info!(endpoint = %endpoint, client_id = %options.client_id, "Connecting transport");

    match endpoint {
        BrokerEndpoint::Memory { name } => {
            Ok(Arc::new(MemoryBroker::shared(name, options.channel_capacity)))
        }
        #[cfg(feature = "mqtt")]
        BrokerEndpoint::Mqtt { host, port } => {
            let transport = crate::mqtt::MqttTransport::connect(host, *port, options).await?;
            Ok(Arc::new(transport))
        }
        #[cfg(not(feature = "mqtt"))]
        BrokerEndpoint::Mqtt { .. } => Err(MobilityError::InvalidEndpoint(
            "MQTT support not compiled in (enable the `mqtt` feature)".to_string(),
        )),
    }
}

/// 按配置解析地址并连接
pub async fn connect_with_config(config: &BrokerConfig) -> Result<SharedTransport> {
    let endpoint = BrokerEndpoint::parse(&config.endpoint)?;
    connect(&endpoint, &ConnectOptions::from_config(config)).await
}
