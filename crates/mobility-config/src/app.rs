use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TOPIC: &str = "mobility-events";

/// 应用配置
///
/// 启动时加载一次，进程生命周期内不可变。`broker.endpoint` 没有默认值。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broker 连接配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// `memory://<name>` 或 `mqtt://host[:port]`
    pub endpoint: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// 事件生成配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 0 表示不限数量
    #[serde(default)]
    pub max_events: u64,
    /// 随机种子，用于可复现的运行
    #[serde(default)]
    pub seed: Option<u64>,
}

/// 流处理配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

// 默认值函数
fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_enabled() -> bool {
    true
}

fn default_client_id() -> String {
    "mobility".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl BrokerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: default_client_id(),
            connect_timeout_ms: default_connect_timeout_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl GeneratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// 是否为有界（测试）模式
    pub fn is_bounded(&self) -> bool {
        self.max_events > 0
    }
}

impl ProcessorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl AppConfig {
    pub fn new(broker: BrokerConfig) -> Self {
        Self {
            broker,
            generator: GeneratorConfig::default(),
            processor: ProcessorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// 校验配置，返回第一个问题的描述
    pub fn validate(&self) -> Result<(), String> {
        if self.broker.endpoint.trim().is_empty() {
            return Err("broker.endpoint must not be empty".to_string());
        }
        if self.broker.connect_timeout_ms == 0 {
            return Err("broker.connect_timeout_ms must be greater than 0".to_string());
        }
        if self.generator.topic.trim().is_empty() {
            return Err("generator.topic must not be empty".to_string());
        }
        if self.processor.topic.trim().is_empty() {
            return Err("processor.topic must not be empty".to_string());
        }
        if self.processor.shutdown_grace_ms == 0 {
            return Err("processor.shutdown_grace_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

// Default trait 实现
impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            interval_ms: default_interval_ms(),
            enabled: default_enabled(),
            max_events: 0,
            seed: None,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
