pub mod app;
pub mod loader;

pub use app::{
    AppConfig, BrokerConfig, GeneratorConfig, LogFormat, LoggingConfig, ProcessorConfig,
    DEFAULT_TOPIC,
};
pub use loader::{ConfigError, ConfigLoader, ENV_PREFIX};
