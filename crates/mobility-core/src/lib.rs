pub mod bus;
pub mod endpoint;
pub mod error;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod transport;

pub use bus::MemoryBroker;
pub use endpoint::{connect, connect_with_config, BrokerEndpoint, ConnectOptions};
pub use error::{MobilityError, Result};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;
pub use transport::{Record, SharedTransport, Subscription, Transport};
