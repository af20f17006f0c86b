//! Serde configuration for the broker connection and publisher.
//!
//! All sections deserialize with defaults for missing fields and are checked
//! with `validator` before use; invalid values fail at load time rather than at
//! connect time.
//!
//! ```toml
//! queue_limit = 1000
//! disconnect_timeout = 3
//!
//! [broker]
//! host = "broker.local"
//! port = 8883
//! tls = true
//! client_id = "sensor-7"
//! username = "svc"
//! password = "secret"
//! topic_prefix = "plant/line-3"
//! qos = 1
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    client::TransportOptions,
    error::{ConnectionError, Result},
    info::ConnectionInfo,
    manager::ManagerOptions,
    qos::MqttQos,
};

/// Connection manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub broker: BrokerConfig,

    /// Maximum publishes in flight; 0 disables backpressure, negative values
    /// are treated as 0.
    pub queue_limit: i64,

    /// Seconds to wait for a graceful disconnect.
    #[validate(range(min = 1, max = 60, message = "Disconnect timeout must be 1-60 seconds"))]
    pub disconnect_timeout: u64,

    /// First reconnect delay in seconds.
    #[validate(range(min = 1, max = 60, message = "Reconnect delay must be 1-60 seconds"))]
    pub reconnect_delay: u64,

    /// Ceiling for the reconnect delay in seconds.
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Max reconnect delay must be 1-3600 seconds"
    ))]
    pub max_reconnect_delay: u64,

    /// Keep-alive interval in seconds.
    #[validate(range(min = 5, max = 3600, message = "Keep alive must be 5-3600 seconds"))]
    pub keep_alive: u64,

    /// QoS 1/2 publishes the client may have unacknowledged at once.
    #[validate(range(min = 1, max = 1000, message = "Max inflight must be 1-1000"))]
    pub max_inflight: u16,

    /// Capacity of the client's request channel.
    #[validate(range(
        min = 1,
        max = 10000,
        message = "Request channel capacity must be 1-10000"
    ))]
    pub request_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            queue_limit: 1000,
            disconnect_timeout: 3,
            reconnect_delay: 1,
            max_reconnect_delay: 60,
            keep_alive: 60,
            max_inflight: 100,
            request_channel_capacity: 100,
        }
    }
}

/// Where and how to reach the broker.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BrokerConfig {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    pub tls: bool,

    /// PEM bundle trusted for TLS instead of the platform roots.
    pub ca_cert_path: Option<String>,

    /// Empty means a random UUID is generated.
    #[validate(length(max = 128, message = "Client id must not exceed 128 characters"))]
    pub client_id: String,

    pub username: Option<String>,

    pub password: Option<String>,

    #[validate(custom(function = "validate_topic_prefix"))]
    pub topic_prefix: String,

    #[validate(range(max = 2, message = "QoS must be 0, 1, or 2"))]
    pub qos: u8,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            tls: false,
            ca_cert_path: None,
            client_id: String::new(),
            username: None,
            password: None,
            topic_prefix: String::new(),
            qos: 1,
        }
    }
}

fn validate_topic_prefix(prefix: &str) -> std::result::Result<(), ValidationError> {
    if prefix.len() > 255 {
        let mut err = ValidationError::new("topic_prefix_length");
        err.message = Some("Topic prefix must not exceed 255 characters".into());
        return Err(err);
    }
    if prefix.contains(['+', '#']) {
        let mut err = ValidationError::new("topic_prefix_wildcard");
        err.message = Some(format!("Topic prefix must not contain wildcards: {prefix}").into());
        return Err(err);
    }
    Ok(())
}

impl TryFrom<&BrokerConfig> for ConnectionInfo {
    type Error = ConnectionError;

    fn try_from(broker: &BrokerConfig) -> Result<Self> {
        broker.validate()?;
        let qos = MqttQos::from_value(i32::from(broker.qos))?;

        let client_id = if broker.client_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            broker.client_id.clone()
        };

        let mut info = ConnectionInfo::new(&broker.host, broker.port, broker.tls, client_id)
            .with_topic_prefix(&broker.topic_prefix)
            .with_qos(qos);

        info = match (&broker.username, &broker.password) {
            (Some(username), Some(password)) => info.with_credentials(username, password),
            (Some(username), None) => info.with_username(username),
            _ => info,
        };

        Ok(info)
    }
}

impl Config {
    /// Connection description for `ConnectionManager::connect`.
    pub fn connection_info(&self) -> Result<ConnectionInfo> {
        ConnectionInfo::try_from(&self.broker)
    }
}

impl From<&Config> for TransportOptions {
    fn from(config: &Config) -> Self {
        Self {
            keep_alive: config.keep_alive,
            max_inflight: config.max_inflight,
            request_channel_capacity: config.request_channel_capacity,
            reconnect_delay: Duration::from_secs(config.reconnect_delay),
            max_reconnect_delay: Duration::from_secs(
                config.max_reconnect_delay.max(config.reconnect_delay),
            ),
            ca_cert_path: config.broker.ca_cert_path.clone(),
        }
    }
}

impl From<&Config> for ManagerOptions {
    fn from(config: &Config) -> Self {
        Self {
            disconnect_timeout: Duration::from_secs(config.disconnect_timeout),
            queue_limit: usize::try_from(config.queue_limit.max(0)).unwrap_or(usize::MAX),
        }
    }
}
