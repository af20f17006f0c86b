//! # brokerlink-mqtt: one broker connection, managed
//!
//! Owns the lifecycle of a single logical MQTT broker connection and gates
//! outbound publishing behind a bounded in-flight queue.
//!
//! - `ConnectionManager` connects, reconnects and disconnects a transport
//!   client, exposing a four-state `ConnectionState` to observers. A generation
//!   counter makes callbacks from replaced clients inert.
//! - `QueueGate` (driven by `ConnectionManager::publish`) drops publishes while
//!   `queue_limit` are in flight, raising one "queue full" and one "queue
//!   drained" signal per overflow episode.
//! - `MqttTransportFactory` is the rumqttc-backed transport; anything that
//!   implements `TransportFactory` can stand in for it.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use brokerlink_mqtt::{Config, ConnectionManager, ConnectionState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let manager = ConnectionManager::from_config(&config)?;
//!     manager.register_state_listener(Arc::new(|state: ConnectionState| {
//!         println!("broker link is {state}");
//!     }));
//!
//!     manager.connect(config.connection_info()?).await;
//!     manager.publish("status", "online");
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod info;
pub mod listener;
pub mod manager;
pub mod publisher;
pub mod qos;
pub mod state;
pub mod transport;

#[cfg(test)]
mod mock;

pub use client::TransportOptions;
pub use config::{BrokerConfig, Config};
pub use connection::{MqttTransport, MqttTransportFactory};
pub use error::{ConnectionError, Result, TransportError};
pub use info::ConnectionInfo;
pub use listener::{ConnectionStateListener, QueueBackpressureListener};
pub use manager::{ConnectionManager, DropReason, ManagerOptions, PublishOutcome};
pub use publisher::{Admission, QueueGate, Slot};
pub use qos::MqttQos;
pub use state::ConnectionState;
pub use transport::{
    ConnectAttempt, DisconnectCause, DisconnectContext, DisconnectSource, OutboundMessage,
    PublishCompletion, SessionDirective, Transport, TransportFactory, TransportListener,
};
