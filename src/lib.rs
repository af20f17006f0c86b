//! brokerlink: publish stdin lines to an MQTT broker
//!
//! The connection lifecycle and publish backpressure live in the
//! `brokerlink_mqtt` crate. This crate holds the application around it.
//!
//! ## Modules
//!
//! * `config`: TOML configuration: logging, the broker connection, and the
//!   producer topic. Validated with the `validator` crate at load time.
//!
//! * `logger`: Global `tracing` subscriber setup with compact, pretty or
//!   JSON console output.

pub mod config;
pub mod logger;
