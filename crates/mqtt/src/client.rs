//! Builds a rumqttc client pair from a `ConnectionInfo`.
//!
//! `ClientBuilder` maps the broker description and the session tuning in
//! `TransportOptions` onto `rumqttc::MqttOptions`, selects plain TCP or TLS, and
//! returns the `(AsyncClient, EventLoop)` pair the transport driver runs.
//!
//! # Examples
//!
//! ```ignore
//! let info = ConnectionInfo::new("broker.local", 8883, true, "sensor-7");
//! let (client, event_loop) = ClientBuilder::new(&info, &TransportOptions::default())
//!     .build()?;
//! ```

use std::{fs, time::Duration};

use rumqttc::{AsyncClient, EventLoop, MqttOptions, TlsConfiguration, Transport};
use tracing::debug;

use crate::{error::TransportError, info::ConnectionInfo};

/// Session tuning shared by every client the factory builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Seconds between keep-alive pings.
    pub keep_alive: u64,

    /// Maximum QoS 1/2 publishes awaiting acknowledgment.
    pub max_inflight: u16,

    /// Capacity of the client's request channel.
    pub request_channel_capacity: usize,

    /// First reconnect delay.
    pub reconnect_delay: Duration,

    /// Ceiling for the reconnect delay.
    pub max_reconnect_delay: Duration,

    /// PEM bundle to trust instead of the platform roots when TLS is enabled.
    pub ca_cert_path: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            keep_alive: 60,
            max_inflight: 100,
            request_channel_capacity: 100,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            ca_cert_path: None,
        }
    }
}

pub struct ClientBuilder {
    opts: MqttOptions,
    tls: bool,
    ca_cert_path: Option<String>,
    cap: usize,
}

impl ClientBuilder {
    /// Starts from the broker description and session tuning.
    ///
    /// Credentials are applied when a username is present; a missing password
    /// is sent as empty.
    pub fn new(info: &ConnectionInfo, options: &TransportOptions) -> Self {
        let mut opts = MqttOptions::new(info.client_id(), info.host(), info.port());
        opts.set_keep_alive(Duration::from_secs(options.keep_alive));
        opts.set_inflight(options.max_inflight.max(1));

        if let Some(username) = info.username() {
            opts.set_credentials(username, info.password().unwrap_or_default());
        }

        Self {
            opts,
            tls: info.tls(),
            ca_cert_path: options.ca_cert_path.clone(),
            cap: options.request_channel_capacity.max(1),
        }
    }

    fn build_transport(&self) -> Result<Transport, TransportError> {
        if !self.tls {
            return Ok(Transport::Tcp);
        }

        match &self.ca_cert_path {
            Some(path) => {
                let ca = fs::read(path).map_err(|e| {
                    TransportError::ClientSetup(format!("cannot read CA bundle {path}: {e}"))
                })?;
                debug!("Using CA bundle from {}", path);
                Ok(Transport::Tls(TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: None,
                }))
            }
            None => Ok(Transport::tls_with_default_config()),
        }
    }

    pub fn build(self) -> Result<(AsyncClient, EventLoop), TransportError> {
        let transport = self.build_transport()?;
        let mut opts = self.opts;
        opts.set_transport(transport);
        Ok(AsyncClient::new(opts, self.cap))
    }
}
