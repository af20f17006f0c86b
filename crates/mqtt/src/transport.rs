//! Boundary between the connection manager and an MQTT client implementation.
//!
//! The manager never speaks MQTT itself. It drives a `Transport` built by a
//! `TransportFactory`, and hears back through the `TransportListener` it hands
//! to the factory. The rumqttc-backed implementation lives in `connection`;
//! tests use a scripted one.
//!
//! ```text
//! ConnectionManager --create--> TransportFactory --> Transport
//!        ^                                              |
//!        +------ TransportListener (on_connected) <-----+
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{error::TransportError, info::ConnectionInfo, qos::MqttQos};

/// Answer a listener gives to a lifecycle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDirective {
    /// Keep the session (and automatic reconnect) running.
    Continue,
    /// Close the session and stop reconnecting.
    Stop,
}

/// Who initiated a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectSource {
    /// The local application asked for it.
    User,
    /// The client library gave up or hit an error.
    Client,
    /// The broker closed the session.
    Server,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Broker refused the credentials.
    AuthenticationFailed,
    /// The local application requested the disconnect.
    UserRequested,
    /// Broker or TLS layer rejected the session in a way retrying cannot fix.
    Rejected(String),
    /// Broker closed an established session.
    ServerClosed,
    /// Transient network failure.
    Network(String),
}

impl DisconnectCause {
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, DisconnectCause::AuthenticationFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectContext {
    pub cause: DisconnectCause,
    pub source: DisconnectSource,
}

impl DisconnectContext {
    pub fn new(cause: DisconnectCause, source: DisconnectSource) -> Self {
        Self { cause, source }
    }
}

/// Lifecycle callbacks from a transport client.
///
/// Callbacks run on transport-owned tasks and may race with each other and
/// with the manager's own operations.
pub trait TransportListener: Send + Sync {
    fn on_connected(&self) -> SessionDirective;
    fn on_disconnected(&self, context: &DisconnectContext) -> SessionDirective;
}

/// A message ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub qos: MqttQos,
    pub payload: Vec<u8>,
}

type CompletionFn = Box<dyn FnOnce(Result<(), TransportError>) + Send>;

/// One-shot completion handle for a publish.
///
/// Dropping an uncompleted handle reports `TransportError::Abandoned`, so a
/// transport that loses track of a request still releases the publisher's
/// slot.
pub struct PublishCompletion {
    callback: Option<CompletionFn>,
}

impl PublishCompletion {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<(), TransportError>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Completion that ignores the result.
    pub fn noop() -> Self {
        Self { callback: None }
    }

    pub fn complete(mut self, result: Result<(), TransportError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for PublishCompletion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(TransportError::Abandoned(
                "completion dropped before the transport reported a result".into(),
            )));
        }
    }
}

impl std::fmt::Debug for PublishCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishCompletion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// Handle to an in-flight connect attempt.
#[derive(Debug, Clone, Default)]
pub struct ConnectAttempt {
    cancel: CancellationToken,
    done: Arc<AtomicBool>,
}

impl ConnectAttempt {
    pub fn new(cancel: CancellationToken, done: Arc<AtomicBool>) -> Self {
        Self { cancel, done }
    }

    /// Whether the broker acknowledged the session (or the attempt ended).
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// An MQTT client session owned by the manager.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts connecting in the background.
    fn connect(&self, clean_session: bool) -> Result<ConnectAttempt, TransportError>;

    /// Closes the session and stops automatic reconnect. Resolves once the
    /// session has ended.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Queues a publish; `completion` fires exactly once with the outcome.
    fn publish(
        &self,
        message: OutboundMessage,
        completion: PublishCompletion,
    ) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Connected, or between sessions with automatic reconnect still armed.
    fn is_connected_or_reconnecting(&self) -> bool;
}

/// Builds transport clients for the manager.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        info: &ConnectionInfo,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}
