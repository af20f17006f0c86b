//! Lifecycle owner for a single logical broker connection.
//!
//! `ConnectionManager` holds at most one live transport client. Each `connect`
//! bumps a generation counter and hands the new client a listener that
//! remembers that generation; callbacks from any older client are recognised as
//! stale and only ever answered with `Stop`. This is the sole guard that keeps
//! a client being torn down from overwriting the state of its successor.
//!
//! # Locks
//!
//! - `control` (async) serializes `connect` and `disconnect`.
//! - `transition` (sync, short) covers the generation check, the state store,
//!   and observer notification, so observers see one total order of changes.
//! - `publish` takes neither; it reads atomics and the active session only.
//!
//! # Usage
//!
//! ```ignore
//! let manager = ConnectionManager::new(Arc::new(MqttTransportFactory::default()), ManagerOptions::default());
//! manager.register_state_listener(Arc::new(|state: ConnectionState| println!("{state}")));
//! manager.set_queue_limit(100);
//!
//! manager.connect(ConnectionInfo::new("broker.local", 1883, false, "sensor-7")).await;
//! let outcome = manager.publish("readings", payload);
//! manager.disconnect().await;
//! ```

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak,
    },
    time::Duration,
};

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use validator::Validate;

use crate::{
    client::TransportOptions,
    config::Config,
    connection::MqttTransportFactory,
    error::Result,
    info::ConnectionInfo,
    listener::{ConnectionStateListener, ListenerRegistry, QueueBackpressureListener},
    publisher::{Admission, QueueGate},
    qos::MqttQos,
    state::ConnectionState,
    transport::{
        ConnectAttempt, DisconnectCause, DisconnectContext, DisconnectSource, OutboundMessage,
        PublishCompletion, SessionDirective, Transport, TransportFactory, TransportListener,
    },
};

/// Tuning for the manager itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Upper bound for a graceful disconnect, both before reconnecting and on
    /// explicit `disconnect`.
    pub disconnect_timeout: Duration,

    /// Initial in-flight publish limit; 0 disables the gate.
    pub queue_limit: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            disconnect_timeout: Duration::from_secs(3),
            queue_limit: 0,
        }
    }
}

/// What `publish` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport.
    Forwarded,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No session has ever reached CONNECTED.
    NeverConnected,
    /// The client is neither connected nor about to reconnect.
    NotConnected,
    /// The in-flight limit is reached.
    QueueFull,
    /// The transport refused the message.
    TransportRefused,
}

struct ActiveSession {
    client: Arc<dyn Transport>,
    topic_prefix: String,
    qos: MqttQos,
}

struct Shared {
    generation: AtomicU64,
    state: AtomicU8,
    transition: Mutex<()>,
    state_listeners: ListenerRegistry<dyn ConnectionStateListener>,
    state_tx: watch::Sender<ConnectionState>,
    user_canceled: AtomicBool,
    disconnecting: AtomicBool,
    ever_connected: AtomicBool,
    active: RwLock<Option<Arc<ActiveSession>>>,
    gate: Arc<QueueGate>,
}

impl Shared {
    fn new(queue_limit: usize) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            generation: AtomicU64::new(0),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            transition: Mutex::new(()),
            state_listeners: ListenerRegistry::new(),
            state_tx,
            user_canceled: AtomicBool::new(false),
            disconnecting: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            active: RwLock::new(None),
            gate: Arc::new(QueueGate::new(queue_limit)),
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn bump_generation(&self) -> u64 {
        let _guard = self.lock_transition();
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Stores `next` and notifies observers. Caller holds the transition lock.
    fn apply(&self, next: ConnectionState) -> bool {
        let current = self.state();
        if current == next {
            trace!("Already {}, no transition", next);
            return false;
        }
        if !current.can_transition_to(next) {
            warn!("Ignoring invalid transition {} -> {}", current, next);
            return false;
        }

        self.state.store(next as u8, Ordering::Release);
        self.state_tx.send_replace(next);
        info!("Connection state changed: {} -> {}", current, next);
        self.state_listeners
            .notify("state change", |l| l.on_connection_state_change(next));
        true
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let _guard = self.lock_transition();
        self.apply(next)
    }

    fn set_active(&self, session: Option<ActiveSession>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = session.map(Arc::new);
    }

    fn active(&self) -> Option<Arc<ActiveSession>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Listener handed to the client of one generation.
struct GenerationListener {
    generation: u64,
    client_id: String,
    shared: Weak<Shared>,
}

impl TransportListener for GenerationListener {
    fn on_connected(&self) -> SessionDirective {
        let Some(shared) = self.shared.upgrade() else {
            return SessionDirective::Stop;
        };
        let _guard = shared.lock_transition();

        if !shared.is_current(self.generation) {
            debug!(
                "Ignoring connected callback from stale generation {}",
                self.generation
            );
            return SessionDirective::Stop;
        }
        if shared.user_canceled.load(Ordering::Acquire) {
            info!("Connected after the user cancelled, disconnecting");
            return SessionDirective::Stop;
        }

        shared.ever_connected.store(true, Ordering::Release);
        shared.apply(ConnectionState::Connected);
        SessionDirective::Continue
    }

    fn on_disconnected(&self, context: &DisconnectContext) -> SessionDirective {
        let Some(shared) = self.shared.upgrade() else {
            return SessionDirective::Stop;
        };
        let _guard = shared.lock_transition();

        if !shared.is_current(self.generation) {
            debug!(
                "Stale generation {} disconnected ({:?}), disabling its reconnect",
                self.generation, context.cause
            );
            return SessionDirective::Stop;
        }

        if context.cause.is_authentication_failure() {
            error!(
                "Authentication failed for client {}, not reconnecting",
                self.client_id
            );
            shared.apply(ConnectionState::Disconnected);
            shared.state_listeners.notify("authentication failure", |l| {
                l.on_authentication_failure(&self.client_id)
            });
            return SessionDirective::Stop;
        }

        if shared.user_canceled.load(Ordering::Acquire) {
            debug!("Disconnected after user cancel");
            shared.apply(ConnectionState::Disconnected);
            return SessionDirective::Stop;
        }

        if context.source == DisconnectSource::User {
            shared.apply(ConnectionState::Disconnected);
            return SessionDirective::Stop;
        }

        if let DisconnectCause::Rejected(reason) = &context.cause {
            error!("Broker connection rejected: {}", reason);
            shared.apply(ConnectionState::Disconnected);
            return SessionDirective::Stop;
        }

        info!("Connection lost ({:?}), client will retry", context.cause);
        shared.apply(ConnectionState::Connecting);
        SessionDirective::Continue
    }
}

#[derive(Default)]
struct Control {
    client: Option<Arc<dyn Transport>>,
    attempt: Option<ConnectAttempt>,
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    factory: Arc<dyn TransportFactory>,
    control: tokio::sync::Mutex<Control>,
    options: ManagerOptions,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn TransportFactory>, options: ManagerOptions) -> Self {
        Self {
            shared: Arc::new(Shared::new(options.queue_limit)),
            factory,
            control: tokio::sync::Mutex::new(Control::default()),
            options,
        }
    }

    /// Manager backed by rumqttc, tuned from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let factory = MqttTransportFactory::new(TransportOptions::from(config));
        Ok(Self::new(Arc::new(factory), ManagerOptions::from(config)))
    }

    /// Replaces any existing client with one for `info` and starts connecting.
    ///
    /// Never fails: problems are logged. If the client cannot be built or the
    /// connect cannot be initiated, the state settles in DISCONNECTED.
    pub async fn connect(&self, info: ConnectionInfo) {
        let mut control = self.control.lock().await;
        let generation = self.shared.bump_generation();
        info!(
            "Connecting to {} as {} (generation {})",
            info.broker_uri(),
            info.client_id(),
            generation
        );

        if let Some(previous) = control.client.take() {
            control.attempt = None;
            if previous.is_connected_or_reconnecting() {
                self.shutdown_client(previous.as_ref(), "previous client").await;
            }
        }
        self.shared.set_active(None);
        self.shared.user_canceled.store(false, Ordering::Release);

        let listener = Arc::new(GenerationListener {
            generation,
            client_id: info.client_id().to_string(),
            shared: Arc::downgrade(&self.shared),
        });
        let client = match self.factory.create(&info, listener) {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to create MQTT client for {}: {}", info.broker_uri(), e);
                self.shared.transition(ConnectionState::Disconnected);
                return;
            }
        };

        control.client = Some(client.clone());
        self.shared.set_active(Some(ActiveSession {
            client: client.clone(),
            topic_prefix: info.topic_prefix().to_string(),
            qos: info.qos(),
        }));
        self.shared.transition(ConnectionState::Connecting);

        match client.connect(false) {
            Ok(attempt) => control.attempt = Some(attempt),
            Err(e) => {
                error!("Failed to start connecting to {}: {}", info.broker_uri(), e);
                self.shared.transition(ConnectionState::Disconnected);
            }
        }
    }

    /// Tears the current client down and settles in DISCONNECTED.
    pub async fn disconnect(&self) {
        let control = self.control.lock().await;
        self.shared.user_canceled.store(true, Ordering::Release);
        self.shared.disconnecting.store(true, Ordering::Release);

        if let Some(attempt) = control.attempt.as_ref() {
            if !attempt.is_done() {
                debug!("Cancelling connect attempt in progress");
                attempt.cancel();
            }
        }

        if let Some(client) = control.client.as_ref() {
            self.shutdown_client(client.as_ref(), "client").await;
        }

        self.shared.transition(ConnectionState::Disconnected);
        self.shared.disconnecting.store(false, Ordering::Release);
    }

    async fn shutdown_client(&self, client: &dyn Transport, what: &str) {
        match tokio::time::timeout(self.options.disconnect_timeout, client.disconnect()).await {
            Ok(Ok(())) => debug!("Disconnected {}", what),
            Ok(Err(e)) => warn!("Error disconnecting {}: {}", what, e),
            Err(_) => warn!(
                "Disconnecting {} timed out after {:?}, continuing",
                what, self.options.disconnect_timeout
            ),
        }
    }

    /// Publishes `payload` to `topic` under the session's topic prefix.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> PublishOutcome {
        if !self.shared.ever_connected.load(Ordering::Acquire) {
            trace!("Dropping publish to {}: never connected", topic);
            return PublishOutcome::Dropped(DropReason::NeverConnected);
        }

        let session = match self.shared.active() {
            Some(session) if session.client.is_connected_or_reconnecting() => session,
            _ => {
                trace!("Dropping publish to {}: not connected", topic);
                return PublishOutcome::Dropped(DropReason::NotConnected);
            }
        };

        let gate = self.shared.gate.clone();
        let slot = match gate.admit() {
            Admission::Rejected => return PublishOutcome::Dropped(DropReason::QueueFull),
            Admission::Accepted(slot) => Some(slot),
            Admission::Unbounded => None,
        };

        let full_topic = join_topic(&session.topic_prefix, topic);
        let label = full_topic.clone();
        let completion = PublishCompletion::new(move |result| {
            match result {
                Ok(()) => trace!("Published to {}", label),
                Err(e) => warn!("Publish to {} failed: {}", label, e),
            }
            if let Some(slot) = slot {
                gate.release(slot);
            }
        });

        let message = OutboundMessage {
            topic: full_topic,
            qos: session.qos,
            payload: payload.into(),
        };
        match session.client.publish(message, completion) {
            Ok(()) => PublishOutcome::Forwarded,
            Err(e) => {
                debug!("Transport refused publish: {}", e);
                PublishOutcome::Dropped(DropReason::TransportRefused)
            }
        }
    }

    /// Sets the in-flight publish limit. Negative values are treated as 0,
    /// which disables the gate.
    pub fn set_queue_limit(&self, limit: i64) {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        self.shared.gate.set_limit(limit);
    }

    pub fn queue_limit(&self) -> usize {
        self.shared.gate.limit()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.gate.pending()
    }

    pub fn is_backpressure_active(&self) -> bool {
        self.shared.gate.is_backpressure_active()
    }

    pub fn register_state_listener(&self, listener: Arc<dyn ConnectionStateListener>) {
        self.shared.state_listeners.register(listener);
    }

    pub fn unregister_state_listener(&self, listener: &Arc<dyn ConnectionStateListener>) -> bool {
        self.shared.state_listeners.unregister(listener)
    }

    pub fn register_backpressure_listener(&self, listener: Arc<dyn QueueBackpressureListener>) {
        self.shared.gate.register_listener(listener);
    }

    pub fn unregister_backpressure_listener(
        &self,
        listener: &Arc<dyn QueueBackpressureListener>,
    ) -> bool {
        self.shared.gate.unregister_listener(listener)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch channel mirroring `state()`.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// True while `disconnect` is tearing the client down.
    pub fn is_disconnecting(&self) -> bool {
        self.shared.disconnecting.load(Ordering::Acquire)
    }
}

/// Joins a topic prefix and suffix with exactly one `/`.
fn join_topic(prefix: &str, topic: &str) -> String {
    if prefix.is_empty() {
        topic.to_string()
    } else {
        format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            topic.trim_start_matches('/')
        )
    }
}
