//! rumqttc-backed `Transport`.
//!
//! `MqttTransport` owns one `AsyncClient` and, once `connect` is called, a
//! driver task that polls the matching `EventLoop`. The driver:
//!
//! 1. reports CONNACK to the listener and resets the reconnect backoff,
//! 2. matches outgoing publishes and broker acknowledgments to completions,
//! 3. classifies poll errors into a `DisconnectContext`,
//! 4. sleeps with backoff and polls again, unless the listener answered
//!    `Stop` or the failure cannot be fixed by retrying.
//!
//! Dropping the transport cancels the driver.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet,
    StateError,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    backoff::Backoff,
    client::{ClientBuilder, TransportOptions},
    error::TransportError,
    info::ConnectionInfo,
    qos::MqttQos,
    transport::{
        ConnectAttempt, DisconnectCause, DisconnectContext, DisconnectSource, OutboundMessage,
        PublishCompletion, SessionDirective, Transport, TransportFactory, TransportListener,
    },
};

/// Builds `MqttTransport`s that share one set of session options.
#[derive(Debug, Clone, Default)]
pub struct MqttTransportFactory {
    options: TransportOptions,
}

impl MqttTransportFactory {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

impl TransportFactory for MqttTransportFactory {
    fn create(
        &self,
        info: &ConnectionInfo,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let (client, event_loop) = ClientBuilder::new(info, &self.options).build()?;
        debug!("Built MQTT client {} for {}", info.client_id(), info.broker_uri());
        Ok(Arc::new(MqttTransport::new(
            client,
            event_loop,
            listener,
            &self.options,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SessionStatus {
    /// Built, `connect` not called yet.
    Idle = 0,
    /// First attempt in progress.
    Connecting = 1,
    Connected = 2,
    /// Between sessions with automatic reconnect armed.
    Reconnecting = 3,
    /// Driver finished; this transport will not connect again.
    Closed = 4,
}

impl SessionStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionStatus::Idle,
            1 => SessionStatus::Connecting,
            2 => SessionStatus::Connected,
            3 => SessionStatus::Reconnecting,
            _ => SessionStatus::Closed,
        }
    }
}

/// Matches queued publishes to the packet ids rumqttc assigns them.
///
/// rumqttc reports `Outgoing::Publish(pkid)` in request order, so completions
/// are queued in the same order the requests were handed to the client.
#[derive(Default)]
struct PublishTracker {
    queued: VecDeque<(MqttQos, PublishCompletion)>,
    awaiting_ack: HashMap<u16, PublishCompletion>,
}

impl PublishTracker {
    fn queue(&mut self, qos: MqttQos, completion: PublishCompletion) {
        self.queued.push_back((qos, completion));
    }

    /// Returns the completion to fire now, if the publish needs no ack.
    fn sent(&mut self, pkid: u16) -> Option<PublishCompletion> {
        if pkid != 0 && self.awaiting_ack.contains_key(&pkid) {
            trace!("Retransmitted publish pkid={}", pkid);
            return None;
        }

        match self.queued.pop_front() {
            Some((MqttQos::AtMostOnce, completion)) => Some(completion),
            Some((_, completion)) => {
                self.awaiting_ack.insert(pkid, completion);
                None
            }
            None => {
                trace!("Outgoing publish pkid={} has no tracked completion", pkid);
                None
            }
        }
    }

    fn acknowledged(&mut self, pkid: u16) -> Option<PublishCompletion> {
        self.awaiting_ack.remove(&pkid)
    }

    fn drain(&mut self) -> Vec<PublishCompletion> {
        self.queued
            .drain(..)
            .map(|(_, completion)| completion)
            .chain(self.awaiting_ack.drain().map(|(_, completion)| completion))
            .collect()
    }

    fn len(&self) -> usize {
        self.queued.len() + self.awaiting_ack.len()
    }
}

struct SessionShared {
    status: AtomicU8,
    reconnect: AtomicBool,
    user_disconnect: AtomicBool,
    tracker: Mutex<PublishTracker>,
    closed_tx: watch::Sender<bool>,
}

impl SessionShared {
    fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn tracker(&self) -> std::sync::MutexGuard<'_, PublishTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abandon_all(&self, reason: &str) {
        let pending = self.tracker().drain();
        if !pending.is_empty() {
            debug!("Abandoning {} unacknowledged publishes", pending.len());
        }
        for completion in pending {
            completion.complete(Err(TransportError::Abandoned(reason.to_string())));
        }
    }
}

pub struct MqttTransport {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    listener: Arc<dyn TransportListener>,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    done: Arc<AtomicBool>,
    backoff: Backoff,
}

impl MqttTransport {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        listener: Arc<dyn TransportListener>,
        options: &TransportOptions,
    ) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
            listener,
            shared: Arc::new(SessionShared {
                status: AtomicU8::new(SessionStatus::Idle as u8),
                reconnect: AtomicBool::new(true),
                user_disconnect: AtomicBool::new(false),
                tracker: Mutex::new(PublishTracker::default()),
                closed_tx,
            }),
            cancel: CancellationToken::new(),
            done: Arc::new(AtomicBool::new(false)),
            backoff: Backoff::new(options.reconnect_delay, options.max_reconnect_delay, 2.0),
        }
    }

    fn close_without_driver(&self) {
        self.shared.set_status(SessionStatus::Closed);
        self.done.store(true, Ordering::Release);
        self.shared.closed_tx.send_replace(true);
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn connect(&self, clean_session: bool) -> Result<ConnectAttempt, TransportError> {
        let mut event_loop = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| TransportError::Other("connect already called".into()))?;

        event_loop.mqtt_options.set_clean_session(clean_session);
        self.shared.set_status(SessionStatus::Connecting);

        let driver = SessionDriver {
            client: self.client.clone(),
            event_loop,
            listener: self.listener.clone(),
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
            done: self.done.clone(),
            backoff: self.backoff.clone(),
        };
        tokio::spawn(driver.run());

        Ok(ConnectAttempt::new(self.cancel.clone(), self.done.clone()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.shared.reconnect.store(false, Ordering::Release);
        self.shared.user_disconnect.store(true, Ordering::Release);

        let mut closed = self.shared.closed_tx.subscribe();
        match self.shared.status() {
            SessionStatus::Idle => {
                self.event_loop
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                self.close_without_driver();
                return Ok(());
            }
            SessionStatus::Closed => return Ok(()),
            SessionStatus::Connected => {
                if let Err(e) = self.client.try_disconnect() {
                    warn!("Failed to queue DISCONNECT, cancelling session: {}", e);
                    self.cancel.cancel();
                }
            }
            SessionStatus::Connecting | SessionStatus::Reconnecting => self.cancel.cancel(),
        }

        loop {
            let finished = *closed.borrow_and_update();
            if finished {
                return Ok(());
            }
            closed
                .changed()
                .await
                .map_err(|_| TransportError::Other("session driver vanished".into()))?;
        }
    }

    fn publish(
        &self,
        message: OutboundMessage,
        completion: PublishCompletion,
    ) -> Result<(), TransportError> {
        if matches!(
            self.shared.status(),
            SessionStatus::Idle | SessionStatus::Closed
        ) {
            completion.complete(Err(TransportError::NotConnected));
            return Err(TransportError::NotConnected);
        }

        let OutboundMessage {
            topic,
            qos,
            payload,
        } = message;

        let mut tracker = self.shared.tracker();
        match self.client.try_publish(topic, qos.into(), false, payload) {
            Ok(()) => {
                tracker.queue(qos, completion);
                Ok(())
            }
            Err(e) => {
                drop(tracker);
                let reason = e.to_string();
                completion.complete(Err(TransportError::ClientRequest(e)));
                Err(TransportError::Other(reason))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.status() == SessionStatus::Connected
    }

    fn is_connected_or_reconnecting(&self) -> bool {
        matches!(
            self.shared.status(),
            SessionStatus::Connected | SessionStatus::Reconnecting
        )
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Polls one event loop until the session is over.
struct SessionDriver {
    client: AsyncClient,
    event_loop: EventLoop,
    listener: Arc<dyn TransportListener>,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    done: Arc<AtomicBool>,
    backoff: Backoff,
}

enum Step {
    Continue,
    Finished,
}

impl SessionDriver {
    async fn run(mut self) {
        info!(
            "Starting MQTT session for {}",
            self.event_loop.mqtt_options.client_id()
        );

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.on_cancelled();
                    Step::Finished
                }
                polled = self.event_loop.poll() => match polled {
                    Ok(event) => self.handle_event(event),
                    Err(e) => self.handle_error(e).await,
                },
            };

            if let Step::Finished = step {
                break;
            }
        }

        self.shared.set_status(SessionStatus::Closed);
        self.done.store(true, Ordering::Release);
        self.shared.abandon_all("session closed");
        self.shared.closed_tx.send_replace(true);
        debug!("MQTT session driver finished");
    }

    fn on_cancelled(&mut self) {
        if self.shared.status() == SessionStatus::Connected {
            if let Err(e) = self.client.try_disconnect() {
                debug!("DISCONNECT not queued on cancel: {}", e);
            }
        }
        info!("MQTT session cancelled");
        self.listener.on_disconnected(&DisconnectContext::new(
            DisconnectCause::UserRequested,
            DisconnectSource::User,
        ));
    }

    fn handle_event(&mut self, event: Event) -> Step {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connection established (session present: {})", ack.session_present);
                    self.done.store(true, Ordering::Release);
                    self.shared.set_status(SessionStatus::Connected);
                    self.backoff.reset();

                    if self.listener.on_connected() == SessionDirective::Stop {
                        debug!("Listener declined the session, disconnecting");
                        self.shared.reconnect.store(false, Ordering::Release);
                        self.shared.user_disconnect.store(true, Ordering::Release);
                        if let Err(e) = self.client.try_disconnect() {
                            warn!("Failed to queue DISCONNECT: {}", e);
                            return Step::Finished;
                        }
                    }
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => self.acknowledge(ack.pkid),
            Event::Incoming(Packet::PubComp(comp)) => self.acknowledge(comp.pkid),
            Event::Incoming(Packet::Disconnect) => warn!("Disconnected by broker"),
            Event::Incoming(packet) => trace!("Incoming packet: {:?}", packet),
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                let ready = self.shared.tracker().sent(pkid);
                if let Some(completion) = ready {
                    completion.complete(Ok(()));
                }
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                info!("DISCONNECT sent, closing session");
                self.listener.on_disconnected(&DisconnectContext::new(
                    DisconnectCause::UserRequested,
                    DisconnectSource::User,
                ));
                return Step::Finished;
            }
            Event::Outgoing(outgoing) => trace!("Outgoing packet: {:?}", outgoing),
        }
        Step::Continue
    }

    fn acknowledge(&self, pkid: u16) {
        let acked = self.shared.tracker().acknowledged(pkid);
        match acked {
            Some(completion) => completion.complete(Ok(())),
            None => trace!("Ack for untracked pkid={}", pkid),
        }
    }

    async fn handle_error(&mut self, err: ConnectionError) -> Step {
        let was_connected = self.shared.status() == SessionStatus::Connected;
        let failure = classify_connection_error(&err);
        let context = if self.shared.user_disconnect.load(Ordering::Acquire) {
            DisconnectContext::new(DisconnectCause::UserRequested, DisconnectSource::User)
        } else {
            disconnect_context(&err, failure, was_connected)
        };

        match failure {
            Failure::Transient => warn!("Connection lost: {}", get_error_message(&err)),
            _ => error!("Connection rejected: {}", get_error_message(&err)),
        }
        debug!("Connection error details: {:?}", err);

        let directive = self.listener.on_disconnected(&context);
        let retry = directive == SessionDirective::Continue
            && failure == Failure::Transient
            && self.shared.reconnect.load(Ordering::Acquire);

        if !retry {
            return Step::Finished;
        }

        self.shared.set_status(SessionStatus::Reconnecting);
        let delay = self.backoff.next_sleep();
        info!(
            "Reconnecting in {:.2} seconds (attempt {})",
            delay.as_secs_f64(),
            self.backoff.attempt()
        );

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.on_cancelled();
                Step::Finished
            }
            _ = tokio::time::sleep(delay) => Step::Continue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Broker refused the credentials.
    Authentication,
    /// Retrying cannot help.
    Rejected,
    /// Worth another attempt.
    Transient,
}

fn classify_connection_error(err: &ConnectionError) -> Failure {
    use Failure::*;

    match err {
        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
                Authentication
            }
            ConnectReturnCode::RefusedProtocolVersion | ConnectReturnCode::BadClientId => Rejected,
            // Broker up but overloaded
            ConnectReturnCode::ServiceUnavailable => Transient,
            _ => Transient,
        },

        // Certificates or crypto setup
        ConnectionError::Tls(_) => Rejected,

        ConnectionError::MqttState(state) => match state {
            StateError::Io(_) | StateError::AwaitPingResp => Transient,
            _ => Rejected,
        },

        ConnectionError::NotConnAck(_) => Rejected,
        ConnectionError::RequestsDone => Rejected,

        // Local misconfiguration
        ConnectionError::Io(e) => match e.kind() {
            std::io::ErrorKind::AddrInUse
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::InvalidInput
            | std::io::ErrorKind::InvalidData => Rejected,
            _ => Transient,
        },

        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => Transient,

        #[allow(unreachable_patterns)]
        _ => Transient,
    }
}

fn disconnect_context(
    err: &ConnectionError,
    failure: Failure,
    was_connected: bool,
) -> DisconnectContext {
    match failure {
        Failure::Authentication => {
            DisconnectContext::new(DisconnectCause::AuthenticationFailed, DisconnectSource::Server)
        }
        Failure::Rejected => {
            let source = if matches!(err, ConnectionError::ConnectionRefused(_)) {
                DisconnectSource::Server
            } else {
                DisconnectSource::Client
            };
            DisconnectContext::new(DisconnectCause::Rejected(get_error_message(err)), source)
        }
        Failure::Transient => match err {
            ConnectionError::Io(e)
                if was_connected
                    && matches!(
                        e.kind(),
                        std::io::ErrorKind::UnexpectedEof
                            | std::io::ErrorKind::ConnectionReset
                            | std::io::ErrorKind::ConnectionAborted
                    ) =>
            {
                DisconnectContext::new(DisconnectCause::ServerClosed, DisconnectSource::Server)
            }
            _ => DisconnectContext::new(
                DisconnectCause::Network(get_error_message(err)),
                DisconnectSource::Client,
            ),
        },
    }
}

/// Innermost message of an error chain, without surrounding quotes.
fn get_error_message(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex as StdMutex, time::Duration};

    use super::*;

    #[derive(Default)]
    struct RecordingListener {
        disconnects: StdMutex<Vec<DisconnectContext>>,
        directive: Option<SessionDirective>,
    }

    impl TransportListener for RecordingListener {
        fn on_connected(&self) -> SessionDirective {
            SessionDirective::Continue
        }

        fn on_disconnected(&self, context: &DisconnectContext) -> SessionDirective {
            self.disconnects.lock().unwrap().push(context.clone());
            self.directive.unwrap_or(SessionDirective::Continue)
        }
    }

    fn io_error(kind: io::ErrorKind) -> ConnectionError {
        ConnectionError::Io(io::Error::new(kind, "test"))
    }

    #[test]
    fn test_classify_auth_refusals() {
        for code in [
            ConnectReturnCode::BadUserNamePassword,
            ConnectReturnCode::NotAuthorized,
        ] {
            assert_eq!(
                classify_connection_error(&ConnectionError::ConnectionRefused(code)),
                Failure::Authentication
            );
        }
    }

    #[test]
    fn test_classify_rejections() {
        assert_eq!(
            classify_connection_error(&ConnectionError::ConnectionRefused(
                ConnectReturnCode::BadClientId
            )),
            Failure::Rejected
        );
        assert_eq!(
            classify_connection_error(&io_error(io::ErrorKind::PermissionDenied)),
            Failure::Rejected
        );
        assert_eq!(
            classify_connection_error(&ConnectionError::RequestsDone),
            Failure::Rejected
        );
    }

    #[test]
    fn test_classify_protocol_state_errors() {
        assert_eq!(
            classify_connection_error(&ConnectionError::MqttState(StateError::Io(
                io::Error::new(io::ErrorKind::BrokenPipe, "pipe")
            ))),
            Failure::Transient
        );
        assert_eq!(
            classify_connection_error(&ConnectionError::MqttState(StateError::Unsolicited(7))),
            Failure::Rejected
        );
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(
            classify_connection_error(&io_error(io::ErrorKind::ConnectionRefused)),
            Failure::Transient
        );
        assert_eq!(
            classify_connection_error(&ConnectionError::NetworkTimeout),
            Failure::Transient
        );
        assert_eq!(
            classify_connection_error(&ConnectionError::MqttState(StateError::AwaitPingResp)),
            Failure::Transient
        );
        assert_eq!(
            classify_connection_error(&ConnectionError::ConnectionRefused(
                ConnectReturnCode::ServiceUnavailable
            )),
            Failure::Transient
        );
    }

    #[test]
    fn test_context_for_auth_failure() {
        let err = ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
        let ctx = disconnect_context(&err, classify_connection_error(&err), false);
        assert_eq!(ctx.cause, DisconnectCause::AuthenticationFailed);
        assert_eq!(ctx.source, DisconnectSource::Server);
    }

    #[test]
    fn test_context_for_reset_after_connect() {
        let err = io_error(io::ErrorKind::ConnectionReset);
        let ctx = disconnect_context(&err, Failure::Transient, true);
        assert_eq!(ctx.cause, DisconnectCause::ServerClosed);

        let ctx = disconnect_context(&err, Failure::Transient, false);
        assert!(matches!(ctx.cause, DisconnectCause::Network(_)));
        assert_eq!(ctx.source, DisconnectSource::Client);
    }

    #[test]
    fn test_tracker_qos0_completes_on_send() {
        let mut tracker = PublishTracker::default();
        tracker.queue(MqttQos::AtMostOnce, PublishCompletion::noop());
        assert!(tracker.sent(0).is_some());
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn test_tracker_qos1_waits_for_ack_and_ignores_retransmit() {
        let mut tracker = PublishTracker::default();
        tracker.queue(MqttQos::AtLeastOnce, PublishCompletion::noop());
        tracker.queue(MqttQos::AtLeastOnce, PublishCompletion::noop());

        assert!(tracker.sent(1).is_none());
        assert!(tracker.sent(1).is_none());
        assert_eq!(tracker.len(), 2);

        assert!(tracker.sent(2).is_none());
        assert!(tracker.acknowledged(1).is_some());
        assert!(tracker.acknowledged(1).is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_tracker_drain_returns_everything() {
        let mut tracker = PublishTracker::default();
        tracker.queue(MqttQos::ExactlyOnce, PublishCompletion::noop());
        tracker.sent(9);
        tracker.queue(MqttQos::AtMostOnce, PublishCompletion::noop());
        assert_eq!(tracker.drain().len(), 2);
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn test_error_message_walks_chain() {
        let err = io_error(io::ErrorKind::Other);
        assert_eq!(get_error_message(&err), "test");
    }

    #[tokio::test]
    async fn test_factory_builds_idle_transport() {
        let factory = MqttTransportFactory::default();
        let info = ConnectionInfo::new("localhost", 1883, false, "factory-test");
        let transport = factory
            .create(&info, Arc::new(RecordingListener::default()))
            .unwrap();

        assert!(!transport.is_connected());
        assert!(!transport.is_connected_or_reconnecting());
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails_completion() {
        let factory = MqttTransportFactory::default();
        let info = ConnectionInfo::new("localhost", 1883, false, "factory-test");
        let transport = factory
            .create(&info, Arc::new(RecordingListener::default()))
            .unwrap();

        let failed = Arc::new(AtomicBool::new(false));
        let flag = failed.clone();
        let result = transport.publish(
            OutboundMessage {
                topic: "t".into(),
                qos: MqttQos::AtLeastOnce,
                payload: b"x".to_vec(),
            },
            PublishCompletion::new(move |r| flag.store(r.is_err(), Ordering::SeqCst)),
        );

        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert!(failed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_idle_transport() {
        let factory = MqttTransportFactory::default();
        let info = ConnectionInfo::new("localhost", 1883, false, "factory-test");
        let transport = factory
            .create(&info, Arc::new(RecordingListener::default()))
            .unwrap();

        transport.disconnect().await.unwrap();
        assert!(transport.connect(false).is_err());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_network_loss() {
        let listener = Arc::new(RecordingListener {
            directive: Some(SessionDirective::Stop),
            ..Default::default()
        });
        let factory = MqttTransportFactory::default();
        // Port 1 on loopback has nothing listening.
        let info = ConnectionInfo::new("127.0.0.1", 1, false, "refused-test");
        let transport = factory.create(&info, listener.clone()).unwrap();

        let attempt = transport.connect(false).unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            while !attempt.is_done() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        let seen = listener.disconnects.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0].cause, DisconnectCause::Network(_)));
        assert!(!transport.is_connected_or_reconnecting());
    }
}
