//! Scripted transport for lifecycle tests.
//!
//! Tests drive callbacks by hand (`fire_connected`, `fire_disconnected`) and
//! complete publishes one at a time, so every interleaving is deterministic.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    error::TransportError,
    info::ConnectionInfo,
    transport::{
        ConnectAttempt, DisconnectCause, DisconnectContext, DisconnectSource, OutboundMessage,
        PublishCompletion, SessionDirective, Transport, TransportFactory, TransportListener,
    },
};

#[derive(Default)]
pub(crate) struct MockFactory {
    clients: Mutex<Vec<Arc<MockTransport>>>,
    fail_next_create: AtomicBool,
    fail_connect: AtomicBool,
    hang_disconnect: AtomicBool,
}

impl MockFactory {
    /// The `index`-th client built by this factory.
    pub(crate) fn client(&self, index: usize) -> Arc<MockTransport> {
        self.clients.lock().unwrap()[index].clone()
    }

    pub(crate) fn fail_next_create(&self, fail: bool) {
        self.fail_next_create.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Clients built afterwards never finish `disconnect`.
    pub(crate) fn hang_disconnect(&self, hang: bool) {
        self.hang_disconnect.store(hang, Ordering::SeqCst);
    }
}

impl TransportFactory for MockFactory {
    fn create(
        &self,
        _info: &ConnectionInfo,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(TransportError::ClientSetup("scripted failure".into()));
        }

        let transport = Arc::new(MockTransport {
            listener,
            connected: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            clean_session: Mutex::new(None),
            attempt: Mutex::new(None),
            disconnect_calls: AtomicUsize::new(0),
            hang_disconnect: self.hang_disconnect.load(Ordering::SeqCst),
            fail_connect: self.fail_connect.load(Ordering::SeqCst),
            refuse_publishes: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
        });
        self.clients.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}

pub(crate) struct MockTransport {
    listener: Arc<dyn TransportListener>,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    clean_session: Mutex<Option<bool>>,
    attempt: Mutex<Option<(ConnectAttempt, Arc<AtomicBool>)>>,
    disconnect_calls: AtomicUsize,
    hang_disconnect: bool,
    fail_connect: bool,
    refuse_publishes: AtomicBool,
    published: Mutex<Vec<OutboundMessage>>,
    pending: Mutex<VecDeque<PublishCompletion>>,
}

impl MockTransport {
    /// Simulates CONNACK and returns the listener's answer.
    pub(crate) fn fire_connected(&self) -> SessionDirective {
        if let Some((_, done)) = self.attempt.lock().unwrap().as_ref() {
            done.store(true, Ordering::SeqCst);
        }
        self.connected.store(true, Ordering::SeqCst);
        self.reconnecting.store(false, Ordering::SeqCst);

        let directive = self.listener.on_connected();
        if directive == SessionDirective::Stop {
            self.connected.store(false, Ordering::SeqCst);
        }
        directive
    }

    pub(crate) fn fire_disconnected(&self, context: DisconnectContext) -> SessionDirective {
        self.connected.store(false, Ordering::SeqCst);
        let directive = self.listener.on_disconnected(&context);
        self.reconnecting
            .store(directive == SessionDirective::Continue, Ordering::SeqCst);
        directive
    }

    pub(crate) fn clean_session(&self) -> Option<bool> {
        *self.clean_session.lock().unwrap()
    }

    pub(crate) fn attempt_cancelled(&self) -> bool {
        self.attempt
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|(attempt, _)| attempt.is_cancelled())
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn published(&self) -> Vec<OutboundMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Makes `publish` fail the way a full request channel does.
    pub(crate) fn refuse_publishes(&self, refuse: bool) {
        self.refuse_publishes.store(refuse, Ordering::SeqCst);
    }

    /// Completes the oldest outstanding publish.
    pub(crate) fn complete_next(&self, result: Result<(), TransportError>) {
        let next = self.pending.lock().unwrap().pop_front();
        if let Some(completion) = next {
            completion.complete(result);
        }
    }

    /// Drops every outstanding completion without reporting a result.
    pub(crate) fn drop_pending(&self) {
        let pending: Vec<PublishCompletion> = self.pending.lock().unwrap().drain(..).collect();
        drop(pending);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn connect(&self, clean_session: bool) -> Result<ConnectAttempt, TransportError> {
        if self.fail_connect {
            return Err(TransportError::Other("scripted connect failure".into()));
        }
        *self.clean_session.lock().unwrap() = Some(clean_session);

        let done = Arc::new(AtomicBool::new(false));
        let attempt = ConnectAttempt::new(CancellationToken::new(), done.clone());
        *self.attempt.lock().unwrap() = Some((attempt.clone(), done));
        Ok(attempt)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_disconnect {
            std::future::pending::<()>().await;
        }

        self.connected.store(false, Ordering::SeqCst);
        self.reconnecting.store(false, Ordering::SeqCst);
        self.listener.on_disconnected(&DisconnectContext::new(
            DisconnectCause::UserRequested,
            DisconnectSource::User,
        ));
        Ok(())
    }

    fn publish(
        &self,
        message: OutboundMessage,
        completion: PublishCompletion,
    ) -> Result<(), TransportError> {
        if self.refuse_publishes.load(Ordering::SeqCst) {
            completion.complete(Err(TransportError::Other("scripted refusal".into())));
            return Err(TransportError::Other("scripted refusal".into()));
        }
        self.published.lock().unwrap().push(message);
        self.pending.lock().unwrap().push_back(completion);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_connected_or_reconnecting(&self) -> bool {
        self.is_connected() || self.reconnecting.load(Ordering::SeqCst)
    }
}
