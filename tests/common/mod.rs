#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test file uses every helper"
)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use websocket_session::transport::{ReceiveFuture, SendFuture, StateSender};
use websocket_session::{ConnectionState, Event, Message, Transport, TransportError};

/// How long to wait for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(60);

type Inbound = Result<Option<Message>, TransportError>;

/// A [`Transport`] whose every callback is scripted from a [`MockHandle`].
pub struct MockTransport {
    states: Arc<Mutex<Option<StateSender>>>,
    inbound: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>>,
    sent: mpsc::UnboundedSender<Message>,
    fail_sends: Arc<AtomicBool>,
    cancels: Arc<AtomicUsize>,
}

/// The test's side of a [`MockTransport`].
pub struct MockHandle {
    states: Arc<Mutex<Option<StateSender>>>,
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: mpsc::UnboundedReceiver<Message>,
    fail_sends: Arc<AtomicBool>,
    cancels: Arc<AtomicUsize>,
}

#[must_use]
pub fn mock() -> (MockTransport, MockHandle) {
    let states = Arc::new(Mutex::new(None));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let fail_sends = Arc::new(AtomicBool::new(false));
    let cancels = Arc::new(AtomicUsize::new(0));

    let transport = MockTransport {
        states: Arc::clone(&states),
        inbound: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
        sent: sent_tx,
        fail_sends: Arc::clone(&fail_sends),
        cancels: Arc::clone(&cancels),
    };
    let handle = MockHandle {
        states,
        inbound: inbound_tx,
        sent: sent_rx,
        fail_sends,
        cancels,
    };

    (transport, handle)
}

impl Transport for MockTransport {
    fn start(&mut self, _runtime: &Handle, states: StateSender) {
        *self.states.lock().unwrap() = Some(states);
    }

    fn receive(&mut self) -> ReceiveFuture {
        let inbound = Arc::clone(&self.inbound);
        Box::pin(async move {
            match inbound.lock().await.recv().await {
                Some(next) => next,
                None => future::pending().await,
            }
        })
    }

    fn send(&mut self, message: Message) -> SendFuture {
        _ = self.sent.send(message);
        let result = if self.fail_sends.load(Ordering::SeqCst) {
            Err(TransportError::other("send rejected"))
        } else {
            Ok(())
        };
        Box::pin(future::ready(result))
    }

    fn cancel(&mut self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockHandle {
    /// Report a lifecycle change. Ignored once the session stopped listening for them.
    pub fn state(&self, state: ConnectionState) {
        let states = self.states.lock().unwrap();
        let states = states.as_ref().expect("transport was not started");
        _ = states.send(state);
    }

    pub fn deliver(&self, message: Message) {
        _ = self.inbound.send(Ok(Some(message)));
    }

    /// Complete a receive without content.
    pub fn deliver_empty(&self) {
        _ = self.inbound.send(Ok(None));
    }

    pub fn deliver_error(&self, error: TransportError) {
        _ = self.inbound.send(Err(error));
    }

    /// Make every following send complete with an error.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub async fn next_sent(&mut self) -> Message {
        timeout(PATIENCE, self.sent.recv())
            .await
            .expect("timed out waiting for a send")
            .expect("transport dropped")
    }

    pub fn try_sent(&mut self) -> Option<Message> {
        self.sent.try_recv().ok()
    }

    /// Wait until the session has cancelled the transport `count` times.
    pub async fn wait_for_cancels(&self, count: usize) {
        timeout(PATIENCE, async {
            while self.cancels() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for transport cancel");
    }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(PATIENCE, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Give the driver a chance to run, then check that it had nothing to report.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<Event>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event: {event:?}");
    }
}
