//! The observer side of a [`Connection`](crate::Connection).
#![expect(
    clippy::module_name_repetitions,
    reason = "Sink implementations are named after what they forward to"
)]

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Error, Kind};
use crate::message::CloseCode;

/// Receives every asynchronous outcome of a [`Connection`](crate::Connection).
///
/// A connection only keeps a weak reference to its sink, so the sink's owner decides how long
/// it lives. Calls are made from the connection's driver task, one at a time and in the order
/// the transport reported them, so implementations should return quickly.
///
/// Every method defaults to doing nothing.
pub trait EventSink: Send + Sync {
    /// The transport started establishing the connection.
    fn on_prepare(&self) {}

    /// The connection is ready and listening.
    fn on_connect(&self) {}

    /// The connection was closed, by the peer or by
    /// [`Connection::disconnect`](crate::Connection::disconnect).
    fn on_disconnect(&self, code: CloseCode, reason: Option<Bytes>) {
        let _ = (code, reason);
    }

    /// The transport was cancelled.
    fn on_cancel(&self) {}

    /// The connection failed. No further events follow.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }

    /// A PONG answered one of our PINGs.
    fn on_pong(&self) {}

    fn on_text_message(&self, text: String) {
        let _ = text;
    }

    fn on_binary_message(&self, data: Bytes) {
        let _ = data;
    }
}

/// An owned copy of a single [`EventSink`] notification.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Prepare,
    Connect,
    Disconnect {
        code: CloseCode,
        reason: Option<Bytes>,
    },
    Cancel,
    Error {
        kind: Kind,
        message: String,
    },
    Pong,
    Text(String),
    Binary(Bytes),
}

/// Forwards events into an unbounded channel.
///
/// ```rust,no_run
/// use websocket_session::{ChannelSink, Config, Connection, Event};
///
/// # async fn run() -> websocket_session::Result<()> {
/// let (sink, mut events) = ChannelSink::channel();
/// let mut connection = Connection::new("wss://echo.example.com", Config::default())?;
/// connection.set_event_sink(&sink);
/// connection.connect()?;
///
/// while let Some(event) = events.recv().await {
///     if let Event::Text(text) = event {
///         println!("{text}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on.
    #[must_use]
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn forward(&self, event: Event) {
        // A dropped receiver just means nobody is listening any more.
        _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_prepare(&self) {
        self.forward(Event::Prepare);
    }

    fn on_connect(&self) {
        self.forward(Event::Connect);
    }

    fn on_disconnect(&self, code: CloseCode, reason: Option<Bytes>) {
        self.forward(Event::Disconnect { code, reason });
    }

    fn on_cancel(&self) {
        self.forward(Event::Cancel);
    }

    fn on_error(&self, error: &Error) {
        self.forward(Event::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn on_pong(&self) {
        self.forward(Event::Pong);
    }

    fn on_text_message(&self, text: String) {
        self.forward(Event::Text(text));
    }

    fn on_binary_message(&self, data: Bytes) {
        self.forward(Event::Binary(data));
    }
}

/// Logs every event through `tracing`.
#[cfg(feature = "tracing")]
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[cfg(feature = "tracing")]
impl EventSink for TracingSink {
    fn on_prepare(&self) {
        tracing::debug!("Connection preparing");
    }

    fn on_connect(&self) {
        tracing::info!("Connection ready");
    }

    fn on_disconnect(&self, code: CloseCode, reason: Option<Bytes>) {
        tracing::info!(code = code.as_u16(), ?reason, "Connection closed");
    }

    fn on_cancel(&self) {
        tracing::info!("Connection cancelled");
    }

    fn on_error(&self, error: &Error) {
        tracing::error!(kind = %error.kind(), error = %error, "Connection failed");
    }

    fn on_pong(&self) {
        tracing::trace!("PONG received");
    }

    fn on_text_message(&self, text: String) {
        tracing::debug!(%text, "Received text message");
    }

    fn on_binary_message(&self, data: Bytes) {
        tracing::debug!(len = data.len(), "Received binary message");
    }
}
