//! The seam between a [`Connection`](crate::Connection) and the network.
//!
//! A [`Transport`] owns the actual socket: it establishes the connection, reports lifecycle
//! changes as [`ConnectionState`] values, and moves whole [`Message`]s in and out. The
//! session layer never touches bytes on the wire.
//!
//! All methods are called from the connection's driver task, one at a time. Completion futures
//! returned by [`Transport::send`] and [`Transport::receive`] are `'static` so the driver can
//! hold them while it keeps calling into the transport.
#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types carry the module name to read clearly at the crate root"
)]

pub mod tungstenite;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::message::Message;
use crate::state::ConnectionState;

/// Channel on which a transport reports its lifecycle.
pub type StateSender = mpsc::UnboundedSender<ConnectionState>;

/// Completion of a single [`Transport::send`].
pub type SendFuture = BoxFuture<'static, Result<(), TransportError>>;

/// Completion of a single [`Transport::receive`]. `Ok(None)` means the read produced no content.
pub type ReceiveFuture = BoxFuture<'static, Result<Option<Message>, TransportError>>;

/// A message-oriented, bidirectional connection.
pub trait Transport: Send + 'static {
    /// Begin establishing the connection on `runtime`.
    ///
    /// Every lifecycle change, starting with [`ConnectionState::Preparing`], is reported on
    /// `states` in the order it happens.
    fn start(&mut self, runtime: &Handle, states: StateSender);

    /// Request the next inbound message.
    ///
    /// Only called after [`ConnectionState::Ready`] was reported, and never while a previous
    /// receive is still pending.
    fn receive(&mut self) -> ReceiveFuture;

    /// Hand `message` to the connection.
    ///
    /// The message must be queued before this returns: the caller may drop the returned future
    /// and still expects the message to go out ahead of anything sent or cancelled later.
    fn send(&mut self, message: Message) -> SendFuture;

    /// Stop the connection. Pending sends already queued should still be flushed when possible.
    fn cancel(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn start(&mut self, runtime: &Handle, states: StateSender) {
        (**self).start(runtime, states);
    }

    fn receive(&mut self) -> ReceiveFuture {
        (**self).receive()
    }

    fn send(&mut self, message: Message) -> SendFuture {
        (**self).send(message)
    }

    fn cancel(&mut self) {
        (**self).cancel();
    }
}

/// Failure reported by a [`Transport`].
///
/// Cheap to clone so that it can travel inside [`ConnectionState::Waiting`] and
/// [`ConnectionState::Failed`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The WebSocket stack reported an error (I/O, TLS, handshake, protocol)
    WebSocket(Arc<tokio_tungstenite::tungstenite::Error>),
    /// Connecting did not complete within the configured timeout
    Timeout,
    /// The connection is closed, or the transport was cancelled
    Closed,
    /// The message cannot be expressed by this transport
    Unsupported(&'static str),
    /// Any other failure, for transports not built on tungstenite
    Other(Arc<dyn StdError + Send + Sync + 'static>),
}

impl TransportError {
    pub fn other<E: Into<Box<dyn StdError + Send + Sync + 'static>>>(error: E) -> Self {
        Self::Other(Arc::from(error.into()))
    }

    /// Whether the failure is a condition that might clear on its own (unreachable network,
    /// timeout) rather than a rejection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::WebSocket(e) => matches!(**e, tokio_tungstenite::tungstenite::Error::Io(_)),
            Self::Closed | Self::Unsupported(_) | Self::Other(_) => false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket(e) => write!(f, "WebSocket transport error: {e}"),
            Self::Timeout => write!(f, "WebSocket connect timed out"),
            Self::Closed => write!(f, "WebSocket transport closed"),
            Self::Unsupported(what) => write!(f, "unsupported by transport: {what}"),
            Self::Other(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::WebSocket(e) => Some(e.as_ref()),
            Self::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Arc::new(e))
    }
}
