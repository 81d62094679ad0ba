//! Opcode routing for inbound messages.

use bytes::Bytes;

use crate::message::{CloseFrame, Message};

/// Where an inbound [`Message`] goes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Nothing to deliver
    Skip,
    /// Deliver as a text message
    Text(String),
    /// Deliver as a binary message
    Binary(Bytes),
    /// Resolve the oldest outstanding ping
    Pong,
    /// The peer closed the connection
    Close(CloseFrame),
}

/// Decide what to do with an inbound message.
///
/// Data messages with an empty payload are skipped, and text that is not valid UTF-8 is
/// dropped. Continuation frames are not reassembled here, and pings are answered by the
/// transport.
#[must_use]
pub fn route(message: Message) -> Route {
    match message {
        Message::Text(data) if data.is_empty() => Route::Skip,
        Message::Binary(data) if data.is_empty() => Route::Skip,
        Message::Text(data) => match String::from_utf8(data.into()) {
            Ok(text) => Route::Text(text),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(len = e.as_bytes().len(), "Dropping text message with invalid UTF-8");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                Route::Skip
            }
        },
        Message::Binary(data) => Route::Binary(data),
        Message::Close(frame) => Route::Close(frame),
        Message::Pong(_) => Route::Pong,
        Message::Continuation(_) | Message::Ping(_) => Route::Skip,
    }
}
