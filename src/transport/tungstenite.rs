//! [`Transport`] implementation on top of `tokio-tungstenite`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use bytes::Bytes;
use futures::future;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame as RawCloseFrame;
use tokio_tungstenite::tungstenite::{self, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ReceiveFuture, SendFuture, StateSender, Transport, TransportError};
use crate::Result;
use crate::config::{Config, ReconnectConfig};
use crate::error::Error;
use crate::message::{CloseCode, Message};
use crate::state::ConnectionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsRead = SplitStream<WsStream>;
type WsWrite = SplitSink<WsStream, tungstenite::Message>;

/// Work for the writer half.
enum Outgoing {
    Message(
        tungstenite::Message,
        oneshot::Sender<std::result::Result<(), TransportError>>,
    ),
    Shutdown,
}

/// Everything needed to open the socket, possibly more than once.
#[derive(Debug, Clone)]
struct Connector {
    url: Url,
    headers: HeaderMap,
    connect_timeout: Duration,
    reconnect: Option<ReconnectConfig>,
}

impl Connector {
    async fn connect_once(&self) -> std::result::Result<WsStream, TransportError> {
        let mut request = self.url.as_str().into_client_request()?;
        request.headers_mut().extend(self.headers.clone());

        match timeout(self.connect_timeout, connect_async(request)).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => Err(TransportError::Timeout),
        }
    }

    /// Connect, retrying transient failures as long as the reconnect policy allows.
    async fn connect(&self) -> std::result::Result<WsStream, TransportError> {
        let mut backoff: Option<ExponentialBackoff> = self.reconnect.clone().map(Into::into);
        let max_attempts = self.reconnect.as_ref().and_then(|r| r.max_attempts);
        let mut retries = 0_u32;

        loop {
            let error = match self.connect_once().await {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };

            if !error.is_transient() || max_attempts.is_some_and(|max| retries >= max) {
                return Err(error);
            }
            let Some(delay) = backoff.as_mut().and_then(Backoff::next_backoff) else {
                return Err(error);
            };
            retries = retries.saturating_add(1);

            #[cfg(feature = "tracing")]
            tracing::warn!(error = %error, retry = retries, ?delay, "Unable to connect, retrying");

            sleep(delay).await;
        }
    }
}

/// A WebSocket client transport over TCP, with TLS for `wss://` URLs.
///
/// Connecting happens on a background task spawned by [`Transport::start`]. Once ready, the
/// write half is driven by that same task from a queue, so [`Transport::send`] never waits for
/// the socket and messages leave in the order they were sent.
pub struct TungsteniteTransport {
    connector: Connector,
    auto_reply_ping: bool,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    /// Taken by the connect task on start
    outgoing_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,
    reader: Arc<Mutex<Option<WsRead>>>,
    states: Option<StateSender>,
    token: CancellationToken,
    cancelled: bool,
}

impl fmt::Debug for TungsteniteTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TungsteniteTransport")
            .field("url", &self.connector.url.as_str())
            .field("started", &self.outgoing_rx.is_none())
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl TungsteniteTransport {
    /// Validate `url` and the configured headers.
    ///
    /// Only `ws` and `wss` URLs are accepted.
    pub fn new(url: &str, config: &Config) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported URL scheme `{}`, expected `ws` or `wss`",
                url.scheme()
            )));
        }

        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(value)?;
            headers.insert(name, value);
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        Ok(Self {
            connector: Connector {
                url,
                headers,
                connect_timeout: config.connect_timeout,
                reconnect: config.reconnect.clone(),
            },
            auto_reply_ping: config.auto_reply_ping,
            outgoing_tx,
            outgoing_rx: Some(outgoing_rx),
            reader: Arc::new(Mutex::new(None)),
            states: None,
            token: CancellationToken::new(),
            cancelled: false,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.connector.url
    }
}

impl Transport for TungsteniteTransport {
    fn start(&mut self, runtime: &Handle, states: StateSender) {
        let Some(outgoing) = self.outgoing_rx.take() else {
            #[cfg(feature = "tracing")]
            tracing::warn!(url = %self.connector.url, "Transport already started");
            return;
        };

        if !self.auto_reply_ping {
            #[cfg(feature = "tracing")]
            tracing::warn!("Disabling automatic PONG replies is not supported, PINGs will still be answered");
        }

        self.states = Some(states.clone());

        runtime.spawn(run(
            self.connector.clone(),
            outgoing,
            Arc::clone(&self.reader),
            states,
            self.token.clone(),
        ));
    }

    fn receive(&mut self) -> ReceiveFuture {
        let reader = Arc::clone(&self.reader);

        Box::pin(async move {
            let mut slot = reader.lock().await;
            let Some(read) = slot.as_mut() else {
                return Err(TransportError::Closed);
            };

            match read.next().await {
                Some(Ok(message)) => Ok(from_raw(message)),
                Some(Err(e)) => Err(e.into()),
                None => Err(TransportError::Closed),
            }
        })
    }

    fn send(&mut self, message: Message) -> SendFuture {
        if self.cancelled {
            return Box::pin(future::ready(Err(TransportError::Closed)));
        }
        let raw = match into_raw(message) {
            Ok(raw) => raw,
            Err(e) => return Box::pin(future::ready(Err(e))),
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.outgoing_tx.send(Outgoing::Message(raw, ack_tx)).is_err() {
            return Box::pin(future::ready(Err(TransportError::Closed)));
        }

        Box::pin(async move { ack_rx.await.unwrap_or(Err(TransportError::Closed)) })
    }

    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;

        self.token.cancel();
        // Anything queued before this, such as a close frame, is still written.
        _ = self.outgoing_tx.send(Outgoing::Shutdown);
        self.outgoing_rx = None;
        if let Ok(mut slot) = self.reader.try_lock() {
            slot.take();
        }

        if let Some(states) = &self.states {
            _ = states.send(ConnectionState::Cancelled);
        }
    }
}

/// The connect task: establish the socket, then drive the write half until shutdown.
async fn run(
    connector: Connector,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    reader: Arc<Mutex<Option<WsRead>>>,
    states: StateSender,
    token: CancellationToken,
) {
    _ = states.send(ConnectionState::Preparing);

    let connected = tokio::select! {
        () = token.cancelled() => return,
        result = connector.connect() => result,
    };

    let stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(url = %connector.url, error = %e, "Unable to connect");

            let state = if e.is_transient() {
                ConnectionState::Waiting(e)
            } else {
                ConnectionState::Failed(e)
            };
            _ = states.send(state);
            return;
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(url = %connector.url, "Connected");

    let (write, read) = stream.split();
    {
        let mut slot = reader.lock().await;
        if token.is_cancelled() {
            return;
        }
        *slot = Some(read);
    }
    drop(reader);

    _ = states.send(ConnectionState::Ready);

    write_loop(write, outgoing).await;
}

async fn write_loop(mut write: WsWrite, mut outgoing: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(next) = outgoing.recv().await {
        match next {
            Outgoing::Message(message, ack) => {
                let result = write.send(message).await.map_err(TransportError::from);
                _ = ack.send(result);
            }
            Outgoing::Shutdown => break,
        }
    }

    if let Err(e) = write.close().await {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %e, "Error closing WebSocket");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }
}

fn into_raw(message: Message) -> std::result::Result<tungstenite::Message, TransportError> {
    let raw = match message {
        Message::Text(data) => tungstenite::Message::Text(utf8(data)?),
        Message::Binary(data) => tungstenite::Message::Binary(data),
        Message::Ping(data) => tungstenite::Message::Ping(data),
        Message::Pong(data) => tungstenite::Message::Pong(data),
        Message::Close(frame) if frame.code.is_reserved() => tungstenite::Message::Close(None),
        Message::Close(frame) => tungstenite::Message::Close(Some(RawCloseFrame {
            code: frame.code.as_u16().into(),
            reason: utf8(frame.reason)?,
        })),
        Message::Continuation(_) => {
            return Err(TransportError::Unsupported("sending continuation frames"));
        }
    };
    Ok(raw)
}

fn utf8(data: Bytes) -> std::result::Result<Utf8Bytes, TransportError> {
    Utf8Bytes::try_from(data).map_err(|_e| TransportError::Unsupported("text that is not valid UTF-8"))
}

fn from_raw(message: tungstenite::Message) -> Option<Message> {
    let message = match message {
        tungstenite::Message::Text(text) => Message::Text(Bytes::from(text)),
        tungstenite::Message::Binary(data) => Message::Binary(data),
        tungstenite::Message::Ping(data) => Message::Ping(data),
        tungstenite::Message::Pong(data) => Message::Pong(data),
        tungstenite::Message::Close(None) => Message::close(CloseCode::NoStatusReceived, Bytes::new()),
        tungstenite::Message::Close(Some(frame)) => Message::close(
            CloseCode::from(u16::from(frame.code)),
            Bytes::from(frame.reason),
        ),
        tungstenite::Message::Frame(_) => return None,
    };
    Some(message)
}
