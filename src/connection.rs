use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::{Route, route};
use crate::error::{Error, WsError};
use crate::message::{CloseCode, Message};
use crate::ping::PingScheduler;
use crate::sink::EventSink;
use crate::state::ConnectionState;
use crate::transport::tungstenite::TungsteniteTransport;
use crate::transport::{ReceiveFuture, Transport, TransportError};
use crate::Result;

/// Requests from the [`Connection`] handle to its driver task.
#[derive(Debug)]
enum Command {
    SetSink(Option<Weak<dyn EventSink>>),
    Send(Message),
    Ping,
    StartPinging(Duration),
    StopPinging,
    Disconnect(CloseCode),
}

/// What an outbound message was sent for, so its completion can be handled.
#[derive(Debug, Clone, Copy)]
enum Outbound {
    Data,
    Ping,
}

type Completion = BoxFuture<'static, (Outbound, std::result::Result<(), TransportError>)>;

/// A single client WebSocket session.
///
/// `Connection` drives one transport through its lifecycle and reports everything that happens
/// to a registered [`EventSink`]. Operations only queue work: outcomes, including failures of
/// the underlying transport, arrive as events.
///
/// Calling [`Connection::connect`] spawns a driver task on the configured runtime. That task is
/// the only place where transport callbacks are handled and sink methods are called, so events
/// are delivered one at a time and in the order the transport produced them. Dropping the
/// `Connection` stops the driver and cancels the transport without emitting further events.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
///
/// use websocket_session::{ChannelSink, CloseCode, Config, Connection, Event};
///
/// # async fn run() -> websocket_session::Result<()> {
/// let (sink, mut events) = ChannelSink::channel();
/// let mut connection = Connection::new("wss://echo.example.com/socket", Config::default())?;
/// connection.set_event_sink(&sink);
/// connection.connect()?;
///
/// while let Some(event) = events.recv().await {
///     match event {
///         Event::Connect => {
///             connection.send_text("hello")?;
///             connection.start_pinging(Duration::from_secs(15))?;
///         }
///         Event::Text(text) => {
///             println!("{text}");
///             connection.disconnect(CloseCode::Normal);
///         }
///         Event::Disconnect { .. } | Event::Error { .. } => break,
///         _ => {}
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    id: Uuid,
    config: Config,
    /// Present until [`Connection::connect`] hands it to the driver
    transport: Option<Box<dyn Transport>>,
    sink: Option<Weak<dyn EventSink>>,
    /// Present while the driver may still be running
    commands: Option<mpsc::UnboundedSender<Command>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    disconnected: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &*self.state_rx.borrow())
            .field("started", &self.transport.is_none())
            .field("disconnected", &self.disconnected)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection to `url` backed by a [`TungsteniteTransport`].
    ///
    /// `ws://` URLs connect over plain TCP and `wss://` URLs over TLS. Nothing happens on the
    /// network until [`Connection::connect`] is called.
    pub fn new(url: &str, config: Config) -> Result<Self> {
        let transport = TungsteniteTransport::new(url, &config)?;
        Ok(Self::with_transport(transport, config))
    }

    /// Create a connection driving a custom [`Transport`].
    pub fn with_transport<T: Transport>(transport: T, config: Config) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Setup);

        Self {
            id: Uuid::new_v4(),
            config,
            transport: Some(Box::new(transport)),
            sink: None,
            commands: None,
            state_tx,
            state_rx,
            disconnected: false,
        }
    }

    /// Identifier used to tell connections apart in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The last state reported by the transport.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to transport state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Register the sink that receives this connection's events, replacing any previous one.
    ///
    /// Only a weak reference is kept: events are discarded once the sink is dropped.
    pub fn set_event_sink<S: EventSink + 'static>(&mut self, sink: &Arc<S>) {
        let weak = Arc::downgrade(sink);
        let weak: Weak<dyn EventSink> = weak;
        self.replace_sink(Some(weak));
    }

    /// Stop delivering events.
    pub fn clear_event_sink(&mut self) {
        self.replace_sink(None);
    }

    fn replace_sink(&mut self, sink: Option<Weak<dyn EventSink>>) {
        self.sink.clone_from(&sink);
        if let Some(commands) = &self.commands {
            _ = commands.send(Command::SetSink(sink));
        }
    }

    /// Start the transport and begin delivering events.
    ///
    /// Must be called from within a Tokio runtime unless [`Config`] names one.
    pub fn connect(&mut self) -> Result<()> {
        if self.disconnected {
            return Err(WsError::ConnectionClosed.into());
        }
        if self.config.ping_interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::validation("ping interval must be non-zero"));
        }
        let runtime = match &self.config.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current()
                .map_err(|_e| Error::validation("connect requires a Tokio runtime"))?,
        };
        let Some(mut transport) = self.transport.take() else {
            return Err(Error::validation("connection has already been started"));
        };

        let (states_tx, states_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        transport.start(&runtime, states_tx);

        let driver = Driver {
            id: self.id,
            runtime: runtime.clone(),
            ping_interval: self.config.ping_interval,
            transport,
            sink: self.sink.clone(),
            states: states_rx,
            commands: commands_rx,
            state_tx: self.state_tx.clone(),
            receive: None,
            listening: false,
            sends: FuturesUnordered::new(),
            pings: PingScheduler::new(self.config.pong_timeout),
            torn_down: false,
        };
        runtime.spawn(driver.run());

        self.commands = Some(commands_tx);
        Ok(())
    }

    /// Send a text message.
    pub fn send_text<S: Into<String>>(&self, text: S) -> Result<()> {
        self.command(Command::Send(Message::text(text)))
    }

    /// Send a binary message.
    pub fn send_binary<B: Into<Bytes>>(&self, data: B) -> Result<()> {
        self.command(Command::Send(Message::binary(data)))
    }

    /// Send an empty PING. The matching PONG is reported through [`EventSink::on_pong`].
    pub fn ping(&self) -> Result<()> {
        self.command(Command::Ping)
    }

    /// Send a PING every `interval`, the first one `interval` from now.
    ///
    /// Replaces any schedule already running.
    pub fn start_pinging(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::validation("ping interval must be non-zero"));
        }
        self.command(Command::StartPinging(interval))
    }

    /// Stop periodic PINGs. PINGs already sent are still matched with their PONGs.
    pub fn stop_pinging(&self) -> Result<()> {
        self.command(Command::StopPinging)
    }

    /// Close the connection with `code`.
    ///
    /// A close message is sent, then [`EventSink::on_disconnect`] is called with `code` whether
    /// or not that send succeeds, and the session is torn down. Calling this again, or after
    /// the connection already failed, does nothing.
    ///
    /// The close is handled on the driver task, after any transport state reported before it.
    /// If the transport failed just before this call, the sink sees that failure through
    /// [`EventSink::on_error`] and `on_disconnect` is never called.
    pub fn disconnect(&mut self, code: CloseCode) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;

        match self.commands.take() {
            Some(commands) => {
                if commands.send(Command::Disconnect(code)).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(connection_id = %self.id, "Disconnect after teardown ignored");
                }
            }
            None => {
                // Never started: nothing to close, but the owner still hears about it.
                self.transport = None;
                if let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) {
                    sink.on_disconnect(code, None);
                }
            }
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        if self.disconnected {
            return Err(WsError::ConnectionClosed.into());
        }
        let Some(commands) = &self.commands else {
            return Err(WsError::NotConnected.into());
        };
        commands
            .send(command)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }
}

/// One step of work for the driver.
enum Step {
    State(ConnectionState),
    Command(Command),
    Detached,
    Received(std::result::Result<Option<Message>, TransportError>),
    Sent(Outbound, std::result::Result<(), TransportError>),
    Tick,
    PongTimeout,
}

/// The serialized execution context of a [`Connection`].
///
/// Owns the transport once started. Each loop iteration waits for exactly one step and handles
/// it to completion before looking at the next.
struct Driver {
    id: Uuid,
    runtime: Handle,
    ping_interval: Option<Duration>,
    transport: Box<dyn Transport>,
    sink: Option<Weak<dyn EventSink>>,
    states: mpsc::UnboundedReceiver<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    /// The pending read of the listen loop
    receive: Option<ReceiveFuture>,
    listening: bool,
    sends: FuturesUnordered<Completion>,
    pings: PingScheduler,
    torn_down: bool,
}

impl Driver {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "websocket_session", skip_all, fields(connection_id = %self.id))
    )]
    async fn run(mut self) {
        while !self.torn_down {
            let pong_deadline = self.pings.pong_deadline();

            // States first so that transport notifications are never overtaken by the messages
            // they enabled.
            let step = tokio::select! {
                biased;

                Some(state) = self.states.recv() => Step::State(state),
                command = self.commands.recv() => command.map_or(Step::Detached, Step::Command),
                result = next_receive(&mut self.receive) => Step::Received(result),
                Some((outbound, result)) = self.sends.next() => Step::Sent(outbound, result),
                () = self.pings.tick() => Step::Tick,
                () = deadline(pong_deadline) => Step::PongTimeout,
            };

            self.handle(step);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Connection driver stopped");
    }

    fn handle(&mut self, step: Step) {
        match step {
            Step::State(state) => self.on_state(state),
            Step::Command(command) => self.on_command(command),
            Step::Detached => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Connection handle dropped, tearing down");
                self.teardown();
            }
            Step::Received(result) => self.on_received(result),
            Step::Sent(outbound, result) => self.on_sent(outbound, result),
            Step::Tick => self.ping(),
            Step::PongTimeout => {
                let timeout = self.pings.pong_timeout().unwrap_or_default();
                #[cfg(feature = "tracing")]
                tracing::warn!(?timeout, "Heartbeat timeout: no PONG received");
                self.fail(WsError::PongTimeout { timeout }.into());
            }
        }
    }

    fn on_state(&mut self, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(%state, "Transport state changed");

        self.state_tx.send_replace(state.clone());

        match state {
            ConnectionState::Setup => {}
            ConnectionState::Preparing => self.emit(|sink| sink.on_prepare()),
            ConnectionState::Ready => {
                if self.listening {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Transport reported ready twice, ignoring");
                    return;
                }
                self.listen();
                self.emit(|sink| sink.on_connect());
                if let Some(interval) = self.ping_interval {
                    self.pings.start(&self.runtime, interval);
                }
            }
            ConnectionState::Waiting(e) | ConnectionState::Failed(e) => self.fail(e.into()),
            ConnectionState::Cancelled => {
                self.emit(|sink| sink.on_cancel());
                // The transport is already gone; only our own side needs stopping.
                self.stop_listening();
                self.pings.clear();
                self.torn_down = true;
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SetSink(sink) => self.sink = sink,
            Command::Send(message) => self.enqueue(Outbound::Data, message),
            Command::Ping => self.ping(),
            Command::StartPinging(interval) => self.pings.start(&self.runtime, interval),
            Command::StopPinging => self.pings.stop(),
            Command::Disconnect(code) => {
                // Queued ahead of the cancel in `teardown`; its outcome does not matter.
                drop(self.transport.send(Message::close(code, Bytes::new())));
                self.close(code, None);
            }
        }
    }

    /// Start the listen loop. Only the first ready transition gets here.
    fn listen(&mut self) {
        self.listening = true;
        self.receive = Some(self.transport.receive());
    }

    fn stop_listening(&mut self) {
        self.listening = false;
        self.receive = None;
    }

    fn on_received(&mut self, result: std::result::Result<Option<Message>, TransportError>) {
        self.receive = None;

        match result {
            Err(e) => {
                self.fail(e.into());
                return;
            }
            Ok(None) => {}
            Ok(Some(message)) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(opcode = %message.opcode(), len = message.payload().len(), "Received message");

                match route(message) {
                    Route::Skip => {}
                    Route::Text(text) => self.emit(|sink| sink.on_text_message(text)),
                    Route::Binary(data) => self.emit(|sink| sink.on_binary_message(data)),
                    Route::Pong => match self.pings.resolve() {
                        Some(ping_id) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(ping_id, "PONG matched");
                            #[cfg(not(feature = "tracing"))]
                            let _ = ping_id;
                            self.emit(|sink| sink.on_pong());
                        }
                        None => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!("Ignoring unsolicited PONG");
                        }
                    },
                    Route::Close(frame) => {
                        let reason = frame.reason().cloned();
                        self.close(frame.code, reason);
                    }
                }
            }
        }

        if !self.torn_down && self.listening {
            self.receive = Some(self.transport.receive());
        }
    }

    fn ping(&mut self) {
        let ping_id = self.pings.register();
        #[cfg(feature = "tracing")]
        tracing::trace!(ping_id, "Sending PING");
        #[cfg(not(feature = "tracing"))]
        let _ = ping_id;
        self.enqueue(Outbound::Ping, Message::ping(Bytes::new()));
    }

    fn enqueue(&mut self, outbound: Outbound, message: Message) {
        let completion = self.transport.send(message);
        self.sends
            .push(Box::pin(async move { (outbound, completion.await) }));
    }

    fn on_sent(&mut self, outbound: Outbound, result: std::result::Result<(), TransportError>) {
        if let Err(e) = result {
            #[cfg(feature = "tracing")]
            tracing::warn!(?outbound, error = %e, "Unable to send message");
            #[cfg(not(feature = "tracing"))]
            let _ = outbound;
            self.fail(e.into());
        }
    }

    /// Close handler: report the close, then tear down.
    fn close(&mut self, code: CloseCode, reason: Option<Bytes>) {
        self.emit(|sink| sink.on_disconnect(code, reason));
        self.teardown();
    }

    /// Failure handler: report the error once, then tear down.
    fn fail(&mut self, error: Error) {
        self.emit(|sink| sink.on_error(&error));
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.stop_listening();
        self.pings.clear();
        self.transport.cancel();
        self.torn_down = true;
    }

    fn emit<F: FnOnce(&dyn EventSink)>(&self, notify: F) {
        if self.torn_down {
            return;
        }
        match self.sink.as_ref().and_then(Weak::upgrade) {
            Some(sink) => notify(sink.as_ref()),
            None => {
                #[cfg(feature = "tracing")]
                tracing::trace!("No event sink registered, dropping event");
            }
        }
    }
}

/// Wait for the pending read, or forever if there is none.
async fn next_receive(
    pending: &mut Option<ReceiveFuture>,
) -> std::result::Result<Option<Message>, TransportError> {
    match pending {
        Some(receive) => receive.await,
        None => std::future::pending().await,
    }
}

fn deadline(at: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match at {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}
