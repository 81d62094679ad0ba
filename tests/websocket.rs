#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as RawCloseCode;
use tokio_tungstenite::tungstenite::Message as RawMessage;
use websocket_session::{ChannelSink, CloseCode, Config, Connection, Event, Kind, ReconnectConfig};

use crate::common::next_event;

/// Text that makes the server close the connection with 4000 "bye".
const CLOSE_ME: &str = "close me";

/// Echo server on a random local port.
struct EchoServer {
    addr: SocketAddr,
    /// Handshake headers of every accepted client
    handshakes: mpsc::UnboundedReceiver<HeaderMap>,
    /// Close frames received from clients
    closes: mpsc::UnboundedReceiver<Option<CloseFrame>>,
}

impl EchoServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (handshake_tx, handshakes) = mpsc::unbounded_channel();
        let (close_tx, closes) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let handshake_tx = handshake_tx.clone();
                let record_headers = move |request: &Request, response: Response| {
                    _ = handshake_tx.send(request.headers().clone());
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, record_headers).await
                else {
                    continue;
                };

                let close_tx = close_tx.clone();
                tokio::spawn(async move {
                    while let Some(Ok(message)) = ws.next().await {
                        match message {
                            RawMessage::Text(text) if text.as_str() == CLOSE_ME => {
                                let frame = CloseFrame {
                                    code: RawCloseCode::from(4000),
                                    reason: "bye".into(),
                                };
                                if ws.send(RawMessage::Close(Some(frame))).await.is_err() {
                                    break;
                                }
                            }
                            RawMessage::Text(_) | RawMessage::Binary(_) => {
                                if ws.send(message).await.is_err() {
                                    break;
                                }
                            }
                            RawMessage::Close(frame) => {
                                _ = close_tx.send(frame);
                                break;
                            }
                            // Pings are answered by tungstenite
                            _ => {}
                        }
                    }
                });
            }
        });

        Self {
            addr,
            handshakes,
            closes,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

type Events = mpsc::UnboundedReceiver<Event>;

/// Connect and wait for the transport to start preparing.
async fn connect(url: &str, config: Config) -> (Connection, Events, Arc<ChannelSink>) {
    let (sink, mut events) = ChannelSink::channel();
    let mut connection = Connection::new(url, config).unwrap();
    connection.set_event_sink(&sink);
    connection.connect().unwrap();

    assert_eq!(next_event(&mut events).await, Event::Prepare);

    (connection, events, sink)
}

#[tokio::test]
async fn echoes_text_and_binary() {
    let server = EchoServer::start().await;
    let (connection, mut events, _sink) = connect(&server.url(), Config::default()).await;
    assert_eq!(next_event(&mut events).await, Event::Connect);

    connection.send_text("hello").unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Event::Text("hello".to_owned())
    );

    let payload = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
    connection.send_binary(payload.clone()).unwrap();
    assert_eq!(next_event(&mut events).await, Event::Binary(payload));
}

#[tokio::test]
async fn sends_before_ready_are_flushed_in_order() {
    let server = EchoServer::start().await;
    let (connection, mut events, _sink) = connect(&server.url(), Config::default()).await;

    connection.send_text("first").unwrap();
    connection.send_text("second").unwrap();

    assert_eq!(next_event(&mut events).await, Event::Connect);
    assert_eq!(
        next_event(&mut events).await,
        Event::Text("first".to_owned())
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Text("second".to_owned())
    );
}

#[tokio::test]
async fn ping_is_answered_by_the_server() {
    let server = EchoServer::start().await;
    let (connection, mut events, _sink) = connect(&server.url(), Config::default()).await;
    assert_eq!(next_event(&mut events).await, Event::Connect);

    connection.ping().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Pong);
}

#[tokio::test]
async fn keepalive_pings_are_answered() {
    let server = EchoServer::start().await;
    let config = Config::builder()
        .ping_interval(Duration::from_millis(50))
        .pong_timeout(Duration::from_secs(5))
        .build();
    let (_connection, mut events, _sink) = connect(&server.url(), config).await;
    assert_eq!(next_event(&mut events).await, Event::Connect);

    assert_eq!(next_event(&mut events).await, Event::Pong);
    assert_eq!(next_event(&mut events).await, Event::Pong);
}

#[tokio::test]
async fn server_close_reports_code_and_reason() {
    let server = EchoServer::start().await;
    let (connection, mut events, _sink) = connect(&server.url(), Config::default()).await;
    assert_eq!(next_event(&mut events).await, Event::Connect);

    connection.send_text(CLOSE_ME).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Event::Disconnect {
            code: CloseCode::Other(4000),
            reason: Some(Bytes::from_static(b"bye")),
        }
    );
}

#[tokio::test]
async fn client_disconnect_reaches_the_server() {
    let mut server = EchoServer::start().await;
    let (mut connection, mut events, _sink) = connect(&server.url(), Config::default()).await;
    assert_eq!(next_event(&mut events).await, Event::Connect);

    connection.disconnect(CloseCode::GoingAway);

    assert_eq!(
        next_event(&mut events).await,
        Event::Disconnect {
            code: CloseCode::GoingAway,
            reason: None,
        }
    );

    let frame = tokio::time::timeout(common::PATIENCE, server.closes.recv())
        .await
        .unwrap()
        .unwrap()
        .expect("close frame carries a status");
    assert_eq!(u16::from(frame.code), 1001);
}

#[tokio::test]
async fn configured_headers_are_sent() {
    let mut server = EchoServer::start().await;
    let headers = BTreeMap::from([("x-session-token".to_owned(), "abc123".to_owned())]);
    let config = Config::builder().headers(headers).build();

    let (_connection, mut events, _sink) = connect(&server.url(), config).await;
    assert_eq!(next_event(&mut events).await, Event::Connect);

    let handshake = server.handshakes.recv().await.unwrap();
    assert_eq!(
        handshake.get("x-session-token").map(|v| v.as_bytes()),
        Some(b"abc123".as_slice())
    );
}

#[tokio::test]
async fn unreachable_server_reports_an_error() {
    // Reserve a port, then free it so nothing is listening there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (_connection, mut events, _sink) =
        connect(&format!("ws://{addr}"), Config::default()).await;

    let Event::Error { kind, .. } = next_event(&mut events).await else {
        panic!("expected an error event");
    };
    assert_eq!(kind, Kind::Transport);
}

#[tokio::test]
async fn bounded_retries_give_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut reconnect = ReconnectConfig::with_max_attempts(2);
    reconnect.initial_backoff = Duration::from_millis(10);
    reconnect.max_backoff = Duration::from_millis(20);
    let config = Config::builder().reconnect(reconnect).build();
    let (_connection, mut events, _sink) = connect(&format!("ws://{addr}"), config).await;

    assert!(matches!(
        next_event(&mut events).await,
        Event::Error {
            kind: Kind::Transport,
            ..
        }
    ));
}

#[test]
fn rejects_non_websocket_urls() {
    let error = Connection::new("http://localhost:8080", Config::default()).unwrap_err();
    assert_eq!(error.kind(), Kind::Validation);
}
