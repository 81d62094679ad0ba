//! Sends a few messages to an echo server and logs what comes back.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,websocket_session=debug cargo run --example echo --features tracing -- wss://echo.websocket.org
//! ```

use std::sync::Arc;

use tracing::{info, warn};
use websocket_session::{
    ChannelSink, CloseCode, Config, Connection, Event, EventSink, TracingSink,
};

/// Logs every event, then forwards it to the demo's own loop.
struct Forward {
    log: TracingSink,
    channel: Arc<ChannelSink>,
}

impl EventSink for Forward {
    fn on_prepare(&self) {
        self.log.on_prepare();
        self.channel.on_prepare();
    }

    fn on_connect(&self) {
        self.log.on_connect();
        self.channel.on_connect();
    }

    fn on_disconnect(&self, code: CloseCode, reason: Option<bytes::Bytes>) {
        self.log.on_disconnect(code, reason.clone());
        self.channel.on_disconnect(code, reason);
    }

    fn on_error(&self, error: &websocket_session::Error) {
        self.log.on_error(error);
        self.channel.on_error(error);
    }

    fn on_text_message(&self, text: String) {
        self.log.on_text_message(text.clone());
        self.channel.on_text_message(text);
    }

    fn on_binary_message(&self, data: bytes::Bytes) {
        self.log.on_binary_message(data.clone());
        self.channel.on_binary_message(data);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org".to_owned());

    let (channel, mut events) = ChannelSink::channel();
    let sink = Arc::new(Forward {
        log: TracingSink::default(),
        channel,
    });

    let mut connection = Connection::new(&url, Config::default())?;
    connection.set_event_sink(&sink);
    connection.connect()?;
    info!(connection_id = %connection.id(), %url, "connecting");

    let messages = ["hello", "from", "websocket-session"];
    let mut echoed = 0;

    while let Some(event) = events.recv().await {
        match event {
            Event::Connect => {
                for message in messages {
                    connection.send_text(message)?;
                }
                connection.send_binary(vec![0xde_u8, 0xad, 0xbe, 0xef])?;
            }
            Event::Text(text) if messages.contains(&text.as_str()) => {
                echoed += 1;
                if echoed == messages.len() {
                    connection.disconnect(CloseCode::Normal);
                }
            }
            Event::Disconnect { .. } => break,
            Event::Error { message, .. } => {
                warn!(%message, "giving up");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
