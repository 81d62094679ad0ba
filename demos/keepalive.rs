//! Holds a connection open with periodic PINGs and fails it when the server stops answering.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=debug cargo run --example keepalive --features tracing -- wss://echo.websocket.org
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use websocket_session::{
    ChannelSink, CloseCode, Config, Connection, Event, ReconnectConfig, TracingSink,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org".to_owned());

    let config = Config::builder()
        .ping_interval(Duration::from_secs(5))
        .pong_timeout(Duration::from_secs(3))
        .reconnect(ReconnectConfig::with_max_attempts(3))
        .build();

    // Events are logged by one connection and counted through another sink type entirely.
    let logger = Arc::new(TracingSink::default());
    let mut logged = Connection::new(&url, config.clone())?;
    logged.set_event_sink(&logger);
    logged.connect()?;

    let (sink, mut events) = ChannelSink::channel();
    let mut counted = Connection::new(&url, config)?;
    counted.set_event_sink(&sink);
    counted.connect()?;

    let mut pongs = 0_u32;
    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = events.recv() => match event {
                Some(Event::Pong) => {
                    pongs += 1;
                    info!(pongs, "still alive");
                }
                Some(Event::Error { message, .. }) => {
                    info!(%message, "keepalive failed");
                    break;
                }
                Some(Event::Disconnect { .. }) | None => break,
                Some(_) => {}
            }
        }
    }

    counted.disconnect(CloseCode::Normal);
    logged.disconnect(CloseCode::GoingAway);
    info!(pongs, "done");

    Ok(())
}
