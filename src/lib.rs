#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod message;
pub(crate) mod ping;
pub mod sink;
pub mod state;
pub mod transport;

pub use config::{Config, ReconnectConfig};
pub use connection::Connection;
pub use error::{Error, Kind, WsError};
pub use message::{CloseCode, CloseFrame, Message, Opcode};
#[cfg(feature = "tracing")]
pub use sink::TracingSink;
pub use sink::{ChannelSink, Event, EventSink};
pub use state::ConnectionState;
pub use transport::tungstenite::TungsteniteTransport;
pub use transport::{Transport, TransportError};

pub type Result<T> = std::result::Result<T, Error>;
