//! Messages exchanged over a session, tagged by WebSocket opcode.

use bytes::Bytes;

/// Opcode identifying the semantic kind of a [`Message`] (RFC 6455 §5.2).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    /// Continuation of a fragmented message (0x0)
    Continuation,
    /// UTF-8 text (0x1)
    Text,
    /// Raw binary data (0x2)
    Binary,
    /// Connection close (0x8)
    Close,
    /// Keepalive request (0x9)
    Ping,
    /// Keepalive reply (0xA)
    Pong,
}

impl Opcode {
    /// Decodes the 4-bit wire value. Reserved values yield `None`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Control opcodes carry meaning even with an empty payload.
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// Close status code (RFC 6455 §7.4).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloseCode {
    /// 1000: the purpose of the connection has been fulfilled
    #[default]
    Normal,
    /// 1001: the endpoint is going away (server shutdown, page navigation)
    GoingAway,
    /// 1002: protocol error
    ProtocolError,
    /// 1003: received a data type the endpoint cannot accept
    UnsupportedData,
    /// 1005: close frame carried no status code. Never sent on the wire.
    NoStatusReceived,
    /// 1006: connection dropped without a close frame. Never sent on the wire.
    Abnormal,
    /// 1007: message payload inconsistent with its type
    InvalidPayload,
    /// 1008: message violates the endpoint's policy
    PolicyViolation,
    /// 1009: message too big to process
    MessageTooBig,
    /// 1010: client expected the server to negotiate an extension
    MandatoryExtension,
    /// 1011: server hit an unexpected condition
    InternalError,
    /// Any other registered or application code (1012-1014, 3000-4999, ...)
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::UnsupportedData,
            1005 => Self::NoStatusReceived,
            1006 => Self::Abnormal,
            1007 => Self::InvalidPayload,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MandatoryExtension,
            1011 => Self::InternalError,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
            Self::UnsupportedData => 1003,
            Self::NoStatusReceived => 1005,
            Self::Abnormal => 1006,
            Self::InvalidPayload => 1007,
            Self::PolicyViolation => 1008,
            Self::MessageTooBig => 1009,
            Self::MandatoryExtension => 1010,
            Self::InternalError => 1011,
            Self::Other(code) => code,
        }
    }

    /// Codes an endpoint must not place in a close frame (1004-1006, 1015).
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

/// Status code and free-form reason carried by a close message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: Bytes,
}

impl CloseFrame {
    #[must_use]
    pub fn new<B: Into<Bytes>>(code: CloseCode, reason: B) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The reason payload, or `None` when the peer sent none.
    #[must_use]
    pub fn reason(&self) -> Option<&Bytes> {
        (!self.reason.is_empty()).then_some(&self.reason)
    }
}

/// A unit of content received from or handed to a transport.
///
/// Text payloads are kept as raw bytes: they are only decoded as UTF-8 when
/// dispatched to the event sink.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(Bytes),
    Binary(Bytes),
    Continuation(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(CloseFrame),
}

impl Message {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text(Bytes::from(text.into()))
    }

    pub fn binary<B: Into<Bytes>>(data: B) -> Self {
        Self::Binary(data.into())
    }

    pub fn ping<B: Into<Bytes>>(data: B) -> Self {
        Self::Ping(data.into())
    }

    pub fn pong<B: Into<Bytes>>(data: B) -> Self {
        Self::Pong(data.into())
    }

    pub fn close<B: Into<Bytes>>(code: CloseCode, reason: B) -> Self {
        Self::Close(CloseFrame::new(code, reason))
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Text(_) => Opcode::Text,
            Self::Binary(_) => Opcode::Binary,
            Self::Continuation(_) => Opcode::Continuation,
            Self::Ping(_) => Opcode::Ping,
            Self::Pong(_) => Opcode::Pong,
            Self::Close(_) => Opcode::Close,
        }
    }

    /// Raw payload bytes; for a close message this is the reason.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        match self {
            Self::Text(data)
            | Self::Binary(data)
            | Self::Continuation(data)
            | Self::Ping(data)
            | Self::Pong(data) => data,
            Self::Close(frame) => &frame.reason,
        }
    }
}
