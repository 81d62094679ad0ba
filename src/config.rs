use std::collections::BTreeMap;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;
use tokio::runtime::Handle;

const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for a [`Connection`](crate::Connection).
///
/// ```rust
/// use std::time::Duration;
///
/// use websocket_session::Config;
///
/// let config = Config::builder()
///     .ping_interval(Duration::from_secs(10))
///     .pong_timeout(Duration::from_secs(5))
///     .headers([("Authorization".to_owned(), "Bearer token".to_owned())].into())
///     .build();
/// assert_eq!(config.ping_interval(), Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Whether the transport answers PINGs from the peer by itself. Defaults to `true`.
    #[builder(default = true)]
    pub(crate) auto_reply_ping: bool,
    /// Extra headers sent with the opening handshake.
    #[builder(default)]
    pub(crate) headers: BTreeMap<String, String>,
    /// How long the opening handshake may take, per attempt. The default is thirty (30) seconds.
    #[builder(default = DEFAULT_CONNECT_TIMEOUT_DURATION)]
    pub(crate) connect_timeout: Duration,
    /// Retry policy for the initial connect. No retries when absent.
    pub(crate) reconnect: Option<ReconnectConfig>,
    /// Start pinging at this interval as soon as the connection is ready.
    pub(crate) ping_interval: Option<Duration>,
    /// Fail the connection if a PING is not answered within this duration.
    pub(crate) pong_timeout: Option<Duration>,
    /// Runtime on which the transport and the session run. Defaults to the runtime that calls
    /// [`Connection::connect`](crate::Connection::connect).
    pub(crate) runtime: Option<Handle>,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    #[must_use]
    pub fn auto_reply_ping(&self) -> bool {
        self.auto_reply_ping
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn reconnect(&self) -> Option<&ReconnectConfig> {
        self.reconnect.as_ref()
    }

    #[must_use]
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval
    }

    #[must_use]
    pub fn pong_timeout(&self) -> Option<Duration> {
        self.pong_timeout
    }
}

/// Configuration for retrying the initial connect.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of retries after the first attempt.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for the first retry
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl ReconnectConfig {
    /// A policy that gives up after `max_attempts` retries.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // Attempts are bounded by `max_attempts` instead
            .build()
    }
}
