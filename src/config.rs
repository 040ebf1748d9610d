use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, StreamError, KILOBYTE, MEGABYTE};

const DEFAULT_USER_AGENT: &str =
    concat!("mjpeg-stream/", env!("CARGO_PKG_VERSION"));

/// Tunable settings of a stream connection.
///
/// - `chunk_size` is the largest number of bytes pulled from the network in
///   one read. Smaller chunks lower latency, larger chunks lower overhead.
/// - `max_frame_size` bounds the frame buffer. A frame that does not fit is
///   reported as an overflow error instead of being truncated.
/// - `read_timeout_ms` bounds every single read, so a silent camera is
///   detected and `stop` never waits on the network for longer than that.
///
/// Use one of the presets (`balanced`, `low_latency`, `high_resolution`) or
/// construct/override as needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Size in bytes of a single network read.
    pub chunk_size: usize,
    /// Capacity in bytes of the frame buffer.
    pub max_frame_size: usize,
    /// Upper bound for establishing the HTTP connection.
    pub connect_timeout_ms: u64,
    /// Upper bound for a single read of the response body.
    pub read_timeout_ms: u64,
    /// Number of undelivered frame events kept for the consumer. While that
    /// many are pending, further frame events are skipped; the frame itself
    /// is still published.
    pub event_capacity: usize,
    /// Value of the `User-Agent` request header.
    pub user_agent: String,
}

impl Default for StreamConfig {
    /// Returns the balanced preset:
    /// - 4 KiB chunks
    /// - 1 MiB frames
    /// - 10 second connect and read timeouts
    fn default() -> Self {
        Self {
            chunk_size: 4 * KILOBYTE,
            max_frame_size: MEGABYTE,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
            event_capacity: 16,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl StreamConfig {
    /// Alias of `Default::default()`.
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Preset for small frames on a fast local network:
    /// - 1 KiB chunks
    /// - 2 second read timeout
    pub fn low_latency() -> Self {
        Self {
            chunk_size: KILOBYTE,
            read_timeout_ms: 2_000,
            ..Self::default()
        }
    }

    /// Preset for high resolution cameras:
    /// - 16 KiB chunks
    /// - 8 MiB frames
    pub fn high_resolution() -> Self {
        Self {
            chunk_size: 16 * KILOBYTE,
            max_frame_size: 8 * MEGABYTE,
            ..Self::default()
        }
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the chunk size in kilobytes.
    pub fn with_chunk_kib(mut self, kib: usize) -> Self {
        self.chunk_size = kib * KILOBYTE;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Set the read timeout, rounded up to whole milliseconds.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.read_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StreamError::config("chunk size must be positive"));
        }
        if self.max_frame_size == 0 {
            return Err(StreamError::config(
                "maximum frame size must be positive",
            ));
        }
        if self.event_capacity == 0 {
            return Err(StreamError::config(
                "event capacity must be positive",
            ));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(StreamError::config("timeouts must be positive"));
        }
        Ok(())
    }
}

/// Basic authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// True when there is nothing to authenticate with.
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Address of a camera stream plus optional credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub url: Url,
    pub credentials: Option<Credentials>,
}

impl StreamEndpoint {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
        }
    }

    pub fn parse(address: &str) -> Result<Self> {
        let url = Url::parse(address)?;
        match url.scheme() {
            "http" | "https" => Ok(Self::new(url)),
            other => Err(StreamError::config(format!(
                "unsupported scheme `{other}`"
            ))),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Credentials worth sending, i.e. present and not entirely empty.
    pub fn auth(&self) -> Option<&Credentials> {
        self.credentials
            .as_ref()
            .filter(|credentials| !credentials.is_empty())
    }

    /// Short label used in log messages.
    pub fn label(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => self.url.to_string(),
        }
    }
}
