//! Configuration types for docrelay
//!
//! Configuration is externally supplied (typically deserialized from the
//! host application's settings) and owned by the caller, not by the
//! executor or the bridge. Fields are organized into sub-configs:
//! - [`HttpConfig`] — request executor: base URL, headers, timeouts, retry
//! - [`RealtimeConfig`] — realtime bridge: endpoint, reconnect, heartbeat

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

/// Main configuration for the communication core
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Request executor settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Realtime bridge settings
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Request executor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL that request paths are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Headers applied to every request (caller overrides win per request)
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    /// Default per-call timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// Default timeout for multipart uploads (default: 120 seconds)
    ///
    /// Uploads move more bytes than ordinary calls, so they get their own,
    /// longer default. Per-request overrides still apply.
    #[serde(default = "default_upload_timeout", with = "duration_ms_serde")]
    pub upload_timeout: Duration,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_headers: HashMap::new(),
            timeout: default_timeout(),
            upload_timeout: default_upload_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Retry policy for transient request failures
///
/// The delay before retry `k` (counted from 0) is
/// `base_delay * 2^k`, capped at `max_delay`. Backoff is applied only
/// between attempts, never after the final one. `max_retries == 0` means
/// attempt once with no retry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (default: 1 second)
    #[serde(default = "default_base_delay", with = "duration_ms_serde")]
    pub base_delay: Duration,

    /// Cap on any single backoff delay (default: 30 seconds)
    #[serde(default = "default_max_backoff", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: false)
    ///
    /// Off by default so backoff timing stays deterministic; enable when
    /// many clients share one backend and synchronized retries matter.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

/// Realtime bridge configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket endpoint (`ws://…` or `wss://…`); the auth token is
    /// appended as a `token` query parameter at connect time
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Fixed delay between reconnect attempts (default: 3 seconds)
    #[serde(default = "default_reconnect_delay", with = "duration_ms_serde")]
    pub reconnect_delay: Duration,

    /// Consecutive-failure cap after which the bridge stops reconnecting
    /// and emits a terminal `error` event (default: 5)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Interval between outbound heartbeat frames (default: 30 seconds)
    #[serde(default = "default_heartbeat_interval", with = "duration_ms_serde")]
    pub heartbeat_interval: Duration,

    /// Timeout on the WebSocket open handshake (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_ms_serde")]
    pub connect_timeout: Duration,

    /// Capacity of the outbound send queue (default: 256)
    ///
    /// `send()` returns `false` instead of blocking when the queue is full.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            reconnect_delay: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval: default_heartbeat_interval(),
            connect_timeout: default_connect_timeout(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_endpoint() -> String {
    "ws://localhost:8080/realtime".to_string()
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_send_queue_capacity() -> usize {
    256
}

// Duration serialization helper (milliseconds; reconnect and backoff delays
// need sub-second precision)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
