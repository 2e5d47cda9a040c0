//! Error types for docrelay
//!
//! This module provides the error taxonomy shared by the request executor
//! and the realtime bridge:
//! - Transport-level failures (network, DNS, TLS) and HTTP status failures
//! - Timeout and caller-initiated cancellation, kept distinct because only
//!   one of them is retryable
//! - Realtime handshake and wire-protocol failures
//!
//! The executor never panics or throws across its public boundary; every
//! outcome is a typed [`Result`]. The bridge surfaces fatal conditions as
//! emitted `error` events instead, since its operations are fire-and-forget
//! once `connect()` resolves.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for docrelay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docrelay
#[derive(Debug, Error)]
pub enum Error {
    /// The per-call timeout expired before the transport operation settled
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the operation via its handle
    #[error("request cancelled")]
    Cancelled,

    /// Transport-level failure (network, DNS, TLS)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx HTTP response, with the server's message (parsed from a JSON
    /// error body when possible, raw text otherwise)
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code of the response
        status: u16,
        /// Server-provided error message, or the raw body text
        message: String,
    },

    /// Payload could not be decoded into the requested type (or a request
    /// payload could not be encoded)
    #[error("decode error: {0}")]
    Decode(String),

    /// Realtime channel could not be established (missing token, handshake
    /// failure, reconnect attempts exhausted)
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed realtime frame (undecodable Envelope)
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Machine-readable kind string, stable across message changes
    ///
    /// Used in terminal `error` Envelope payloads and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
            Error::Transport(_) => "transport_error",
            Error::Http { .. } => "http_error",
            Error::Decode(_) => "decode_error",
            Error::Connection(_) => "connection_error",
            Error::Protocol(_) => "protocol_error",
        }
    }

    /// HTTP status code, when this error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
