//! Core types for docrelay
//!
//! Wire-level and identifier types shared by the request executor and the
//! realtime bridge. The realtime channel frames every message as an
//! [`Envelope`]: `{ "type": …, "data": …, "timestamp": … }`, with the
//! `type`/`data` pair modeled as the closed [`Event`] enumeration so that
//! dispatch and subscription are checked at compile time instead of being
//! keyed by free-form strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declares a transparent string newtype used to correlate realtime events
/// with the long-running operation they belong to.
macro_rules! correlation_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new id from anything string-like
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

correlation_id! {
    /// Identifier of one document analysis run
    AnalysisId
}

correlation_id! {
    /// Identifier of one document being processed (upload, OCR, indexing)
    DocumentId
}

correlation_id! {
    /// Identifier of one bulk job (batch delete, batch re-analysis, export)
    BulkOperationId
}

correlation_id! {
    /// Identifier of the project a chat conversation belongs to
    ProjectId
}

/// Unique identifier for one in-flight executor operation
///
/// Drawn from a process-wide monotonic counter, so an identifier is never
/// reused while its operation is live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Get the inner counter value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of the realtime channel
///
/// Transitions are strictly sequential
/// (`Disconnected → Connecting → Connected → Closing → Disconnected`);
/// the bridge never jumps straight from `Disconnected` to `Connected`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No channel; reconnects may be pending
    #[default]
    Disconnected,
    /// Open handshake in flight
    Connecting,
    /// Channel open; heartbeat active
    Connected,
    /// Normal closure in progress
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        write!(f, "{s}")
    }
}

/// Severity attached to a server notification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Informational (default)
    #[default]
    Info,
    /// Something needs attention but nothing failed
    Warning,
    /// A user-visible failure
    Error,
}

/// Typed payload of one realtime message
///
/// Serialized adjacently tagged: the variant name becomes the wire `type`
/// (snake_case) and the fields become the `data` object. An inbound frame
/// whose `type` is not one of these variants fails to decode and is dropped
/// by the bridge as a protocol error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Keep-alive probe (system traffic, never dispatched to subscribers)
    Heartbeat {},

    /// Answer to an inbound heartbeat (system traffic)
    HeartbeatResponse {},

    /// Fatal condition surfaced to subscribers (reconnect exhaustion,
    /// server-side failure notices)
    Error {
        /// Human-readable description
        message: String,
        /// Machine-readable error code, when one applies
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Incremental progress of one analysis run
    AnalysisProgress {
        /// Which analysis this update belongs to
        analysis_id: AnalysisId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Pipeline stage currently executing, when the server reports one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },

    /// Terminal event for one analysis run
    AnalysisComplete {
        /// Which analysis finished
        analysis_id: AnalysisId,
        /// Result summary as reported by the server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },

    /// Incremental progress of one document through the processing pipeline
    DocumentProcessingProgress {
        /// Which document this update belongs to
        document_id: DocumentId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Pipeline stage currently executing
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },

    /// Terminal event for one document's processing
    DocumentProcessingComplete {
        /// Which document finished
        document_id: DocumentId,
    },

    /// Incremental progress of one bulk job
    BulkOperationProgress {
        /// Which bulk job this update belongs to
        operation_id: BulkOperationId,
        /// Items finished so far
        completed: u64,
        /// Total items in the job
        total: u64,
    },

    /// Terminal event for one bulk job
    BulkOperationComplete {
        /// Which bulk job finished
        operation_id: BulkOperationId,
        /// Items that failed, if any
        #[serde(default)]
        failed: u64,
    },

    /// Collaborative chat message scoped to a project
    ChatMessage {
        /// Project the conversation belongs to
        project_id: ProjectId,
        /// Display name of the sender
        sender: String,
        /// Message text
        body: String,
    },

    /// Generic user-facing notification
    Notification {
        /// Short title
        title: String,
        /// Notification text
        body: String,
        /// Severity
        #[serde(default)]
        level: NotificationLevel,
    },

    /// Backend health / availability broadcast
    SystemStatus {
        /// Status keyword (e.g. "ok", "degraded", "maintenance")
        status: String,
        /// Optional elaboration
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Event {
    /// The subscription key this payload dispatches under
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Heartbeat {} => EventType::Heartbeat,
            Event::HeartbeatResponse {} => EventType::HeartbeatResponse,
            Event::Error { .. } => EventType::Error,
            Event::AnalysisProgress { .. } => EventType::AnalysisProgress,
            Event::AnalysisComplete { .. } => EventType::AnalysisComplete,
            Event::DocumentProcessingProgress { .. } => EventType::DocumentProcessingProgress,
            Event::DocumentProcessingComplete { .. } => EventType::DocumentProcessingComplete,
            Event::BulkOperationProgress { .. } => EventType::BulkOperationProgress,
            Event::BulkOperationComplete { .. } => EventType::BulkOperationComplete,
            Event::ChatMessage { .. } => EventType::ChatMessage,
            Event::Notification { .. } => EventType::Notification,
            Event::SystemStatus { .. } => EventType::SystemStatus,
        }
    }
}

/// Subscription key: the discriminant of [`Event`] without its payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// `heartbeat`
    Heartbeat,
    /// `heartbeat_response`
    HeartbeatResponse,
    /// `error`
    Error,
    /// `analysis_progress`
    AnalysisProgress,
    /// `analysis_complete`
    AnalysisComplete,
    /// `document_processing_progress`
    DocumentProcessingProgress,
    /// `document_processing_complete`
    DocumentProcessingComplete,
    /// `bulk_operation_progress`
    BulkOperationProgress,
    /// `bulk_operation_complete`
    BulkOperationComplete,
    /// `chat_message`
    ChatMessage,
    /// `notification`
    Notification,
    /// `system_status`
    SystemStatus,
}

impl EventType {
    /// Wire name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Heartbeat => "heartbeat",
            EventType::HeartbeatResponse => "heartbeat_response",
            EventType::Error => "error",
            EventType::AnalysisProgress => "analysis_progress",
            EventType::AnalysisComplete => "analysis_complete",
            EventType::DocumentProcessingProgress => "document_processing_progress",
            EventType::DocumentProcessingComplete => "document_processing_complete",
            EventType::BulkOperationProgress => "bulk_operation_progress",
            EventType::BulkOperationComplete => "bulk_operation_complete",
            EventType::ChatMessage => "chat_message",
            EventType::Notification => "notification",
            EventType::SystemStatus => "system_status",
        }
    }

    /// Whether this type is internal protocol traffic
    ///
    /// System traffic (keep-alive probes and their answers) is handled by
    /// the bridge itself and never reaches business-event subscribers.
    pub fn is_system(&self) -> bool {
        matches!(self, EventType::Heartbeat | EventType::HeartbeatResponse)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One framed realtime message
///
/// Serializes to `{ "type": …, "data": …, "timestamp": … }` with an
/// ISO-8601 timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Typed payload (`type` tag + `data` object on the wire)
    #[serde(flatten)]
    pub event: Event,

    /// When the sender produced this frame
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Frame an event, stamped with the current time
    pub fn new(event: Event) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Success payload of one executor call
///
/// Empty bodies (204s) and successful responses whose bodies are not JSON
/// both settle as [`ResponseBody::Empty`] rather than failing the call.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// No decodable body
    Empty,
    /// Decoded JSON body
    Json(serde_json::Value),
}

impl ResponseBody {
    /// Whether the response carried no decodable body
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// The decoded JSON value, if there was one
    pub fn json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Json(value) => Some(value),
        }
    }
}
