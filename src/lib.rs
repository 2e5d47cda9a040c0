//! # docrelay
//!
//! Client-side communication core for document-analysis applications: a
//! resilient request executor and a realtime event bridge.
//!
//! ## Design Philosophy
//!
//! docrelay is designed to be:
//! - **Resilient** - Timeouts, bounded retry with exponential backoff,
//!   cooperative cancellation, auto-reconnect with heartbeat keep-alive
//! - **Typed end to end** - Outcomes are typed results, realtime traffic
//!   is a closed event enumeration; no stringly-typed dispatch
//! - **Library-first** - No UI or rendering concerns, purely a Rust crate
//!   for embedding; authentication and persistence stay with the caller
//! - **Event-driven** - Consumers subscribe to pushed events, no polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use docrelay::{
//!     Config, EventType, RealtimeBridge, Request, RequestExecutor, StaticTokenProvider,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     // Request/response work goes through the executor
//!     let executor = RequestExecutor::new(config.http)?;
//!     let documents = executor.execute(Request::get("/documents")).await?;
//!     println!("documents: {:?}", documents.json());
//!
//!     // Push-style updates go through the bridge
//!     let bridge = RealtimeBridge::new(
//!         config.realtime,
//!         Arc::new(StaticTokenProvider::new("session-token")),
//!     );
//!     bridge.on(EventType::Notification, |envelope| {
//!         println!("notification: {:?}", envelope.event);
//!     });
//!     bridge.connect().await?;
//!
//!     // ... on logout:
//!     bridge.dispose().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Realtime event bridge
pub mod bridge;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Request executor
pub mod executor;
/// Progress reporting for streamed transfers
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use bridge::{
    ListenerId, RealtimeBridge, StaticTokenProvider, TokenProvider, TrackerHandle,
};
pub use config::{Config, HttpConfig, RealtimeConfig, RetryPolicy};
pub use error::{Error, Result};
pub use executor::{MultipartSpec, PendingRequest, Request, RequestExecutor};
pub use progress::{ProgressSender, ProgressStream};
pub use types::{
    AnalysisId, BulkOperationId, ConnectionState, DocumentId, Envelope, Event, EventType,
    NotificationLevel, ProjectId, RequestId, ResponseBody,
};
