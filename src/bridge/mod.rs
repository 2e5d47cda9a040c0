//! Realtime bridge: persistent bidirectional event channel
//!
//! Owns a single long-lived WebSocket connection with auto-reconnect,
//! heartbeat keep-alive, and a typed publish/subscribe dispatcher that
//! downstream callers register listeners on for push-style updates
//! (analysis progress, bulk-job progress, notifications, collaborative
//! events). Initialized once per authenticated session and disposed on
//! logout.
//!
//! The bridge is fire-and-forget after [`connect`](RealtimeBridge::connect)
//! resolves: fatal conditions (missing auth token at reconnect, reconnect
//! attempts exhausted) surface as emitted `error` events rather than
//! returned errors.

use crate::config::RealtimeConfig;
use crate::error::Result;
use crate::types::{ConnectionState, Envelope, Event, EventType};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) mod connection;
pub(crate) mod dispatch;
mod trackers;

pub use dispatch::ListenerId;
pub use trackers::TrackerHandle;

use dispatch::Dispatcher;

/// Caller-supplied source of the authentication token
///
/// The bridge reads a token at every (re)connect and fails fast when none
/// is available. Token storage and refresh rules live with the caller.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The current access token, or `None` when the session has none
    async fn access_token(&self) -> Option<String>;
}

/// Token provider backed by a fixed string (tests, service accounts)
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap a fixed token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// State shared between the public handle and the connection task
pub(crate) struct Shared {
    pub(crate) config: RealtimeConfig,
    pub(crate) token_provider: Arc<dyn TokenProvider>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    state: StdMutex<ConnectionState>,
    pub(crate) reconnect_attempts: AtomicU32,
}

impl Shared {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state transition");
            *state = next;
        }
    }
}

/// One spawned connection task and its shutdown signal
struct Session {
    task: JoinHandle<()>,
    shutdown: CancellationToken,
}

/// Public handle to the realtime channel
pub struct RealtimeBridge {
    shared: Arc<Shared>,
    outbound_tx: StdMutex<Option<mpsc::Sender<Envelope>>>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl RealtimeBridge {
    /// Create a bridge (no connection is opened yet)
    pub fn new(config: RealtimeConfig, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                token_provider,
                dispatcher: Arc::new(Dispatcher::new()),
                state: StdMutex::new(ConnectionState::Disconnected),
                reconnect_attempts: AtomicU32::new(0),
            }),
            outbound_tx: StdMutex::new(None),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state of the channel
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Consecutive failed reconnects since the last successful connection
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Open the channel
    ///
    /// No-op when already connecting or connected (only one transition may
    /// be in flight). Fails fast when the token provider has no token, or
    /// when the open handshake fails or times out. Resolves once the
    /// channel is open; from then on reconnects, heartbeats, and dispatch
    /// run on a background task.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let previous = *state;
            match previous {
                ConnectionState::Connecting | ConnectionState::Connected => return Ok(()),
                _ => {
                    tracing::debug!(from = %previous, to = %ConnectionState::Connecting, "connection state transition");
                    *state = ConnectionState::Connecting;
                }
            }
        }

        // A previous session may still be alive, waiting out a reconnect
        // delay; a manual connect supersedes it.
        self.stop_session().await;

        let stream = match connection::establish(&self.shared).await {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connected);

        let (outbound_tx, outbound_rx) = mpsc::channel(self.shared.config.send_queue_capacity);
        let shutdown = CancellationToken::new();
        *self
            .outbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outbound_tx);

        let task = tokio::spawn(connection::connection_task(
            self.shared.clone(),
            stream,
            outbound_rx,
            shutdown.clone(),
        ));
        *self.session.lock().await = Some(Session { task, shutdown });

        tracing::info!(endpoint = %self.shared.config.endpoint, "realtime channel open");
        Ok(())
    }

    /// Close the channel with a normal-closure signal
    ///
    /// Cancels any pending reconnect timer, stops the heartbeat, and lands
    /// in `Disconnected`. Also the way to abandon a pending reconnect loop
    /// (a stop request, not an abort of a specific handshake).
    pub async fn disconnect(&self) {
        if self.state() == ConnectionState::Connected {
            self.shared.set_state(ConnectionState::Closing);
        }
        self.stop_session().await;
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Tear the bridge down: disconnect and drop every subscription
    pub async fn dispose(&self) {
        self.disconnect().await;
        self.shared.dispatcher.clear();
    }

    /// Transmit an event over the channel
    ///
    /// Stamps the event into an Envelope and queues it for transmission.
    /// Returns `false` — rather than erroring — when the channel is not
    /// connected or the outbound queue is full, so callers can choose to
    /// buffer or drop.
    pub fn send(&self, event: Event) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        let guard = self
            .outbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .is_some_and(|tx| tx.try_send(Envelope::new(event)).is_ok())
    }

    /// Subscribe a listener for every event of `event_type`
    ///
    /// Listeners of one type run in subscription order; duplicates are
    /// allowed; a listener may unsubscribe itself from inside a dispatch.
    pub fn on<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared.dispatcher.on(event_type, listener)
    }

    /// Subscribe a one-shot listener, removed after its first invocation
    pub fn once<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared.dispatcher.once(event_type, listener)
    }

    /// Remove a listener; returns whether it was registered
    pub fn off(&self, event_type: EventType, id: ListenerId) -> bool {
        self.shared.dispatcher.off(event_type, id)
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    async fn stop_session(&self) {
        let session = self.session.lock().await.take();
        if let Some(Session { task, shutdown }) = session {
            shutdown.cancel();
            task.await.ok();
        }
        *self
            .outbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
