//! Background connection task for the realtime bridge
//!
//! One task owns the WebSocket stream and multiplexes, in a single select
//! loop: inbound frames, the outbound send queue, the heartbeat timer, and
//! the shutdown signal. On an abnormal close it drives the reconnect state
//! machine — fixed delay, consecutive-failure counter, terminal `error`
//! event once the counter reaches the configured maximum.

use super::Shared;
use crate::error::{Error, Result};
use crate::types::{ConnectionState, Envelope, Event};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why the per-connection read loop ended
enum SessionEnd {
    /// Peer closed with the normal-closure code; no reconnect
    NormalClose,
    /// Error frame close code, stream error, or stream end; reconnect
    AbnormalClose,
    /// Shutdown was requested; the close frame has been sent
    Shutdown,
}

/// Open the channel: read the auth token, build the authenticated URI, and
/// complete the handshake within the configured timeout.
pub(crate) async fn establish(shared: &Shared) -> Result<WsStream> {
    let token = shared
        .token_provider
        .access_token()
        .await
        .ok_or_else(|| Error::Connection("no authentication token available".to_string()))?;

    let uri = authenticated_endpoint(&shared.config.endpoint, &token)?;

    match tokio::time::timeout(shared.config.connect_timeout, connect_async(uri.as_str())).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(Error::Connection(format!("handshake failed: {e}"))),
        Err(_) => Err(Error::Connection(format!(
            "handshake timed out after {:?}",
            shared.config.connect_timeout
        ))),
    }
}

/// Endpoint URI with the auth token appended as a query parameter
fn authenticated_endpoint(endpoint: &str, token: &str) -> Result<String> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|e| Error::Connection(format!("invalid realtime endpoint {endpoint:?}: {e}")))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(Error::Connection(format!(
            "realtime endpoint must be ws:// or wss://, got {endpoint:?}"
        )));
    }

    let separator = if parsed.query().is_some() { '&' } else { '?' };
    Ok(format!(
        "{endpoint}{separator}token={}",
        urlencoding::encode(token)
    ))
}

/// Own the connection until shutdown, normal closure, or reconnect
/// exhaustion.
pub(crate) async fn connection_task(
    shared: Arc<Shared>,
    initial: WsStream,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    shutdown: CancellationToken,
) {
    let mut stream = Some(initial);

    loop {
        if let Some(ws) = stream.take() {
            match run_session(&shared, ws, &mut outbound_rx, &shutdown).await {
                SessionEnd::Shutdown => return,
                SessionEnd::NormalClose => {
                    shared.set_state(ConnectionState::Disconnected);
                    return;
                }
                SessionEnd::AbnormalClose => {
                    shared.set_state(ConnectionState::Disconnected);
                }
            }
        }

        // Abnormal close: count it, and either give up or schedule one
        // reconnect after the fixed delay.
        let failures = shared.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= shared.config.max_reconnect_attempts {
            tracing::warn!(
                failures,
                max = shared.config.max_reconnect_attempts,
                "giving up on reconnecting"
            );
            shared.dispatcher.dispatch(&Envelope::new(Event::Error {
                message: format!(
                    "maximum reconnect attempts ({}) reached",
                    shared.config.max_reconnect_attempts
                ),
                code: Some("connection_error".to_string()),
            }));
            return;
        }

        tracing::info!(
            attempt = failures,
            delay_ms = shared.config.reconnect_delay.as_millis(),
            "scheduling reconnect"
        );
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
        }

        shared.set_state(ConnectionState::Connecting);
        match establish(&shared).await {
            Ok(ws) => {
                tracing::info!("reconnected");
                shared.reconnect_attempts.store(0, Ordering::SeqCst);
                shared.set_state(ConnectionState::Connected);
                stream = Some(ws);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt = failures, "reconnect attempt failed");
                shared.set_state(ConnectionState::Disconnected);
                // Loop back: the failed attempt counts as the next
                // consecutive failure.
            }
        }
    }
}

/// Read/write loop for one open connection
async fn run_session(
    shared: &Shared,
    mut ws: WsStream,
    outbound_rx: &mut mpsc::Receiver<Envelope>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + shared.config.heartbeat_interval,
        shared.config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                let _ = ws
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    })))
                    .await;
                let _ = ws.close(None).await;
                return SessionEnd::Shutdown;
            }

            envelope = outbound_rx.recv() => {
                let Some(envelope) = envelope else {
                    // All senders gone: the bridge handle was dropped
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = send_envelope(&mut ws, &envelope).await {
                    tracing::warn!(error = %e, "outbound send failed");
                    return SessionEnd::AbnormalClose;
                }
            }

            _ = heartbeat.tick() => {
                tracing::debug!("sending heartbeat");
                if let Err(e) = send_envelope(&mut ws, &Envelope::new(Event::Heartbeat {})).await {
                    tracing::warn!(error = %e, "heartbeat send failed");
                    return SessionEnd::AbnormalClose;
                }
            }

            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(shared, &mut ws, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match std::str::from_utf8(&data) {
                            Ok(text) => {
                                let text = text.to_string();
                                handle_frame(shared, &mut ws, &text).await;
                            }
                            Err(_) => {
                                tracing::warn!(bytes = data.len(), "dropping non-UTF-8 binary frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let normal = frame
                            .as_ref()
                            .is_some_and(|f| f.code == CloseCode::Normal);
                        if normal {
                            tracing::info!("peer closed the channel normally");
                            return SessionEnd::NormalClose;
                        }
                        tracing::warn!(frame = ?frame, "abnormal close from peer");
                        return SessionEnd::AbnormalClose;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket error");
                        return SessionEnd::AbnormalClose;
                    }
                    None => {
                        tracing::warn!("websocket stream ended");
                        return SessionEnd::AbnormalClose;
                    }
                }
            }
        }
    }
}

/// Decode one inbound frame and route it
///
/// Heartbeat traffic is answered or absorbed here — it never reaches
/// business-event subscribers. Malformed frames are logged and dropped;
/// the loop never dies on bad input.
async fn handle_frame(shared: &Shared, ws: &mut WsStream, text: &str) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            let error = Error::Protocol(format!("undecodable frame: {e}"));
            tracing::warn!(error = %error, frame = %truncate(text, 256), "dropping frame");
            return;
        }
    };

    match &envelope.event {
        Event::Heartbeat {} => {
            tracing::debug!("answering peer heartbeat");
            if let Err(e) =
                send_envelope(ws, &Envelope::new(Event::HeartbeatResponse {})).await
            {
                tracing::warn!(error = %e, "heartbeat response failed");
            }
        }
        Event::HeartbeatResponse {} => {
            tracing::debug!("peer acknowledged heartbeat");
        }
        _ => shared.dispatcher.dispatch(&envelope),
    }
}

async fn send_envelope(ws: &mut WsStream, envelope: &Envelope) -> Result<()> {
    let text = serde_json::to_string(envelope)
        .map_err(|e| Error::Protocol(format!("unencodable envelope: {e}")))?;
    ws.send(Message::Text(text))
        .await
        .map_err(|e| Error::Connection(format!("send failed: {e}")))
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
