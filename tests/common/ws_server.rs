//! In-process WebSocket server for realtime bridge tests
//!
//! Accepts connections on a background task and hands each one to the test
//! as a [`ServerConn`], which can script frames in both directions and end
//! the session with a normal or abnormal close.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_util::sync::CancellationToken;

/// Scripted realtime endpoint
pub struct WsServer {
    addr: SocketAddr,
    conn_rx: mpsc::UnboundedReceiver<ServerConn>,
    stop: CancellationToken,
}

impl WsServer {
    /// Bind an ephemeral port and start accepting
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        let accept_stop = stop.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = accept_stop.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => break,
                    },
                };
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    let query = Arc::new(Mutex::new(String::new()));
                    let capture = {
                        let query = query.clone();
                        move |request: &Request, response: Response| {
                            *query.lock().unwrap() =
                                request.uri().query().unwrap_or_default().to_string();
                            Ok(response)
                        }
                    };
                    if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, capture).await {
                        let query = query.lock().unwrap().clone();
                        let _ = conn_tx.send(ServerConn { query, ws });
                    }
                });
            }
            // Listener drops here; further connects are refused
        });

        Self {
            addr,
            conn_rx,
            stop,
        }
    }

    /// Endpoint URI for bridge configs
    pub fn endpoint(&self) -> String {
        format!("ws://{}/realtime", self.addr)
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(Duration::from_secs(5), self.conn_rx.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("accept loop ended")
    }

    /// True when no connection arrives within the window
    pub async fn no_connection_within(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.conn_rx.recv())
            .await
            .is_err()
    }

    /// Stop accepting; pending and future connects are refused
    pub fn stop_accepting(&self) {
        self.stop.cancel();
    }
}

/// One accepted client connection, driven by the test
pub struct ServerConn {
    /// Raw query string of the handshake request
    pub query: String,
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    /// Send a text frame
    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("server send failed");
    }

    /// Send a JSON value as a text frame
    pub async fn send_json(&mut self, value: serde_json::Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Next text frame from the client; `None` once the session ends
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Like [`next_text`](Self::next_text) but bounded by a timeout
    pub async fn next_text_within(&mut self, window: Duration) -> Option<String> {
        tokio::time::timeout(window, self.next_text())
            .await
            .unwrap_or(None)
    }

    /// Close the session with the normal-closure code
    pub async fn close_normal(mut self) {
        let _ = self
            .ws
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            })))
            .await;
        let _ = self.ws.close(None).await;
    }

    /// Close the session abnormally (server fault)
    pub async fn close_abnormal(mut self) {
        let _ = self
            .ws
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "server fault".into(),
            })))
            .await;
        let _ = self.ws.close(None).await;
    }
}
