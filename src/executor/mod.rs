//! Request executor: resilient single request/response operations
//!
//! Wraps each network call with a per-call timeout, cooperative
//! cancellation, bounded retry with exponential backoff, and optional
//! streamed-body progress reporting. Every in-flight call is tracked in a
//! live-operation registry (request id → cancellation token) so callers
//! can abort one call or all of them; an entry exists exactly while its
//! operation is unsettled.
//!
//! The executor never panics or throws across its public boundary: every
//! outcome is a typed [`Result`], and callers branch on it.

use crate::config::{HttpConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::retry;
use crate::types::{RequestId, ResponseBody};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub mod request;

pub use request::{MultipartSpec, Request};

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Executes request/response operations against the configured backend
///
/// Cheap to clone; clones share the transport client and the
/// live-operation registry.
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    config: HttpConfig,
    live: tokio::sync::Mutex<HashMap<RequestId, CancellationToken>>,
    next_id: AtomicU64,
}

/// Handle to one dispatched, not-yet-settled operation
///
/// Exposes the registry id (usable with [`RequestExecutor::cancel`]) and
/// the eventual outcome. Dropping the handle does not cancel the
/// operation.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    outcome_rx: oneshot::Receiver<Result<ResponseBody>>,
}

impl PendingRequest {
    /// Registry id of this operation
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the operation to settle
    pub async fn outcome(self) -> Result<ResponseBody> {
        // The sender is dropped without settling only when the runtime
        // tears the task down (shutdown), which callers observe as a
        // cancellation.
        self.outcome_rx.await.unwrap_or(Err(Error::Cancelled))
    }
}

impl RequestExecutor {
    /// Create an executor over one shared transport client
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                live: tokio::sync::Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    /// Dispatch a request and return a cancellable handle
    ///
    /// Registers a fresh cancellation token under a never-reused id, then
    /// runs the call (timeout, retries, progress) on a background task.
    /// The registry entry is removed when the call settles, whichever way
    /// it settles.
    pub async fn dispatch(&self, request: Request) -> PendingRequest {
        let id = RequestId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let token = CancellationToken::new();
        self.inner.live.lock().await.insert(id, token.clone());

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = run_request(&inner, &request, &token).await;
            inner.live.lock().await.remove(&id);
            let _ = outcome_tx.send(result);
        });

        PendingRequest { id, outcome_rx }
    }

    /// Execute a request to completion
    pub async fn execute(&self, request: Request) -> Result<ResponseBody> {
        self.dispatch(request).await.outcome().await
    }

    /// Execute a request and decode the JSON body into `T`
    pub async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let value = match self.execute(request).await? {
            ResponseBody::Json(value) => value,
            ResponseBody::Empty => serde_json::Value::Null,
        };
        serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Upload a multipart form
    ///
    /// Specialization of [`execute`](Self::execute) for multipart bodies:
    /// uses the longer upload timeout by default and leaves the
    /// Content-Type header (multipart boundary included) to the transport.
    pub async fn upload(&self, path: impl Into<String>, spec: MultipartSpec) -> Result<ResponseBody> {
        self.execute(Request::post(path).multipart(spec)).await
    }

    /// Abort one in-flight operation
    ///
    /// Returns `true` when the id was live. The aborted call settles as
    /// [`Error::Cancelled`]; no further retry is attempted.
    pub async fn cancel(&self, id: RequestId) -> bool {
        let token = self.inner.live.lock().await.remove(&id);
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort every in-flight operation
    ///
    /// Returns the number of operations aborted. The registry is empty
    /// when this returns; each aborted call settles as
    /// [`Error::Cancelled`].
    pub async fn cancel_all(&self) -> usize {
        let mut live = self.inner.live.lock().await;
        let count = live.len();
        for (_, token) in live.drain() {
            token.cancel();
        }
        count
    }

    /// Number of not-yet-settled operations in the registry
    pub async fn live_operations(&self) -> usize {
        self.inner.live.lock().await.len()
    }
}

/// Full lifecycle of one dispatched request: retry loop around timed
/// attempts.
async fn run_request(
    inner: &Inner,
    request: &Request,
    cancel: &CancellationToken,
) -> Result<ResponseBody> {
    let policy = RetryPolicy {
        max_retries: request.retries.unwrap_or(inner.config.retry.max_retries),
        ..inner.config.retry.clone()
    };
    let timeout = effective_timeout(inner, request);

    retry::run(&policy, cancel, || attempt(inner, request, timeout)).await
}

fn effective_timeout(inner: &Inner, request: &Request) -> Duration {
    request.timeout.unwrap_or(if request.is_multipart() {
        inner.config.upload_timeout
    } else {
        inner.config.timeout
    })
}

/// One attempt, bounded by the per-call timeout
///
/// The timeout covers the whole attempt (send + body read); on expiry the
/// in-flight transport operation is dropped, which aborts it.
async fn attempt(inner: &Inner, request: &Request, timeout: Duration) -> Result<ResponseBody> {
    match tokio::time::timeout(timeout, send_once(inner, request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

async fn send_once(inner: &Inner, request: &Request) -> Result<ResponseBody> {
    let url = join_url(&inner.config.base_url, &request.path);
    let mut builder = inner.client.request(request.method.clone(), &url);

    // Defaults first, per-call overrides second. Multipart bodies must let
    // the transport compute the boundary, so Content-Type never comes from
    // headers there.
    for (name, value) in &inner.config.default_headers {
        if request.is_multipart() && name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        builder = builder.header(name, value);
    }
    for (name, value) in &request.headers {
        if request.is_multipart() && name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        builder = builder.header(name, value);
    }

    builder = match &request.body {
        request::RequestBody::None => builder,
        request::RequestBody::Json(value) => builder.json(value),
        request::RequestBody::Multipart(spec) => builder.multipart(spec.to_form()?),
    };

    let response = builder.send().await?;
    let status = response.status();

    if !status.is_success() {
        let raw = response.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            message: error_message(&raw, status),
        });
    }

    read_success_body(response, request).await
}

/// Read a 2xx body, reporting progress when possible
///
/// An empty or non-JSON body on a successful response settles as
/// [`ResponseBody::Empty`]; only the error path surfaces body text.
async fn read_success_body(
    response: reqwest::Response,
    request: &Request,
) -> Result<ResponseBody> {
    let reportable_total = request
        .progress
        .as_ref()
        .and(response.content_length().filter(|total| *total > 0));

    let body = match (&request.progress, reportable_total) {
        (Some(progress), Some(total)) => {
            let mut buf: Vec<u8> = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);
                progress.report((buf.len() as f64 * 100.0 / total as f64) as f32);
            }
            buf
        }
        // No Content-Length: progress reporting is silently disabled
        _ => response.bytes().await?.to_vec(),
    };

    if body.is_empty() {
        return Ok(ResponseBody::Empty);
    }
    match serde_json::from_slice(&body) {
        Ok(value) => Ok(ResponseBody::Json(value)),
        Err(_) => Ok(ResponseBody::Empty),
    }
}

/// Extract a human-readable message from an error response body
///
/// Prefers a JSON `message` or `error` string field; falls back to the raw
/// body text, then to the status reason.
fn error_message(raw: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    if raw.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("HTTP error")
            .to_string()
    } else {
        raw.to_string()
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
