//! Progress reporting for streamed transfers
//!
//! Progress is modeled as a lazy, finite sequence of percentages rather
//! than a bare callback: the executor pushes cumulative percentages into a
//! [`ProgressSender`] after each body chunk, and the caller consumes the
//! paired [`ProgressStream`] wherever it renders progress. The stream ends
//! when the operation settles (the sender is dropped), which makes
//! reporting independently testable without a live transfer.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Create a linked progress reporter/consumer pair
pub fn channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender { tx },
        ProgressStream {
            inner: UnboundedReceiverStream::new(rx),
        },
    )
}

/// Producing half: the executor reports percentages into this
#[derive(Clone, Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<f32>,
}

impl ProgressSender {
    /// Report a cumulative progress percentage
    ///
    /// Values are clamped to 0.0–100.0. Reports after the consumer has
    /// been dropped are silently discarded.
    pub fn report(&self, percent: f32) {
        let clamped = percent.clamp(0.0, 100.0);
        let _ = self.tx.send(clamped);
    }
}

/// Consuming half: a finite stream of 0.0–100.0 percentages
///
/// Yields one value per reported chunk and ends when the operation
/// settles.
#[derive(Debug)]
pub struct ProgressStream {
    inner: UnboundedReceiverStream<f32>,
}

impl Stream for ProgressStream {
    type Item = f32;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<f32>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
