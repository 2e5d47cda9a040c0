//! Long-running operation trackers
//!
//! Convenience subscriptions built purely on the dispatcher: each tracker
//! filters a continuous progress event type by the correlation id embedded
//! in the payload, invokes the caller's callback per matching event, and
//! removes itself once the matching terminal event for the same id is
//! observed. Auto-removal is what keeps many-instance operations (dozens
//! of concurrent analyses) from leaking subscribers.

use super::RealtimeBridge;
use super::dispatch::{Dispatcher, ListenerId};
use crate::types::{AnalysisId, BulkOperationId, DocumentId, Event, EventType, ProjectId};
use std::sync::{Arc, Weak};

/// Detaches a tracker before its terminal event arrives
///
/// Trackers normally remove themselves when the matching `*_complete`
/// event is observed; `cancel` is for callers that stop caring earlier
/// (e.g. the view showing the progress was closed).
#[derive(Debug)]
pub struct TrackerHandle {
    dispatcher: Weak<Dispatcher>,
    progress: (EventType, ListenerId),
    complete: (EventType, ListenerId),
}

impl TrackerHandle {
    /// Remove both underlying listeners now
    pub fn cancel(self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.off(self.progress.0, self.progress.1);
            dispatcher.off(self.complete.0, self.complete.1);
        }
    }
}

impl RealtimeBridge {
    /// Track one analysis run until its `analysis_complete` event
    ///
    /// `callback` is invoked for every `analysis_progress` event whose
    /// `analysis_id` matches; both listeners are removed when the matching
    /// complete event arrives.
    pub fn track_analysis_progress<F>(&self, id: AnalysisId, callback: F) -> TrackerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        track(
            &self.shared().dispatcher,
            EventType::AnalysisProgress,
            EventType::AnalysisComplete,
            move |event| match event {
                Event::AnalysisProgress { analysis_id, .. }
                | Event::AnalysisComplete { analysis_id, .. } => *analysis_id == id,
                _ => false,
            },
            callback,
        )
    }

    /// Track one document through processing until
    /// `document_processing_complete`
    pub fn track_document_processing<F>(&self, id: DocumentId, callback: F) -> TrackerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        track(
            &self.shared().dispatcher,
            EventType::DocumentProcessingProgress,
            EventType::DocumentProcessingComplete,
            move |event| match event {
                Event::DocumentProcessingProgress { document_id, .. }
                | Event::DocumentProcessingComplete { document_id } => *document_id == id,
                _ => false,
            },
            callback,
        )
    }

    /// Track one bulk job until `bulk_operation_complete`
    pub fn track_bulk_operation<F>(&self, id: BulkOperationId, callback: F) -> TrackerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        track(
            &self.shared().dispatcher,
            EventType::BulkOperationProgress,
            EventType::BulkOperationComplete,
            move |event| match event {
                Event::BulkOperationProgress { operation_id, .. }
                | Event::BulkOperationComplete { operation_id, .. } => *operation_id == id,
                _ => false,
            },
            callback,
        )
    }

    /// Subscribe to chat messages for one project
    pub fn on_chat_message<F>(&self, project_id: ProjectId, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared()
            .dispatcher
            .on(EventType::ChatMessage, move |envelope| {
                if matches!(&envelope.event, Event::ChatMessage { project_id: p, .. } if *p == project_id)
                {
                    callback(&envelope.event);
                }
            })
    }

    /// Subscribe to generic notifications
    pub fn on_notification<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared()
            .dispatcher
            .on(EventType::Notification, move |envelope| {
                callback(&envelope.event)
            })
    }

    /// Subscribe to backend status broadcasts
    pub fn on_system_status<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared()
            .dispatcher
            .on(EventType::SystemStatus, move |envelope| {
                callback(&envelope.event)
            })
    }
}

/// Wire up the progress/complete listener pair
fn track<M, F>(
    dispatcher: &Arc<Dispatcher>,
    progress_type: EventType,
    complete_type: EventType,
    matches_id: M,
    callback: F,
) -> TrackerHandle
where
    M: Fn(&Event) -> bool + Send + Sync + 'static,
    F: Fn(&Event) + Send + Sync + 'static,
{
    let matches_id = Arc::new(matches_id);
    let progress_id = dispatcher.reserve_id();
    let complete_id = dispatcher.reserve_id();

    {
        let matches_id = matches_id.clone();
        dispatcher.insert_with_id(progress_type, progress_id, false, move |envelope| {
            if matches_id(&envelope.event) {
                callback(&envelope.event);
            }
        });
    }

    {
        // Weak so listener closures don't keep the dispatcher alive
        let dispatcher_ref = Arc::downgrade(dispatcher);
        dispatcher.insert_with_id(complete_type, complete_id, false, move |envelope| {
            if matches_id(&envelope.event) {
                if let Some(dispatcher) = dispatcher_ref.upgrade() {
                    dispatcher.off(progress_type, progress_id);
                    dispatcher.off(complete_type, complete_id);
                }
            }
        });
    }

    TrackerHandle {
        dispatcher: Arc::downgrade(dispatcher),
        progress: (progress_type, progress_id),
        complete: (complete_type, complete_id),
    }
}
