//! Deferred jobs
//!
//! Work that follows a committed state change but must not block it:
//! ticket delivery, organiser notifications and cache invalidation. Jobs are
//! queued on an in-process channel and executed by [`DeferredWorker`] with
//! retries.

pub mod reporter;
pub mod worker;

pub use reporter::{CollectingReporter, ErrorReporter, TracingReporter};
pub use worker::{
    DeferredError, DeferredHandler, DeferredWorker, JobHandler, LogNotifier, Notifier, NotifyError,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeferredJob {
    /// Email tickets to the buyer
    DeliverTickets { order_id: String },
    /// Tell the organiser about a new or restored order
    NotifyOrganiser { order_id: String },
    /// Drop cached aggregates of an event
    InvalidateEventCache { event_id: String },
}

impl DeferredJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeliverTickets { .. } => "deliver_tickets",
            Self::NotifyOrganiser { .. } => "notify_organiser",
            Self::InvalidateEventCache { .. } => "invalidate_event_cache",
        }
    }
}

/// Sending half of the job channel
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<DeferredJob>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeferredJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a job; dropped with a warning once the worker is gone
    pub fn enqueue(&self, job: DeferredJob) {
        tracing::debug!(job = job.name(), "Queueing deferred job");
        if let Err(e) = self.tx.send(job) {
            tracing::warn!(job = e.0.name(), "Deferred worker stopped, job dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_serde() {
        let job = DeferredJob::DeliverTickets {
            order_id: "o-1".into(),
        };
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(json, r#"{"kind":"deliver_tickets","order_id":"o-1"}"#);
    }

    #[test]
    fn test_enqueue_after_receiver_dropped() {
        let (queue, rx) = JobQueue::new();
        drop(rx);
        queue.enqueue(DeferredJob::InvalidateEventCache {
            event_id: "ev-1".into(),
        });
    }

    #[tokio::test]
    async fn test_jobs_arrive_in_order() {
        let (queue, mut rx) = JobQueue::new();
        queue.enqueue(DeferredJob::DeliverTickets { order_id: "o-1".into() });
        queue.enqueue(DeferredJob::NotifyOrganiser { order_id: "o-1".into() });

        assert_eq!(rx.recv().await.unwrap().name(), "deliver_tickets");
        assert_eq!(rx.recv().await.unwrap().name(), "notify_organiser");
    }
}
