//! Error reporting for failures that must not abort the caller
//!
//! Gateway follow-ups (transfers, destination charge updates) and exhausted
//! deferred jobs are reported here instead of failing the transition that
//! triggered them.

use parking_lot::Mutex;
use std::sync::Arc;

pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &dyn std::error::Error);
}

/// Reports through `tracing` at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &dyn std::error::Error) {
        tracing::error!(context = %context, error = %error, "Reported error");
    }
}

/// Keeps reports in memory, newest last
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    reports: Arc<Mutex<Vec<(String, String)>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(context, error message)` pairs
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, context: &str, error: &dyn std::error::Error) {
        tracing::debug!(context = %context, error = %error, "Collected error report");
        self.reports
            .lock()
            .push((context.to_string(), error.to_string()));
    }
}
