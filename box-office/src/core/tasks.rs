//! Long-running tasks of the box office
//!
//! The deferred job worker and the aggregate sweep run for the whole life of
//! the process. They share one cancellation token and are joined on shutdown.

use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Consumes a queue until cancelled
    Worker,
    /// Wakes on an interval
    Periodic,
}

struct Supervised {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Owns the long-running tasks and their shutdown token
pub struct BackgroundTasks {
    running: Vec<Supervised>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            running: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn `future`; a panic or an exit before shutdown is logged, never propagated
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) if token.is_cancelled() => {
                    tracing::debug!(task = name, ?kind, "Task stopped");
                }
                Ok(()) => {
                    tracing::warn!(task = name, ?kind, "Task exited before shutdown");
                }
                Err(payload) => {
                    tracing::error!(
                        task = name,
                        ?kind,
                        panic = %panic_message(payload.as_ref()),
                        "Task panicked"
                    );
                }
            }
        });
        tracing::debug!(task = name, ?kind, "Task started");
        self.running.push(Supervised { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Names of tasks that are no longer running
    pub fn stopped(&self) -> Vec<&'static str> {
        let stopped: Vec<_> = self
            .running
            .iter()
            .filter(|t| t.handle.is_finished())
            .map(|t| t.name)
            .collect();
        for name in &stopped {
            tracing::error!(task = name, "Background task is not running");
        }
        stopped
    }

    /// Cancel the token and wait for every task
    pub async fn shutdown(self) {
        tracing::info!(tasks = self.running.len(), "Stopping background tasks");
        self.shutdown.cancel();

        let names: Vec<_> = self.running.iter().map(|t| (t.name, t.kind)).collect();
        let results = join_all(self.running.into_iter().map(|t| t.handle)).await;
        for ((name, kind), result) in names.into_iter().zip(results) {
            if let Err(e) = result {
                tracing::error!(task = name, ?kind, error = %e, "Task did not join cleanly");
            }
        }
        tracing::info!("Background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
