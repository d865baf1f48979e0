//! In-process scheduler backed by tokio timers
//!
//! Each registration is a sleeping task; when it wakes it hands a
//! [`DueTask`] to the publish worker over an unbounded channel. Cancelling
//! aborts the sleeper. Nothing survives a restart, so startup re-registers
//! every scheduled post.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::debug;

use super::{DueTask, SchedulerError, TaskHandle, TaskScheduler};

pub struct TokioScheduler {
    runtime: Handle,
    tx: mpsc::UnboundedSender<DueTask>,
    live: Arc<DashMap<TaskHandle, AbortHandle>>,
}

impl TokioScheduler {
    /// Create the scheduler and the receiving end for the worker.
    ///
    /// Must be called inside a tokio runtime; timers are spawned on it even
    /// when `schedule` is called from a blocking thread.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DueTask>) {
        Self::with_runtime(Handle::current())
    }

    pub fn with_runtime(runtime: Handle) -> (Self, mpsc::UnboundedReceiver<DueTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                runtime,
                tx,
                live: Arc::new(DashMap::new()),
            },
            rx,
        )
    }

    /// Registered tasks that have not fired or been cancelled
    pub fn pending_count(&self) -> usize {
        self.live.len()
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, post_id: &str, fire_at: DateTime<Utc>) -> Result<TaskHandle, SchedulerError> {
        if self.tx.is_closed() {
            return Err(SchedulerError::Closed);
        }

        let handle = TaskHandle::new();
        // Overdue tasks fire immediately
        let wait = (fire_at - Utc::now()).to_std().unwrap_or_default();

        let task = DueTask {
            handle: handle.clone(),
            post_id: post_id.to_string(),
            fire_at,
        };
        let tx = self.tx.clone();
        let live = self.live.clone();
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let join = self.runtime.spawn(async move {
            // Wait until the abort handle is tracked so removal can't precede insertion
            let _ = registered_rx.await;
            tokio::time::sleep(wait).await;
            live.remove(&task.handle);
            debug!(post_id = %task.post_id, handle = %task.handle, "Publish task due");
            let _ = tx.send(task);
        });

        self.live.insert(handle.clone(), join.abort_handle());
        let _ = registered_tx.send(());

        debug!(post_id = %post_id, handle = %handle, fire_at = %fire_at, "Publish task registered");
        Ok(handle)
    }

    fn cancel(&self, handle: &TaskHandle) -> Result<(), SchedulerError> {
        if let Some((_, abort)) = self.live.remove(handle) {
            abort.abort();
            debug!(handle = %handle, "Publish task cancelled");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}
