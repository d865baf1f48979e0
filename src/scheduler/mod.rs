//! Deferred task scheduling for post publication
//!
//! The lifecycle only talks to [`TaskScheduler`]: register a publish task for
//! a post at a fire time, cancel it by handle. Backends:
//!
//! - [`TokioScheduler`] - in-process timers; due tasks are sent over an mpsc
//!   channel to the [`PublishWorker`]
//! - [`ManualScheduler`] - records registrations; tasks fire only when driven
//!
//! Delivery is at-least-once and cancellation best-effort, so the publish
//! task re-checks the post before mutating it.

pub mod manual;
pub mod retry;
pub mod tokio_backend;
pub mod worker;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use manual::ManualScheduler;
pub use retry::{retry_blocking, RetryPolicy};
pub use tokio_backend::TokioScheduler;
pub use worker::{PublishWorker, ProfileCreationWorker};

/// Opaque reference to a registered task, persisted on the post row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for TaskHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A publish task whose fire time has come
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask {
    pub handle: TaskHandle,
    pub post_id: String,
    pub fire_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler unavailable: {0}")]
    Unavailable(String),

    #[error("Scheduler channel closed")]
    Closed,
}

/// Deferred-execution backend
pub trait TaskScheduler: Send + Sync {
    /// Register a publish task for `post_id` firing at `fire_at`
    fn schedule(&self, post_id: &str, fire_at: DateTime<Utc>) -> Result<TaskHandle, SchedulerError>;

    /// Cancel a task. Unknown or already-fired handles are `Ok`.
    fn cancel(&self, handle: &TaskHandle) -> Result<(), SchedulerError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
