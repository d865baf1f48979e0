//! Post publication state machine
//!
//! ```text
//! draft <-> scheduled <-> canceled
//!   |           |
//!   |      (task fires)
//!   v           v
//!   +------> published   (terminal)
//! ```
//!
//! Everything here is pure: callers pass the stored state, the requested
//! edit and the clock, and get back the state to write plus the scheduler
//! actions to run once the transaction has committed.

use chrono::{DateTime, Utc};

use crate::db::models::{Post, PostStatus};
use crate::error::ValidationErrors;
use crate::scheduler::TaskHandle;

/// Lifecycle columns of a stored post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostState {
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub task: Option<TaskHandle>,
}

impl PostState {
    pub fn from_post(post: &Post) -> Self {
        Self {
            status: post.status(),
            scheduled_at: post.scheduled_at(),
            published_at: post.published_at(),
            task: post.scheduled_task_id.clone().map(TaskHandle::from),
        }
    }
}

/// Requested lifecycle change. `None` leaves the field as stored;
/// `scheduled_at: Some(None)` is an explicit null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleEdit {
    pub status: Option<PostStatus>,
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

/// Scheduler work to run after commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerAction {
    /// Best-effort cancel of a previously registered task
    Cancel(TaskHandle),
    /// Register a new publish task and persist its handle
    Schedule { fire_at: DateTime<Utc> },
}

/// Outcome of a planned transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<PostStatus>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    /// Task handle kept on the row (cleared when a new task will be registered)
    pub task: Option<TaskHandle>,
    pub actions: Vec<SchedulerAction>,
}

impl Transition {
    /// Published-ness changed; drives the author's `posts_count`
    pub fn published_delta(&self) -> i8 {
        let was = self.from == Some(PostStatus::Published);
        let is = self.status == PostStatus::Published;
        match (was, is) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        }
    }
}

const SCHEDULED_AT_REQUIRED: &str = "This field is required for scheduled posts.";
const SCHEDULED_AT_PAST: &str = "Must be in the future.";
const PUBLISHED_STATUS_LOCKED: &str = "Published post can't change status.";
const PUBLISHED_SCHEDULE_LOCKED: &str = "Published post can't be scheduled.";

/// Plan a create (`current = None`) or an update of a stored post
pub fn plan_transition(
    current: Option<&PostState>,
    edit: &LifecycleEdit,
    now: DateTime<Utc>,
) -> Result<Transition, ValidationErrors> {
    match current {
        None => plan_create(edit, now),
        Some(state) if state.status == PostStatus::Published => plan_published_edit(state, edit),
        Some(state) => plan_update(state, edit, now),
    }
}

fn validate_schedule(
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    match scheduled_at {
        None => errors.add("scheduled_at", SCHEDULED_AT_REQUIRED),
        Some(at) if at <= now => errors.add("scheduled_at", SCHEDULED_AT_PAST),
        Some(at) => return Ok(at),
    }
    Err(errors)
}

fn plan_create(edit: &LifecycleEdit, now: DateTime<Utc>) -> Result<Transition, ValidationErrors> {
    let status = edit.status.unwrap_or_default();
    let requested_at = edit.scheduled_at.flatten();

    let transition = match status {
        PostStatus::Scheduled => {
            let fire_at = validate_schedule(requested_at, now)?;
            Transition {
                from: None,
                status,
                scheduled_at: Some(fire_at),
                published_at: None,
                task: None,
                actions: vec![SchedulerAction::Schedule { fire_at }],
            }
        }
        PostStatus::Published => Transition {
            from: None,
            status,
            scheduled_at: None,
            published_at: Some(now),
            task: None,
            actions: Vec::new(),
        },
        PostStatus::Draft | PostStatus::Canceled => Transition {
            from: None,
            status,
            scheduled_at: None,
            published_at: None,
            task: None,
            actions: Vec::new(),
        },
    };

    Ok(transition)
}

/// Published is terminal: only harmless re-statements pass
fn plan_published_edit(
    state: &PostState,
    edit: &LifecycleEdit,
) -> Result<Transition, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if matches!(edit.status, Some(status) if status != PostStatus::Published) {
        errors.add("status", PUBLISHED_STATUS_LOCKED);
    }
    if matches!(edit.scheduled_at, Some(Some(_))) {
        errors.add("scheduled_at", PUBLISHED_SCHEDULE_LOCKED);
    }
    errors.into_result_with(|| Transition {
        from: Some(PostStatus::Published),
        status: PostStatus::Published,
        scheduled_at: None,
        published_at: state.published_at,
        task: None,
        actions: Vec::new(),
    })
}

fn plan_update(
    state: &PostState,
    edit: &LifecycleEdit,
    now: DateTime<Utc>,
) -> Result<Transition, ValidationErrors> {
    let status = edit.status.unwrap_or(state.status);
    let requested_at = match edit.scheduled_at {
        Some(value) => value,
        None => state.scheduled_at,
    };

    let mut actions = Vec::new();
    let leaving_task = |actions: &mut Vec<SchedulerAction>| {
        if let Some(ref task) = state.task {
            actions.push(SchedulerAction::Cancel(task.clone()));
        }
    };

    let transition = match status {
        PostStatus::Scheduled => {
            let fire_at = validate_schedule(requested_at, now)?;
            let unchanged = state.status == PostStatus::Scheduled
                && state.scheduled_at == Some(fire_at)
                && state.task.is_some();

            if unchanged {
                Transition {
                    from: Some(state.status),
                    status,
                    scheduled_at: Some(fire_at),
                    published_at: None,
                    task: state.task.clone(),
                    actions,
                }
            } else {
                leaving_task(&mut actions);
                actions.push(SchedulerAction::Schedule { fire_at });
                Transition {
                    from: Some(state.status),
                    status,
                    scheduled_at: Some(fire_at),
                    published_at: None,
                    task: None,
                    actions,
                }
            }
        }
        PostStatus::Published => {
            leaving_task(&mut actions);
            Transition {
                from: Some(state.status),
                status,
                scheduled_at: None,
                published_at: Some(state.published_at.unwrap_or(now)),
                task: None,
                actions,
            }
        }
        PostStatus::Draft | PostStatus::Canceled => {
            leaving_task(&mut actions);
            Transition {
                from: Some(state.status),
                status,
                scheduled_at: None,
                published_at: None,
                task: None,
                actions,
            }
        }
    };

    Ok(transition)
}

/// Decision taken by the publish task under the post lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    Publish,
    /// Post no longer exists
    Missing,
    /// Status moved away from scheduled
    NotScheduled(PostStatus),
    /// Fire time not reached yet
    NotDue,
}

/// Re-check a fired publish task against the stored state
pub fn plan_publish(current: Option<&PostState>, now: DateTime<Utc>) -> PublishDecision {
    let Some(state) = current else {
        return PublishDecision::Missing;
    };
    if state.status != PostStatus::Scheduled {
        return PublishDecision::NotScheduled(state.status);
    }
    match state.scheduled_at {
        Some(at) if at <= now => PublishDecision::Publish,
        _ => PublishDecision::NotDue,
    }
}
