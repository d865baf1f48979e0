//! Scheduler that only records registrations
//!
//! Nothing fires on its own; callers drain due tasks with [`take_due`] and
//! hand them to the publish path. Cancelled registrations stay in the
//! history so a late, duplicate delivery can be replayed.
//!
//! [`take_due`]: ManualScheduler::take_due

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{DueTask, SchedulerError, TaskHandle, TaskScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Pending,
    Cancelled,
    Fired,
}

#[derive(Default)]
pub struct ManualScheduler {
    registrations: DashMap<TaskHandle, (DueTask, RegistrationState)>,
    unavailable: AtomicBool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn state(&self, handle: &TaskHandle) -> Option<RegistrationState> {
        self.registrations.get(handle).map(|entry| entry.value().1)
    }

    /// The task registered under `handle`, whatever its state
    pub fn registration(&self, handle: &TaskHandle) -> Option<DueTask> {
        self.registrations.get(handle).map(|entry| entry.value().0.clone())
    }

    /// Pending registrations for a post
    pub fn pending_for(&self, post_id: &str) -> Vec<DueTask> {
        self.registrations
            .iter()
            .filter(|entry| {
                let (task, state) = entry.value();
                task.post_id == post_id && *state == RegistrationState::Pending
            })
            .map(|entry| entry.value().0.clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.registrations
            .iter()
            .filter(|entry| entry.value().1 == RegistrationState::Pending)
            .count()
    }

    /// Mark and return every pending task due at `now`, earliest first
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<DueTask> {
        let mut due: Vec<DueTask> = Vec::new();
        for mut entry in self.registrations.iter_mut() {
            let (task, state) = entry.value_mut();
            if *state == RegistrationState::Pending && task.fire_at <= now {
                *state = RegistrationState::Fired;
                due.push(task.clone());
            }
        }
        due.sort_by_key(|task| task.fire_at);
        due
    }

    fn check_available(&self) -> Result<(), SchedulerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SchedulerError::Unavailable("manual scheduler switched off".into()))
        } else {
            Ok(())
        }
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, post_id: &str, fire_at: DateTime<Utc>) -> Result<TaskHandle, SchedulerError> {
        self.check_available()?;
        let handle = TaskHandle::new();
        self.registrations.insert(
            handle.clone(),
            (
                DueTask {
                    handle: handle.clone(),
                    post_id: post_id.to_string(),
                    fire_at,
                },
                RegistrationState::Pending,
            ),
        );
        Ok(handle)
    }

    fn cancel(&self, handle: &TaskHandle) -> Result<(), SchedulerError> {
        self.check_available()?;
        if let Some(mut entry) = self.registrations.get_mut(handle) {
            if entry.value().1 == RegistrationState::Pending {
                entry.value_mut().1 = RegistrationState::Cancelled;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_due_only_returns_pending_due_tasks() {
        let scheduler = ManualScheduler::new();
        let now = Utc::now();
        let early = scheduler.schedule("a", now - chrono::Duration::seconds(1)).unwrap();
        let late = scheduler.schedule("b", now + chrono::Duration::hours(1)).unwrap();
        let cancelled = scheduler.schedule("c", now - chrono::Duration::seconds(2)).unwrap();
        scheduler.cancel(&cancelled).unwrap();

        let due = scheduler.take_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].handle, early);
        assert_eq!(scheduler.state(&early), Some(RegistrationState::Fired));
        assert_eq!(scheduler.state(&late), Some(RegistrationState::Pending));
        assert!(scheduler.take_due(now).is_empty());
    }

    #[test]
    fn test_cancel_unknown_handle_is_ok() {
        let scheduler = ManualScheduler::new();
        assert!(scheduler.cancel(&TaskHandle::from("nope")).is_ok());
    }

    #[test]
    fn test_unavailable_backend_errors() {
        let scheduler = ManualScheduler::new();
        scheduler.set_unavailable(true);
        assert!(scheduler.schedule("a", Utc::now()).is_err());
        assert!(scheduler.cancel(&TaskHandle::new()).is_err());
    }
}
