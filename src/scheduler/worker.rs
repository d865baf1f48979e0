//! Background workers draining the scheduler and registration queues
//!
//! Each delivered item runs on its own task through [`retry_blocking`], so a
//! slow retry loop does not hold up later deliveries.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::retry::{retry_blocking, RetryPolicy};
use super::DueTask;
use crate::error::StorageError;
use crate::services::post_service::{PostService, PublishOutcome};
use crate::services::profile_service::ProfileService;

/// Runs the publish task for every due [`DueTask`]
pub struct PublishWorker {
    posts: Arc<PostService>,
    policy: RetryPolicy,
}

impl PublishWorker {
    pub fn new(posts: Arc<PostService>, policy: RetryPolicy) -> Self {
        Self { posts, policy }
    }

    /// Publish one due task, retrying transient failures
    pub async fn handle(&self, task: DueTask) -> Result<PublishOutcome, StorageError> {
        let posts = self.posts.clone();
        let post_id = task.post_id.clone();
        debug!(post_id = %post_id, handle = %task.handle, "Running publish task");

        retry_blocking(&self.policy, "publish_post", move || posts.publish_scheduled(&post_id)).await
    }

    /// Consume due tasks until the scheduler side is dropped
    pub fn spawn(self, mut rx: UnboundedReceiver<DueTask>) -> JoinHandle<()> {
        let worker = Arc::new(self);
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let worker = worker.clone();
                tokio::spawn(async move {
                    let post_id = task.post_id.clone();
                    if let Err(e) = worker.handle(task).await {
                        warn!(post_id = %post_id, error = %e, "Publish task gave up");
                    }
                });
            }
            info!("Publish worker stopped");
        })
    }
}

/// Creates profiles for newly registered accounts
pub struct ProfileCreationWorker {
    profiles: Arc<ProfileService>,
    policy: RetryPolicy,
}

impl ProfileCreationWorker {
    pub fn new(profiles: Arc<ProfileService>, policy: RetryPolicy) -> Self {
        Self { profiles, policy }
    }

    pub async fn handle(&self, account_id: String) -> Result<(), StorageError> {
        let profiles = self.profiles.clone();
        retry_blocking(&self.policy, "create_profile", move || {
            profiles.get_or_create_profile(&account_id).map(|_| ())
        })
        .await
    }

    pub fn spawn(self, mut rx: UnboundedReceiver<String>) -> JoinHandle<()> {
        let worker = Arc::new(self);
        tokio::spawn(async move {
            while let Some(account_id) = rx.recv().await {
                let worker = worker.clone();
                tokio::spawn(async move {
                    if let Err(e) = worker.handle(account_id.clone()).await {
                        warn!(account_id = %account_id, error = %e, "Profile creation gave up");
                    }
                });
            }
            info!("Profile creation worker stopped");
        })
    }
}
