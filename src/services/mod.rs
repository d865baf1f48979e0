//! Service layer for agora
//!
//! Services encapsulate business logic between HTTP handlers and repositories.
//! Each service wraps database operations with:
//! - Input validation
//! - Visibility checks against the [`RequestContext`](crate::db::RequestContext)
//! - Transaction boundaries and counter maintenance
//! - Event emission for audit logging
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     |
//! Service Layer (business logic)      scheduler (deferred publish)
//!     |                                   |
//! Repository Layer (db/*.rs) <------------+
//!     |
//! SQLite Database
//! ```

pub mod comment_service;
pub mod counters;
pub mod events;
pub mod follow_service;
pub mod like_service;
pub mod post_service;
pub mod profile_service;
pub mod response;

// Re-exports
pub use comment_service::CommentService;
pub use counters::{CounterEvent, Counters};
pub use events::{spawn_logging_listener, EventBus, EventListener, SocialEvent};
pub use follow_service::{FollowOutcome, FollowService, UnfollowOutcome};
pub use like_service::{LikeService, LikeStatus};
pub use post_service::{PostService, PublishOutcome};
pub use profile_service::ProfileService;
pub use response::*;

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::Config;
use crate::db::Db;
use crate::scheduler::TaskScheduler;

/// Service container for dependency injection
///
/// Holds all services with a shared database and event bus.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub profiles: Arc<ProfileService>,
    pub follows: Arc<FollowService>,
    pub posts: Arc<PostService>,
    pub likes: Arc<LikeService>,
    pub comments: Arc<CommentService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<Db>, scheduler: Arc<dyn TaskScheduler>, config: &Config) -> Self {
        Self::build(db, scheduler, config, None)
    }

    /// Like [`Services::new`], with profile creation handed to a background worker
    pub fn with_profile_queue(
        db: Arc<Db>,
        scheduler: Arc<dyn TaskScheduler>,
        config: &Config,
        profile_queue: UnboundedSender<String>,
    ) -> Self {
        Self::build(db, scheduler, config, Some(profile_queue))
    }

    fn build(
        db: Arc<Db>,
        scheduler: Arc<dyn TaskScheduler>,
        config: &Config,
        profile_queue: Option<UnboundedSender<String>>,
    ) -> Self {
        let events = Arc::new(EventBus::new());

        let mut profiles = ProfileService::new(db.clone(), events.clone());
        if let Some(queue) = profile_queue {
            profiles = profiles.with_creation_queue(queue);
        }

        Self {
            profiles: Arc::new(profiles),
            follows: Arc::new(FollowService::new(db.clone(), events.clone())),
            posts: Arc::new(PostService::new(db.clone(), events.clone(), scheduler)),
            likes: Arc::new(LikeService::new(db.clone(), events.clone())),
            comments: Arc::new(CommentService::new(db, events.clone(), config.comment_min_interval())),
            events,
        }
    }
}
