//! Event system for social operations
//!
//! Events are broadcast after a mutation commits. Counters are not driven
//! from here; they move inside the transaction (see `counters`). Listeners
//! are for audit logging and notifications.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Social events emitted by services
#[derive(Debug, Clone)]
pub enum SocialEvent {
    // Account / profile events
    AccountRegistered {
        account_id: String,
    },
    ProfileCreated {
        profile_id: String,
        account_id: String,
    },
    ProfileUpdated {
        profile_id: String,
    },

    // Follow graph events
    FollowRequested {
        follower_id: String,
        following_id: String,
    },
    FollowAccepted {
        follower_id: String,
        following_id: String,
    },
    FollowRejected {
        follower_id: String,
        following_id: String,
    },
    Unfollowed {
        follower_id: String,
        following_id: String,
    },

    // Post lifecycle events
    PostCreated {
        id: String,
        author_id: String,
        status: String,
    },
    PostUpdated {
        id: String,
        status: String,
    },
    PostPublished {
        id: String,
        author_id: String,
        scheduled: bool,
    },
    PostDeleted {
        id: String,
    },
    PublishScheduled {
        id: String,
        handle: String,
        fire_at: String,
    },

    // Engagement events
    PostLiked {
        post_id: String,
        profile_id: String,
    },
    PostUnliked {
        post_id: String,
        profile_id: String,
    },
    CommentCreated {
        id: String,
        post_id: String,
        author_id: String,
    },
    CommentDeleted {
        id: String,
        post_id: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &SocialEvent);
}

/// Event bus for broadcasting social events
pub struct EventBus {
    sender: broadcast::Sender<SocialEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: SocialEvent) {
        trace!(event = ?event, "Emitting social event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SocialEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &SocialEvent) {
        match event {
            SocialEvent::AccountRegistered { account_id } => {
                info!(account_id = %account_id, "Account registered");
            }
            SocialEvent::FollowRequested { follower_id, following_id } => {
                debug!(follower = %follower_id, following = %following_id, "Follow requested");
            }
            SocialEvent::FollowAccepted { follower_id, following_id } => {
                debug!(follower = %follower_id, following = %following_id, "Follow accepted");
            }
            SocialEvent::PostCreated { id, author_id, status } => {
                debug!(id = %id, author = %author_id, status = %status, "Post created");
            }
            SocialEvent::PostPublished { id, author_id, scheduled } => {
                info!(id = %id, author = %author_id, scheduled = scheduled, "Post published");
            }
            SocialEvent::PostDeleted { id } => {
                debug!(id = %id, "Post deleted");
            }
            SocialEvent::PublishScheduled { id, handle, fire_at } => {
                debug!(id = %id, handle = %handle, fire_at = %fire_at, "Publish scheduled");
            }
            _ => {
                trace!(event = ?event, "Social event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(SocialEvent::PostPublished {
            id: "post-1".into(),
            author_id: "alice".into(),
            scheduled: true,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            SocialEvent::PostPublished { id, scheduled, .. } => {
                assert_eq!(id, "post-1");
                assert!(scheduled);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        // Should not panic even with no subscribers
        bus.emit(SocialEvent::PostDeleted { id: "post".into() });
    }
}
