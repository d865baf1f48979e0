//! Follow service - the follow request workflow
//!
//! Edge status and the follower/following counters change in the same
//! `BEGIN IMMEDIATE` transaction.

use std::sync::Arc;

use diesel::SqliteConnection;
use tracing::debug;

use crate::db::models::{Follow, FollowStatus, Profile, ProfileWithEmail};
use crate::db::{follows, profiles, Db, RequestContext};
use crate::error::StorageError;

use super::counters::{CounterEvent, Counters};
use super::events::{EventBus, SocialEvent};

const REQUEST_NOT_PENDING: &str = "Request not found or it not in status Pending.";

/// Result of a follow request
#[derive(Debug, Clone)]
pub enum FollowOutcome {
    /// New accepted edge
    Created(Follow),
    /// Already following, or a stale edge to a public profile was accepted
    Existing(Follow),
    /// Waiting for the target to accept
    Pending(Follow),
}

impl FollowOutcome {
    pub fn follow(&self) -> &Follow {
        match self {
            FollowOutcome::Created(f) | FollowOutcome::Existing(f) | FollowOutcome::Pending(f) => f,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FollowOutcome::Pending(_) => "Request to following was sent (Pending).",
            _ => "Get Follow (Accepted).",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
}

impl UnfollowOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            UnfollowOutcome::Unfollowed => "Unfollow.",
            UnfollowOutcome::NotFollowing => "Follow not exist.",
        }
    }
}

/// Inbound pending request with the requester's profile
#[derive(Debug, Clone)]
pub struct FollowRequest {
    pub follow: Follow,
    pub follower: ProfileWithEmail,
}

/// Follow service
pub struct FollowService {
    db: Arc<Db>,
    events: Arc<EventBus>,
}

impl FollowService {
    pub fn new(db: Arc<Db>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Requests waiting on the caller's decision, newest first
    pub fn pending_requests(&self, ctx: &RequestContext) -> Result<Vec<FollowRequest>, StorageError> {
        let me = ctx.require_profile()?;
        self.db.with_conn(|conn| {
            let pending = follows::pending_requests(conn, me)?;
            let ids: Vec<String> = pending.iter().map(|f| f.follower_id.clone()).collect();
            let mut followers = profiles::get_profiles_with_email(conn, &ids)?;

            Ok(pending
                .into_iter()
                .filter_map(|follow| {
                    followers
                        .remove(&follow.follower_id)
                        .map(|follower| FollowRequest { follow, follower })
                })
                .collect())
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Follow `target_id`: accepted at once for public targets, pending for private
    pub fn follow(&self, ctx: &RequestContext, target_id: &str) -> Result<FollowOutcome, StorageError> {
        let me = ctx.require_profile()?;

        let outcome = self.db.with_write_txn(|conn| {
            let target = load_target(conn, target_id)?;
            if target.id == me {
                return Err(StorageError::InvalidInput("Cannot follow yourself.".into()));
            }

            let Some(edge) = follows::get_follow(conn, me, target_id)? else {
                let status = if target.is_private() {
                    FollowStatus::Pending
                } else {
                    FollowStatus::Accepted
                };
                let follow = follows::insert_follow(conn, me, target_id, status)?;
                if status == FollowStatus::Pending {
                    return Ok(FollowOutcome::Pending(follow));
                }
                Counters::apply(conn, &accepted(me, target_id))?;
                return Ok(FollowOutcome::Created(follow));
            };

            match edge.status() {
                FollowStatus::Accepted => Ok(FollowOutcome::Existing(edge)),
                _ if target.is_private() => {
                    follows::set_status(conn, &edge.id, FollowStatus::Pending)?;
                    Ok(FollowOutcome::Pending(with_status(edge, FollowStatus::Pending)))
                }
                _ => {
                    follows::set_status(conn, &edge.id, FollowStatus::Accepted)?;
                    Counters::apply(conn, &accepted(me, target_id))?;
                    Ok(FollowOutcome::Existing(with_status(edge, FollowStatus::Accepted)))
                }
            }
        })?;

        debug!(follower = %me, following = %target_id, status = %outcome.follow().status, "Follow");
        let event = match outcome {
            FollowOutcome::Pending(_) => SocialEvent::FollowRequested {
                follower_id: me.to_string(),
                following_id: target_id.to_string(),
            },
            _ => SocialEvent::FollowAccepted {
                follower_id: me.to_string(),
                following_id: target_id.to_string(),
            },
        };
        self.events.emit(event);

        Ok(outcome)
    }

    /// Remove the caller's edge toward `target_id`, whatever its status
    pub fn unfollow(&self, ctx: &RequestContext, target_id: &str) -> Result<UnfollowOutcome, StorageError> {
        let me = ctx.require_profile()?;

        let outcome = self.db.with_write_txn(|conn| {
            let target = load_target(conn, target_id)?;
            if target.id == me {
                return Err(StorageError::InvalidInput("Cannot unfollow yourself.".into()));
            }

            match follows::delete_follow(conn, me, target_id)? {
                None => Ok(UnfollowOutcome::NotFollowing),
                Some(edge) => {
                    if edge.status() == FollowStatus::Accepted {
                        Counters::apply(
                            conn,
                            &CounterEvent::FollowDropped {
                                follower_id: me.to_string(),
                                following_id: target_id.to_string(),
                            },
                        )?;
                    }
                    Ok(UnfollowOutcome::Unfollowed)
                }
            }
        })?;

        if outcome == UnfollowOutcome::Unfollowed {
            self.events.emit(SocialEvent::Unfollowed {
                follower_id: me.to_string(),
                following_id: target_id.to_string(),
            });
        }
        Ok(outcome)
    }

    /// Accept a pending request from `follower_id` to the caller
    pub fn accept(&self, ctx: &RequestContext, follower_id: &str) -> Result<Follow, StorageError> {
        let me = ctx.require_profile()?;

        let follow = self.db.with_write_txn(|conn| {
            let moved = follows::transition_status(
                conn,
                follower_id,
                me,
                FollowStatus::Pending,
                FollowStatus::Accepted,
            )?;
            if !moved {
                return Err(StorageError::NotFound(REQUEST_NOT_PENDING.into()));
            }
            Counters::apply(conn, &accepted(follower_id, me))?;
            follows::get_follow(conn, follower_id, me)?
                .ok_or_else(|| StorageError::NotFound(REQUEST_NOT_PENDING.into()))
        })?;

        self.events.emit(SocialEvent::FollowAccepted {
            follower_id: follower_id.to_string(),
            following_id: me.to_string(),
        });
        Ok(follow)
    }

    /// Reject a pending request from `follower_id` to the caller
    pub fn reject(&self, ctx: &RequestContext, follower_id: &str) -> Result<Follow, StorageError> {
        let me = ctx.require_profile()?;

        let follow = self.db.with_write_txn(|conn| {
            let moved = follows::transition_status(
                conn,
                follower_id,
                me,
                FollowStatus::Pending,
                FollowStatus::Rejected,
            )?;
            if !moved {
                return Err(StorageError::NotFound(REQUEST_NOT_PENDING.into()));
            }
            follows::get_follow(conn, follower_id, me)?
                .ok_or_else(|| StorageError::NotFound(REQUEST_NOT_PENDING.into()))
        })?;

        self.events.emit(SocialEvent::FollowRejected {
            follower_id: follower_id.to_string(),
            following_id: me.to_string(),
        });
        Ok(follow)
    }
}

fn load_target(conn: &mut SqliteConnection, id: &str) -> Result<Profile, StorageError> {
    profiles::get_profile(conn, id)?.ok_or_else(|| StorageError::NotFound(format!("profile {}", id)))
}

fn accepted(follower_id: &str, following_id: &str) -> CounterEvent {
    CounterEvent::FollowAccepted {
        follower_id: follower_id.to_string(),
        following_id: following_id.to_string(),
    }
}

fn with_status(mut follow: Follow, status: FollowStatus) -> Follow {
    follow.status = status.as_str().to_string();
    follow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::accounts;
    use crate::db::models::ProfileChangeset;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Arc<Db>,
        service: FollowService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Db::open_at(&dir.path().join("f.db"), 2, Duration::from_millis(500)).unwrap());
        let service = FollowService::new(db.clone(), Arc::new(EventBus::new()));
        Fixture { _dir: dir, db, service }
    }

    fn profile(db: &Db, email: &str, private: bool) -> String {
        let mut conn = db.conn().unwrap();
        let account = accounts::create_account(&mut conn, email).unwrap();
        let profile = profiles::get_or_create_profile(&mut conn, &account.id).unwrap();
        if private {
            profiles::update_profile(
                &mut conn,
                &profile.id,
                ProfileChangeset {
                    is_private: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        profile.id
    }

    fn ctx(id: &str) -> RequestContext {
        RequestContext::for_profile(id, Vec::new())
    }

    fn counts(db: &Db, id: &str) -> (i32, i32) {
        let mut conn = db.conn().unwrap();
        let p = profiles::get_profile(&mut conn, id).unwrap().unwrap();
        (p.followers_count, p.following_count)
    }

    #[test]
    fn test_follow_public_is_accepted_once() {
        let f = fixture();
        let a = profile(&f.db, "a@example.com", false);
        let b = profile(&f.db, "b@example.com", false);

        assert!(matches!(f.service.follow(&ctx(&a), &b).unwrap(), FollowOutcome::Created(_)));
        assert!(matches!(f.service.follow(&ctx(&a), &b).unwrap(), FollowOutcome::Existing(_)));
        assert_eq!(counts(&f.db, &b), (1, 0));
        assert_eq!(counts(&f.db, &a), (0, 1));
    }

    #[test]
    fn test_self_follow_rejected() {
        let f = fixture();
        let a = profile(&f.db, "a@example.com", false);
        assert!(matches!(
            f.service.follow(&ctx(&a), &a),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.unfollow(&ctx(&a), &a),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_private_follow_waits_for_accept() {
        let f = fixture();
        let a = profile(&f.db, "a@example.com", true);
        let b = profile(&f.db, "b@example.com", false);

        assert!(matches!(f.service.follow(&ctx(&b), &a).unwrap(), FollowOutcome::Pending(_)));
        assert_eq!(counts(&f.db, &a), (0, 0));

        let requests = f.service.pending_requests(&ctx(&a)).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].follower.profile.id, b);

        let accepted = f.service.accept(&ctx(&a), &b).unwrap();
        assert_eq!(accepted.status(), FollowStatus::Accepted);
        assert_eq!(counts(&f.db, &a), (1, 0));
        assert_eq!(counts(&f.db, &b), (0, 1));

        // Second accept finds no pending request
        assert!(matches!(f.service.accept(&ctx(&a), &b), Err(StorageError::NotFound(_))));
        assert_eq!(counts(&f.db, &a), (1, 0));
    }

    #[test]
    fn test_rejected_request_resets_to_pending() {
        let f = fixture();
        let a = profile(&f.db, "a@example.com", true);
        let b = profile(&f.db, "b@example.com", false);

        f.service.follow(&ctx(&b), &a).unwrap();
        f.service.reject(&ctx(&a), &b).unwrap();
        assert!(f.service.pending_requests(&ctx(&a)).unwrap().is_empty());

        let again = f.service.follow(&ctx(&b), &a).unwrap();
        assert_eq!(again.follow().status(), FollowStatus::Pending);
        assert_eq!(f.service.pending_requests(&ctx(&a)).unwrap().len(), 1);
    }

    #[test]
    fn test_unfollow_drops_counters_only_for_accepted() {
        let f = fixture();
        let a = profile(&f.db, "a@example.com", false);
        let b = profile(&f.db, "b@example.com", false);

        assert_eq!(f.service.unfollow(&ctx(&a), &b).unwrap(), UnfollowOutcome::NotFollowing);
        f.service.follow(&ctx(&a), &b).unwrap();
        assert_eq!(f.service.unfollow(&ctx(&a), &b).unwrap(), UnfollowOutcome::Unfollowed);
        assert_eq!(counts(&f.db, &b), (0, 0));
        assert_eq!(counts(&f.db, &a), (0, 0));
    }
}
