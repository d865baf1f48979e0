//! Counter maintenance
//!
//! Services describe what happened as a [`CounterEvent`] and apply it with
//! the connection of the enclosing transaction, so a counter moves if and
//! only if the mutation that caused it commits.

use diesel::SqliteConnection;
use tracing::trace;

use crate::db::posts::{self, PostCounter};
use crate::db::profiles::{self, Delta, ProfileCounter};
use crate::error::StorageError;

/// Domain event with a counter consequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterEvent {
    /// An edge became accepted
    FollowAccepted { follower_id: String, following_id: String },
    /// An accepted edge was removed or left the accepted state
    FollowDropped { follower_id: String, following_id: String },
    PostPublished { author_id: String },
    PostUnpublished { author_id: String },
    LikeAdded { post_id: String },
    LikeRemoved { post_id: String },
    CommentAdded { post_id: String },
    CommentRemoved { post_id: String },
}

impl CounterEvent {
    /// Counter event for a post transition, if published-ness changed
    pub fn for_published_delta(author_id: &str, delta: i8) -> Option<Self> {
        match delta {
            1 => Some(CounterEvent::PostPublished { author_id: author_id.to_string() }),
            -1 => Some(CounterEvent::PostUnpublished { author_id: author_id.to_string() }),
            _ => None,
        }
    }
}

pub struct Counters;

impl Counters {
    /// Apply one event. Must be called inside the mutation's transaction.
    pub fn apply(conn: &mut SqliteConnection, event: &CounterEvent) -> Result<(), StorageError> {
        trace!(event = ?event, "Applying counter event");

        match event {
            CounterEvent::FollowAccepted { follower_id, following_id } => {
                profiles::adjust_counter(conn, follower_id, ProfileCounter::Following, Delta::Increment)?;
                profiles::adjust_counter(conn, following_id, ProfileCounter::Followers, Delta::Increment)?;
            }
            CounterEvent::FollowDropped { follower_id, following_id } => {
                profiles::adjust_counter(conn, follower_id, ProfileCounter::Following, Delta::Decrement)?;
                profiles::adjust_counter(conn, following_id, ProfileCounter::Followers, Delta::Decrement)?;
            }
            CounterEvent::PostPublished { author_id } => {
                profiles::adjust_counter(conn, author_id, ProfileCounter::Posts, Delta::Increment)?;
            }
            CounterEvent::PostUnpublished { author_id } => {
                profiles::adjust_counter(conn, author_id, ProfileCounter::Posts, Delta::Decrement)?;
            }
            CounterEvent::LikeAdded { post_id } => {
                posts::adjust_counter(conn, post_id, PostCounter::Likes, Delta::Increment)?;
            }
            CounterEvent::LikeRemoved { post_id } => {
                posts::adjust_counter(conn, post_id, PostCounter::Likes, Delta::Decrement)?;
            }
            CounterEvent::CommentAdded { post_id } => {
                posts::adjust_counter(conn, post_id, PostCounter::Comments, Delta::Increment)?;
            }
            CounterEvent::CommentRemoved { post_id } => {
                posts::adjust_counter(conn, post_id, PostCounter::Comments, Delta::Decrement)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{accounts, Db};
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Db, String, String) {
        let dir = TempDir::new().unwrap();
        let db = Db::open_at(&dir.path().join("c.db"), 1, Duration::from_millis(500)).unwrap();
        let mut conn = db.conn().unwrap();
        let a = accounts::create_account(&mut conn, "a@example.com").unwrap();
        let b = accounts::create_account(&mut conn, "b@example.com").unwrap();
        let pa = profiles::get_or_create_profile(&mut conn, &a.id).unwrap();
        let pb = profiles::get_or_create_profile(&mut conn, &b.id).unwrap();
        drop(conn);
        (dir, db, pa.id, pb.id)
    }

    #[test]
    fn test_follow_counters_move_both_sides() {
        let (_dir, db, a, b) = setup();
        let mut conn = db.conn().unwrap();
        Counters::apply(
            &mut conn,
            &CounterEvent::FollowAccepted { follower_id: a.clone(), following_id: b.clone() },
        )
        .unwrap();

        let pa = profiles::get_profile(&mut conn, &a).unwrap().unwrap();
        let pb = profiles::get_profile(&mut conn, &b).unwrap().unwrap();
        assert_eq!(pa.following_count, 1);
        assert_eq!(pb.followers_count, 1);
    }

    #[test]
    fn test_decrement_never_goes_negative() {
        let (_dir, db, a, b) = setup();
        let mut conn = db.conn().unwrap();
        let dropped = CounterEvent::FollowDropped { follower_id: a.clone(), following_id: b.clone() };
        Counters::apply(&mut conn, &dropped).unwrap();
        Counters::apply(&mut conn, &dropped).unwrap();

        let pb = profiles::get_profile(&mut conn, &b).unwrap().unwrap();
        assert_eq!(pb.followers_count, 0);
    }

    #[test]
    fn test_published_delta_mapping() {
        assert_eq!(
            CounterEvent::for_published_delta("a", 1),
            Some(CounterEvent::PostPublished { author_id: "a".into() })
        );
        assert_eq!(CounterEvent::for_published_delta("a", 0), None);
    }
}
