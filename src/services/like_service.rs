//! Like service - idempotent like / unlike with the post's like counter

use std::sync::Arc;

use serde::Serialize;

use crate::db::models::Post;
use crate::db::{likes, posts, profiles, Db, RequestContext};
use crate::error::StorageError;
use crate::visibility::{can_view_post, Visibility};

use super::counters::{CounterEvent, Counters};
use super::events::{EventBus, SocialEvent};

/// Like state of one post for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeStatus {
    pub liked: bool,
    pub likes_count: i32,
}

/// Like service
pub struct LikeService {
    db: Arc<Db>,
    events: Arc<EventBus>,
}

impl LikeService {
    pub fn new(db: Arc<Db>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn status(&self, ctx: &RequestContext, post_id: &str) -> Result<LikeStatus, StorageError> {
        let me = ctx.require_profile()?;
        self.db.with_conn(|conn| {
            let post = visible_post(conn, ctx, post_id)?;
            Ok(LikeStatus {
                liked: likes::is_liked(conn, post_id, me)?,
                likes_count: post.likes_count,
            })
        })
    }

    /// Like a post; repeating it changes nothing
    pub fn like(&self, ctx: &RequestContext, post_id: &str) -> Result<LikeStatus, StorageError> {
        let me = ctx.require_profile()?;

        let (created, status) = self.db.with_write_txn(|conn| {
            visible_post(conn, ctx, post_id)?;
            let created = likes::insert_like(conn, post_id, me)?;
            if created {
                Counters::apply(conn, &CounterEvent::LikeAdded { post_id: post_id.to_string() })?;
            }
            Ok((created, current_status(conn, post_id, true)?))
        })?;

        if created {
            self.events.emit(SocialEvent::PostLiked {
                post_id: post_id.to_string(),
                profile_id: me.to_string(),
            });
        }
        Ok(status)
    }

    /// Remove the caller's like; repeating it changes nothing
    pub fn unlike(&self, ctx: &RequestContext, post_id: &str) -> Result<LikeStatus, StorageError> {
        let me = ctx.require_profile()?;

        let (removed, status) = self.db.with_write_txn(|conn| {
            visible_post(conn, ctx, post_id)?;
            let removed = likes::delete_like(conn, post_id, me)?;
            if removed {
                Counters::apply(conn, &CounterEvent::LikeRemoved { post_id: post_id.to_string() })?;
            }
            Ok((removed, current_status(conn, post_id, false)?))
        })?;

        if removed {
            self.events.emit(SocialEvent::PostUnliked {
                post_id: post_id.to_string(),
                profile_id: me.to_string(),
            });
        }
        Ok(status)
    }
}

/// Load a post the viewer can fully see
fn visible_post(
    conn: &mut diesel::SqliteConnection,
    ctx: &RequestContext,
    post_id: &str,
) -> Result<Post, StorageError> {
    let post = posts::get_post(conn, post_id)?
        .ok_or_else(|| StorageError::NotFound(format!("post {}", post_id)))?;
    let author = profiles::get_profile(conn, &post.author_id)?
        .ok_or_else(|| StorageError::Internal(format!("author of post {} missing", post_id)))?;

    if can_view_post(ctx, &post, &author) == Visibility::None {
        return Err(StorageError::Forbidden(
            "You do not have permission to perform this action.".into(),
        ));
    }
    Ok(post)
}

fn current_status(
    conn: &mut diesel::SqliteConnection,
    post_id: &str,
    liked: bool,
) -> Result<LikeStatus, StorageError> {
    let post = posts::get_post(conn, post_id)?
        .ok_or_else(|| StorageError::NotFound(format!("post {}", post_id)))?;
    Ok(LikeStatus {
        liked,
        likes_count: post.likes_count,
    })
}
