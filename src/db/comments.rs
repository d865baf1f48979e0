//! Comment storage: an adjacency list with a tombstone flag
//!
//! Deleting a comment only sets `is_deleted`; replies stay attached to it.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::sqlite::Sqlite;

use super::diesel_schema::{comments, posts, profiles};
use super::models::{current_timestamp, Comment, NewComment, PostStatus};
use super::pagination::{Paged, Pagination};
use crate::error::StorageError;

// ============================================================================
// Query Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentOrder {
    #[default]
    CreatedAsc,
    CreatedDesc,
    UpdatedAsc,
    UpdatedDesc,
}

impl CommentOrder {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        match raw.trim() {
            "" | "created_at" => Ok(CommentOrder::CreatedAsc),
            "-created_at" => Ok(CommentOrder::CreatedDesc),
            "updated_at" => Ok(CommentOrder::UpdatedAsc),
            "-updated_at" => Ok(CommentOrder::UpdatedDesc),
            other => Err(StorageError::field(
                "ordering",
                format!("Unknown ordering field '{}'.", other),
            )),
        }
    }
}

/// Live-comment listing filters
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    /// Restrict to comments on posts visible to this viewer
    pub visible_to: Option<(String, Vec<String>)>,
    pub post_id: Option<String>,
    pub parent_id: Option<String>,
    pub order: CommentOrder,
}

fn filtered(filter: &CommentFilter) -> comments::BoxedQuery<'_, Sqlite> {
    let mut query = comments::table
        .filter(comments::is_deleted.eq(0))
        .into_boxed();

    if let Some((ref viewer, ref following)) = filter.visible_to {
        query = query.filter(
            comments::post_id.eq_any(
                posts::table
                    .inner_join(profiles::table)
                    .filter(
                        posts::author_id.eq(viewer).or(posts::status
                            .eq(PostStatus::Published.as_str())
                            .and(
                                profiles::is_private
                                    .eq(0)
                                    .or(posts::author_id.eq_any(following)),
                            )),
                    )
                    .select(posts::id),
            ),
        );
    }

    if let Some(ref post_id) = filter.post_id {
        query = query.filter(comments::post_id.eq(post_id));
    }

    if let Some(ref parent_id) = filter.parent_id {
        query = query.filter(comments::parent_id.eq(parent_id));
    }

    query
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_comment(conn: &mut SqliteConnection, id: &str) -> Result<Option<Comment>, StorageError> {
    comments::table
        .filter(comments::id.eq(id))
        .select(Comment::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Page of live comments
pub fn list_comments(
    conn: &mut SqliteConnection,
    filter: &CommentFilter,
    page: Pagination,
) -> Result<Paged<Comment>, StorageError> {
    let total: i64 = filtered(filter).count().get_result(conn)?;

    let query = match filter.order {
        CommentOrder::CreatedAsc => filtered(filter).order(comments::created_at.asc()),
        CommentOrder::CreatedDesc => filtered(filter).order(comments::created_at.desc()),
        CommentOrder::UpdatedAsc => filtered(filter).order(comments::updated_at.asc()),
        CommentOrder::UpdatedDesc => filtered(filter).order(comments::updated_at.desc()),
    };

    let items = query
        .then_order_by(comments::id.asc())
        .select(Comment::as_select())
        .limit(page.limit())
        .offset(page.offset())
        .load(conn)?;

    Ok(Paged { items, total, page })
}

/// Live replies to `parent_id`, oldest first
pub fn live_children(
    conn: &mut SqliteConnection,
    parent_id: &str,
) -> Result<Vec<Comment>, StorageError> {
    comments::table
        .filter(comments::parent_id.eq(parent_id))
        .filter(comments::is_deleted.eq(0))
        .order((comments::created_at.asc(), comments::id.asc()))
        .select(Comment::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Live reply counts keyed by parent id
pub fn live_children_counts(
    conn: &mut SqliteConnection,
    parent_ids: &[String],
) -> Result<HashMap<String, i64>, StorageError> {
    if parent_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Option<String>, i64)> = comments::table
        .filter(comments::parent_id.eq_any(parent_ids))
        .filter(comments::is_deleted.eq(0))
        .group_by(comments::parent_id)
        .select((comments::parent_id, diesel::dsl::count_star()))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .filter_map(|(parent, count)| parent.map(|p| (p, count)))
        .collect())
}

/// Every comment on a post, tombstones included, oldest first
pub fn comments_for_post(
    conn: &mut SqliteConnection,
    post_id: &str,
) -> Result<Vec<Comment>, StorageError> {
    comments::table
        .filter(comments::post_id.eq(post_id))
        .order((comments::created_at.asc(), comments::id.asc()))
        .select(Comment::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Timestamp of the author's most recent comment, tombstones included
pub fn latest_comment_at(
    conn: &mut SqliteConnection,
    author_id: &str,
) -> Result<Option<String>, StorageError> {
    comments::table
        .filter(comments::author_id.eq(author_id))
        .order(comments::created_at.desc())
        .select(comments::created_at)
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Post ids the profile has live comments on
pub fn commented_post_ids(
    conn: &mut SqliteConnection,
    author_id: &str,
) -> Result<Vec<String>, StorageError> {
    comments::table
        .filter(comments::author_id.eq(author_id))
        .filter(comments::is_deleted.eq(0))
        .select(comments::post_id)
        .distinct()
        .load(conn)
        .map_err(StorageError::from)
}

// ============================================================================
// Write Operations
// ============================================================================

pub fn insert_comment(conn: &mut SqliteConnection, comment: &NewComment) -> Result<(), StorageError> {
    diesel::insert_into(comments::table)
        .values(comment)
        .execute(conn)?;
    Ok(())
}

pub fn update_content(
    conn: &mut SqliteConnection,
    id: &str,
    content: &str,
) -> Result<bool, StorageError> {
    let rows = diesel::update(
        comments::table
            .filter(comments::id.eq(id))
            .filter(comments::is_deleted.eq(0)),
    )
    .set((
        comments::content.eq(content),
        comments::updated_at.eq(current_timestamp()),
    ))
    .execute(conn)?;

    Ok(rows == 1)
}

/// Set the tombstone; returns true only on the live -> deleted transition
pub fn tombstone(conn: &mut SqliteConnection, id: &str) -> Result<bool, StorageError> {
    let rows = diesel::update(
        comments::table
            .filter(comments::id.eq(id))
            .filter(comments::is_deleted.eq(0)),
    )
    .set((
        comments::is_deleted.eq(1),
        comments::updated_at.eq(current_timestamp()),
    ))
    .execute(conn)?;

    Ok(rows == 1)
}
