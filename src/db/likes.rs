//! Like rows: at most one per (post, profile)

use std::collections::HashSet;

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::likes;
use super::models::{current_timestamp, NewLike};
use crate::error::StorageError;

/// Insert a like; returns true only when a new row was created
pub fn insert_like(
    conn: &mut SqliteConnection,
    post_id: &str,
    profile_id: &str,
) -> Result<bool, StorageError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    let rows = diesel::insert_or_ignore_into(likes::table)
        .values(&NewLike {
            id: &id,
            post_id,
            profile_id,
            created_at: &now,
        })
        .execute(conn)?;

    Ok(rows == 1)
}

/// Delete a like; returns true only when a row was removed
pub fn delete_like(
    conn: &mut SqliteConnection,
    post_id: &str,
    profile_id: &str,
) -> Result<bool, StorageError> {
    let rows = diesel::delete(
        likes::table
            .filter(likes::post_id.eq(post_id))
            .filter(likes::profile_id.eq(profile_id)),
    )
    .execute(conn)?;

    Ok(rows > 0)
}

pub fn is_liked(
    conn: &mut SqliteConnection,
    post_id: &str,
    profile_id: &str,
) -> Result<bool, StorageError> {
    let count: i64 = likes::table
        .filter(likes::post_id.eq(post_id))
        .filter(likes::profile_id.eq(profile_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Post ids the profile liked, most recent first
pub fn liked_post_ids(
    conn: &mut SqliteConnection,
    profile_id: &str,
) -> Result<Vec<String>, StorageError> {
    likes::table
        .filter(likes::profile_id.eq(profile_id))
        .order(likes::created_at.desc())
        .select(likes::post_id)
        .load(conn)
        .map_err(StorageError::from)
}

pub fn count_likes(conn: &mut SqliteConnection, post_id: &str) -> Result<i64, StorageError> {
    likes::table
        .filter(likes::post_id.eq(post_id))
        .count()
        .get_result(conn)
        .map_err(StorageError::from)
}

/// Which of `post_ids` the profile liked
pub fn liked_among(
    conn: &mut SqliteConnection,
    profile_id: &str,
    post_ids: &[String],
) -> Result<HashSet<String>, StorageError> {
    if post_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<String> = likes::table
        .filter(likes::profile_id.eq(profile_id))
        .filter(likes::post_id.eq_any(post_ids))
        .select(likes::post_id)
        .load(conn)?;
    Ok(rows.into_iter().collect())
}
