//! Follow edge operations
//!
//! One edge per ordered (follower, following) pair; the status column carries
//! the request workflow.

use std::collections::HashMap;

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::follows;
use super::models::{current_timestamp, Follow, FollowStatus, NewFollow};
use crate::error::StorageError;

// ============================================================================
// Read Operations
// ============================================================================

/// Edge follower -> following, any status
pub fn get_follow(
    conn: &mut SqliteConnection,
    follower_id: &str,
    following_id: &str,
) -> Result<Option<Follow>, StorageError> {
    follows::table
        .filter(follows::follower_id.eq(follower_id))
        .filter(follows::following_id.eq(following_id))
        .select(Follow::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Profiles `follower_id` follows with an accepted edge
pub fn accepted_following_ids(
    conn: &mut SqliteConnection,
    follower_id: &str,
) -> Result<Vec<String>, StorageError> {
    follows::table
        .filter(follows::follower_id.eq(follower_id))
        .filter(follows::status.eq(FollowStatus::Accepted.as_str()))
        .select(follows::following_id)
        .load(conn)
        .map_err(StorageError::from)
}

/// Inbound pending edges, newest first
pub fn pending_requests(
    conn: &mut SqliteConnection,
    following_id: &str,
) -> Result<Vec<Follow>, StorageError> {
    follows::table
        .filter(follows::following_id.eq(following_id))
        .filter(follows::status.eq(FollowStatus::Pending.as_str()))
        .order(follows::created_at.desc())
        .select(Follow::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Status of the viewer's edges toward each of `targets`
pub fn statuses_toward(
    conn: &mut SqliteConnection,
    follower_id: &str,
    targets: &[String],
) -> Result<HashMap<String, FollowStatus>, StorageError> {
    if targets.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(String, String)> = follows::table
        .filter(follows::follower_id.eq(follower_id))
        .filter(follows::following_id.eq_any(targets))
        .select((follows::following_id, follows::status))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, status)| status.parse().ok().map(|s| (id, s)))
        .collect())
}

/// Number of accepted inbound edges
pub fn count_accepted_followers(
    conn: &mut SqliteConnection,
    following_id: &str,
) -> Result<i64, StorageError> {
    follows::table
        .filter(follows::following_id.eq(following_id))
        .filter(follows::status.eq(FollowStatus::Accepted.as_str()))
        .count()
        .get_result(conn)
        .map_err(StorageError::from)
}

// ============================================================================
// Write Operations
// ============================================================================

pub fn insert_follow(
    conn: &mut SqliteConnection,
    follower_id: &str,
    following_id: &str,
    status: FollowStatus,
) -> Result<Follow, StorageError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    diesel::insert_into(follows::table)
        .values(&NewFollow {
            id: &id,
            follower_id,
            following_id,
            status: status.as_str(),
            created_at: &now,
            updated_at: &now,
        })
        .execute(conn)?;

    Ok(Follow {
        id,
        follower_id: follower_id.to_string(),
        following_id: following_id.to_string(),
        status: status.as_str().to_string(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Move an edge from `from` to `to`; returns false when the edge is not in `from`
pub fn transition_status(
    conn: &mut SqliteConnection,
    follower_id: &str,
    following_id: &str,
    from: FollowStatus,
    to: FollowStatus,
) -> Result<bool, StorageError> {
    let rows = diesel::update(
        follows::table
            .filter(follows::follower_id.eq(follower_id))
            .filter(follows::following_id.eq(following_id))
            .filter(follows::status.eq(from.as_str())),
    )
    .set((
        follows::status.eq(to.as_str()),
        follows::updated_at.eq(current_timestamp()),
    ))
    .execute(conn)?;

    Ok(rows == 1)
}

/// Reset an existing edge to `status` whatever it was before
pub fn set_status(
    conn: &mut SqliteConnection,
    follow_id: &str,
    status: FollowStatus,
) -> Result<(), StorageError> {
    diesel::update(follows::table.filter(follows::id.eq(follow_id)))
        .set((
            follows::status.eq(status.as_str()),
            follows::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Delete the edge, returning it if one existed
pub fn delete_follow(
    conn: &mut SqliteConnection,
    follower_id: &str,
    following_id: &str,
) -> Result<Option<Follow>, StorageError> {
    let existing = get_follow(conn, follower_id, following_id)?;
    if let Some(ref edge) = existing {
        diesel::delete(follows::table.filter(follows::id.eq(&edge.id))).execute(conn)?;
    }
    Ok(existing)
}
