//! Profile operations and the atomic counter primitives
//!
//! Counters are only ever moved by one step with database-level arithmetic;
//! decrements are guarded so a counter never drops below zero.

use std::collections::HashMap;

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::{accounts, profiles};
use super::models::{current_timestamp, NewProfile, Profile, ProfileChangeset, ProfileWithEmail};
use super::pagination::{Paged, Pagination};
use crate::error::StorageError;

/// Denormalized profile counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileCounter {
    Followers,
    Following,
    Posts,
}

/// One-step counter movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Increment,
    Decrement,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_profile(conn: &mut SqliteConnection, id: &str) -> Result<Option<Profile>, StorageError> {
    profiles::table
        .filter(profiles::id.eq(id))
        .select(Profile::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

pub fn get_profile_by_account(
    conn: &mut SqliteConnection,
    account_id: &str,
) -> Result<Option<Profile>, StorageError> {
    profiles::table
        .filter(profiles::account_id.eq(account_id))
        .select(Profile::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Profile joined with its account email
pub fn get_profile_with_email(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<ProfileWithEmail>, StorageError> {
    let row: Option<(Profile, String)> = profiles::table
        .inner_join(accounts::table)
        .filter(profiles::id.eq(id))
        .select((Profile::as_select(), accounts::email))
        .first(conn)
        .optional()?;

    Ok(row.map(|(profile, email)| ProfileWithEmail { profile, email }))
}

/// Batch lookup keyed by profile id
pub fn get_profiles_with_email(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<HashMap<String, ProfileWithEmail>, StorageError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Profile, String)> = profiles::table
        .inner_join(accounts::table)
        .filter(profiles::id.eq_any(ids))
        .select((Profile::as_select(), accounts::email))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(profile, email)| (profile.id.clone(), ProfileWithEmail { profile, email }))
        .collect())
}

/// List profiles, optionally excluding one (the viewer's own)
pub fn list_profiles(
    conn: &mut SqliteConnection,
    exclude: Option<&str>,
    page: Pagination,
) -> Result<Paged<ProfileWithEmail>, StorageError> {
    let mut count_query = profiles::table.into_boxed();
    let mut query = profiles::table
        .inner_join(accounts::table)
        .select((Profile::as_select(), accounts::email))
        .into_boxed();

    if let Some(id) = exclude {
        count_query = count_query.filter(profiles::id.ne(id));
        query = query.filter(profiles::id.ne(id));
    }

    let total: i64 = count_query.count().get_result(conn)?;
    let rows: Vec<(Profile, String)> = query
        .order((profiles::first_name.asc(), profiles::last_name.asc(), profiles::created_at.asc()))
        .limit(page.limit())
        .offset(page.offset())
        .load(conn)?;

    Ok(Paged {
        items: rows
            .into_iter()
            .map(|(profile, email)| ProfileWithEmail { profile, email })
            .collect(),
        total,
        page,
    })
}

// ============================================================================
// Write Operations
// ============================================================================

/// Fetch the profile for an account, creating it if absent
///
/// Concurrent callers race on the unique `account_id`; the loser's insert is
/// ignored and both read the same row.
pub fn get_or_create_profile(
    conn: &mut SqliteConnection,
    account_id: &str,
) -> Result<Profile, StorageError> {
    if let Some(profile) = get_profile_by_account(conn, account_id)? {
        return Ok(profile);
    }

    let account_exists: i64 = accounts::table
        .filter(accounts::id.eq(account_id))
        .count()
        .get_result(conn)?;
    if account_exists == 0 {
        return Err(StorageError::NotFound(format!("account {}", account_id)));
    }

    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    diesel::insert_or_ignore_into(profiles::table)
        .values(&NewProfile {
            id: &id,
            account_id,
            created_at: &now,
            updated_at: &now,
        })
        .execute(conn)?;

    get_profile_by_account(conn, account_id)?
        .ok_or_else(|| StorageError::Internal(format!("profile for account {} vanished", account_id)))
}

pub fn update_profile(
    conn: &mut SqliteConnection,
    id: &str,
    mut changes: ProfileChangeset,
) -> Result<Profile, StorageError> {
    changes.updated_at = Some(current_timestamp());

    let updated = diesel::update(profiles::table.filter(profiles::id.eq(id)))
        .set(&changes)
        .execute(conn)?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("profile {}", id)));
    }

    get_profile(conn, id)?.ok_or_else(|| StorageError::NotFound(format!("profile {}", id)))
}

// ============================================================================
// Counter Operations
// ============================================================================

/// Move one counter by one step. Returns rows touched (0 when clamped).
pub fn adjust_counter(
    conn: &mut SqliteConnection,
    id: &str,
    counter: ProfileCounter,
    delta: Delta,
) -> Result<usize, StorageError> {
    let target = profiles::table.filter(profiles::id.eq(id));

    let rows = match (counter, delta) {
        (ProfileCounter::Followers, Delta::Increment) => diesel::update(target)
            .set(profiles::followers_count.eq(profiles::followers_count + 1))
            .execute(conn)?,
        (ProfileCounter::Followers, Delta::Decrement) => {
            diesel::update(target.filter(profiles::followers_count.gt(0)))
                .set(profiles::followers_count.eq(profiles::followers_count - 1))
                .execute(conn)?
        }
        (ProfileCounter::Following, Delta::Increment) => diesel::update(target)
            .set(profiles::following_count.eq(profiles::following_count + 1))
            .execute(conn)?,
        (ProfileCounter::Following, Delta::Decrement) => {
            diesel::update(target.filter(profiles::following_count.gt(0)))
                .set(profiles::following_count.eq(profiles::following_count - 1))
                .execute(conn)?
        }
        (ProfileCounter::Posts, Delta::Increment) => diesel::update(target)
            .set(profiles::posts_count.eq(profiles::posts_count + 1))
            .execute(conn)?,
        (ProfileCounter::Posts, Delta::Decrement) => {
            diesel::update(target.filter(profiles::posts_count.gt(0)))
                .set(profiles::posts_count.eq(profiles::posts_count - 1))
                .execute(conn)?
        }
    };

    Ok(rows)
}
