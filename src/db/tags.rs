//! Tag upsert and post association

use std::collections::HashMap;

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::{post_tags, posts, tags};
use super::models::{NewPostTag, NewTag, PostStatus, Tag};
use crate::error::StorageError;

/// Resolve tags by name, creating the missing ones
///
/// Missing names are bulk-inserted with `INSERT OR IGNORE` so a concurrent
/// upsert of the same name is harmless, then the canonical rows are re-read.
pub fn upsert_tags(conn: &mut SqliteConnection, names: &[String]) -> Result<Vec<Tag>, StorageError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let existing: Vec<String> = tags::table
        .filter(tags::name.eq_any(names))
        .select(tags::name)
        .load(conn)?;

    let missing: Vec<NewTag> = names
        .iter()
        .filter(|name| !existing.contains(name))
        .map(|name| NewTag {
            id: Uuid::new_v4().to_string(),
            name,
        })
        .collect();

    if !missing.is_empty() {
        diesel::insert_or_ignore_into(tags::table)
            .values(&missing)
            .execute(conn)?;
    }

    tags::table
        .filter(tags::name.eq_any(names))
        .select(Tag::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

/// Replace a post's tag set
pub fn replace_post_tags(
    conn: &mut SqliteConnection,
    post_id: &str,
    tag_ids: &[String],
) -> Result<(), StorageError> {
    diesel::delete(post_tags::table.filter(post_tags::post_id.eq(post_id))).execute(conn)?;

    if tag_ids.is_empty() {
        return Ok(());
    }

    let rows: Vec<NewPostTag> = tag_ids
        .iter()
        .map(|tag_id| NewPostTag { post_id, tag_id })
        .collect();
    diesel::insert_or_ignore_into(post_tags::table)
        .values(&rows)
        .execute(conn)?;

    Ok(())
}

/// Tag names for one post, alphabetical
pub fn tags_for_post(conn: &mut SqliteConnection, post_id: &str) -> Result<Vec<String>, StorageError> {
    post_tags::table
        .inner_join(tags::table)
        .filter(post_tags::post_id.eq(post_id))
        .order(tags::name.asc())
        .select(tags::name)
        .load(conn)
        .map_err(StorageError::from)
}

/// Tag names for many posts, keyed by post id
pub fn tags_for_posts(
    conn: &mut SqliteConnection,
    post_ids: &[String],
) -> Result<HashMap<String, Vec<String>>, StorageError> {
    let mut by_post: HashMap<String, Vec<String>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(by_post);
    }

    let rows: Vec<(String, String)> = post_tags::table
        .inner_join(tags::table)
        .filter(post_tags::post_id.eq_any(post_ids))
        .order(tags::name.asc())
        .select((post_tags::post_id, tags::name))
        .load(conn)?;

    for (post_id, name) in rows {
        by_post.entry(post_id).or_default().push(name);
    }
    Ok(by_post)
}

/// Distinct tag ids attached to the published posts among `post_ids`
pub fn tag_ids_on_published(
    conn: &mut SqliteConnection,
    post_ids: &[String],
) -> Result<Vec<String>, StorageError> {
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }

    post_tags::table
        .inner_join(posts::table)
        .filter(post_tags::post_id.eq_any(post_ids))
        .filter(posts::status.eq(PostStatus::Published.as_str()))
        .select(post_tags::tag_id)
        .distinct()
        .load(conn)
        .map_err(StorageError::from)
}
