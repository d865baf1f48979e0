//! Post storage operations
//!
//! Lifecycle rules live in `crate::lifecycle`; these functions only read and
//! write rows. Listings share one boxed query builder so the count and the
//! page always see the same filters.

use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;

use super::diesel_schema::{likes, post_tags, posts, profiles, tags};
use super::models::{NewPost, Post, PostStateChangeset, PostStatus};
use super::pagination::{Paged, Pagination};
use super::profiles::Delta;
use crate::error::StorageError;

// ============================================================================
// Query Types
// ============================================================================

/// Which posts a listing may return at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PostScope {
    /// No visibility restriction (internal use)
    #[default]
    All,
    /// Published posts whose author is the viewer, is public, or is followed
    /// with an accepted edge
    Visible { viewer: String, following: Vec<String> },
    /// Every post by one author, any status
    OwnedBy(String),
}

/// Listing filters; empty fields do not filter
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub scope: PostScope,
    pub author: Option<String>,
    pub status: Option<PostStatus>,
    /// Calendar day (UTC) of `created_at`
    pub created_on: Option<NaiveDate>,
    pub tag: Option<String>,
    /// Substring of title, content or a tag name
    pub search: Option<String>,
    /// Post must carry every one of these tag names
    pub tags_all: Vec<String>,
    /// Post must carry at least one of these tag names
    pub tags_any: Vec<String>,
    /// Post must carry at least one of these tag ids
    pub tag_ids_any: Vec<String>,
    pub liked_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrderField {
    CreatedAt,
    PublishedAt,
    Author,
    LikesCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOrder {
    pub field: PostOrderField,
    pub descending: bool,
}

impl PostOrder {
    pub fn desc(field: PostOrderField) -> Self {
        Self { field, descending: true }
    }
}

/// Feed default: newest published first, then newest created
pub fn default_ordering() -> Vec<PostOrder> {
    vec![
        PostOrder::desc(PostOrderField::PublishedAt),
        PostOrder::desc(PostOrderField::CreatedAt),
    ]
}

/// Parse `ordering=-published_at,author`
pub fn parse_ordering(raw: &str) -> Result<Vec<PostOrder>, StorageError> {
    let mut ordering = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (descending, name) = match part.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, part),
        };
        let field = match name {
            "created_at" => PostOrderField::CreatedAt,
            "published_at" => PostOrderField::PublishedAt,
            "author" => PostOrderField::Author,
            other => {
                return Err(StorageError::field(
                    "ordering",
                    format!("Unknown ordering field '{}'.", other),
                ))
            }
        };
        ordering.push(PostOrder { field, descending });
    }

    if ordering.is_empty() {
        Ok(default_ordering())
    } else {
        Ok(ordering)
    }
}

type PostListQuery<'a> =
    diesel::dsl::IntoBoxed<'a, diesel::dsl::InnerJoin<posts::table, profiles::table>, Sqlite>;

fn filtered(filter: &PostFilter) -> PostListQuery<'_> {
    let mut query = posts::table.inner_join(profiles::table).into_boxed();

    match &filter.scope {
        PostScope::All => {}
        PostScope::Visible { viewer, following } => {
            query = query
                .filter(posts::status.eq(PostStatus::Published.as_str()))
                .filter(
                    posts::author_id
                        .eq(viewer)
                        .or(profiles::is_private.eq(0))
                        .or(posts::author_id.eq_any(following)),
                );
        }
        PostScope::OwnedBy(author_id) => {
            query = query.filter(posts::author_id.eq(author_id));
        }
    }

    if let Some(ref author) = filter.author {
        query = query.filter(posts::author_id.eq(author));
    }

    if let Some(status) = filter.status {
        query = query.filter(posts::status.eq(status.as_str()));
    }

    if let Some(day) = filter.created_on {
        query = query.filter(posts::created_at.like(format!("{}%", day.format("%Y-%m-%d"))));
    }

    if let Some(ref tag) = filter.tag {
        query = query.filter(
            posts::id.eq_any(
                post_tags::table
                    .inner_join(tags::table)
                    .filter(tags::name.eq(tag))
                    .select(post_tags::post_id),
            ),
        );
    }

    if let Some(ref search) = filter.search {
        let pattern = format!("%{}%", escape_like(search));
        query = query.filter(
            posts::title
                .like(pattern.clone())
                .escape('\\')
                .or(posts::content.like(pattern.clone()).escape('\\'))
                .or(posts::id.eq_any(
                    post_tags::table
                        .inner_join(tags::table)
                        .filter(tags::name.like(pattern).escape('\\'))
                        .select(post_tags::post_id),
                )),
        );
    }

    for tag in &filter.tags_all {
        query = query.filter(
            posts::id.eq_any(
                post_tags::table
                    .inner_join(tags::table)
                    .filter(tags::name.eq(tag))
                    .select(post_tags::post_id),
            ),
        );
    }

    if !filter.tags_any.is_empty() {
        query = query.filter(
            posts::id.eq_any(
                post_tags::table
                    .inner_join(tags::table)
                    .filter(tags::name.eq_any(&filter.tags_any))
                    .select(post_tags::post_id),
            ),
        );
    }

    if !filter.tag_ids_any.is_empty() {
        query = query.filter(
            posts::id.eq_any(
                post_tags::table
                    .filter(post_tags::tag_id.eq_any(&filter.tag_ids_any))
                    .select(post_tags::post_id),
            ),
        );
    }

    if let Some(ref profile_id) = filter.liked_by {
        query = query.filter(
            posts::id.eq_any(
                likes::table
                    .filter(likes::profile_id.eq(profile_id))
                    .select(likes::post_id),
            ),
        );
    }

    query
}

fn apply_order<'a>(query: PostListQuery<'a>, order: PostOrder) -> PostListQuery<'a> {
    match (order.field, order.descending) {
        (PostOrderField::CreatedAt, false) => query.then_order_by(posts::created_at.asc()),
        (PostOrderField::CreatedAt, true) => query.then_order_by(posts::created_at.desc()),
        (PostOrderField::PublishedAt, false) => query.then_order_by(posts::published_at.asc()),
        (PostOrderField::PublishedAt, true) => query.then_order_by(posts::published_at.desc()),
        (PostOrderField::Author, false) => query
            .then_order_by(profiles::first_name.asc())
            .then_order_by(profiles::last_name.asc()),
        (PostOrderField::Author, true) => query
            .then_order_by(profiles::first_name.desc())
            .then_order_by(profiles::last_name.desc()),
        (PostOrderField::LikesCount, false) => query.then_order_by(posts::likes_count.asc()),
        (PostOrderField::LikesCount, true) => query.then_order_by(posts::likes_count.desc()),
    }
}

/// Escape `LIKE` wildcards so user text matches literally (escape char `\`)
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn title_conflict(e: StorageError) -> StorageError {
    if e.is_unique_violation() {
        StorageError::field("title", "You already have a post with this title.")
    } else {
        e
    }
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_post(conn: &mut SqliteConnection, id: &str) -> Result<Option<Post>, StorageError> {
    posts::table
        .filter(posts::id.eq(id))
        .select(Post::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

/// Filtered, ordered page of posts
pub fn list_posts(
    conn: &mut SqliteConnection,
    filter: &PostFilter,
    ordering: &[PostOrder],
    page: Pagination,
) -> Result<Paged<Post>, StorageError> {
    let total: i64 = filtered(filter).count().get_result(conn)?;

    let mut query = filtered(filter);
    for order in ordering {
        query = apply_order(query, *order);
    }
    // Stable tiebreak
    query = query.then_order_by(posts::id.asc());

    let items = query
        .select(Post::as_select())
        .limit(page.limit())
        .offset(page.offset())
        .load(conn)?;

    Ok(Paged { items, total, page })
}

/// Every post currently waiting on a publish task
pub fn scheduled_posts(conn: &mut SqliteConnection) -> Result<Vec<Post>, StorageError> {
    posts::table
        .filter(posts::status.eq(PostStatus::Scheduled.as_str()))
        .order(posts::scheduled_at.asc())
        .select(Post::as_select())
        .load(conn)
        .map_err(StorageError::from)
}

// ============================================================================
// Write Operations
// ============================================================================

pub fn insert_post(conn: &mut SqliteConnection, post: &NewPost) -> Result<(), StorageError> {
    diesel::insert_into(posts::table)
        .values(post)
        .execute(conn)
        .map_err(StorageError::from)
        .map_err(title_conflict)?;
    Ok(())
}

/// Write content and lifecycle columns together
pub fn update_post_state(
    conn: &mut SqliteConnection,
    id: &str,
    changes: &PostStateChangeset,
) -> Result<usize, StorageError> {
    diesel::update(posts::table.filter(posts::id.eq(id)))
        .set(changes)
        .execute(conn)
        .map_err(StorageError::from)
        .map_err(title_conflict)
}

/// Record the publish task handle, but only if the post is still scheduled
/// for the same fire time the task was registered for
pub fn attach_task_handle(
    conn: &mut SqliteConnection,
    id: &str,
    scheduled_at: &str,
    handle: &str,
) -> Result<bool, StorageError> {
    let rows = diesel::update(
        posts::table
            .filter(posts::id.eq(id))
            .filter(posts::status.eq(PostStatus::Scheduled.as_str()))
            .filter(posts::scheduled_at.eq(scheduled_at)),
    )
    .set(posts::scheduled_task_id.eq(handle))
    .execute(conn)?;

    Ok(rows == 1)
}

/// scheduled -> published; guarded on the current status
pub fn mark_published(
    conn: &mut SqliteConnection,
    id: &str,
    published_at: &str,
) -> Result<bool, StorageError> {
    let rows = diesel::update(
        posts::table
            .filter(posts::id.eq(id))
            .filter(posts::status.eq(PostStatus::Scheduled.as_str())),
    )
    .set((
        posts::status.eq(PostStatus::Published.as_str()),
        posts::published_at.eq(published_at),
        posts::scheduled_at.eq(None::<String>),
        posts::scheduled_task_id.eq(None::<String>),
        posts::updated_at.eq(published_at),
    ))
    .execute(conn)?;

    Ok(rows == 1)
}

pub fn delete_post(conn: &mut SqliteConnection, id: &str) -> Result<bool, StorageError> {
    let rows = diesel::delete(posts::table.filter(posts::id.eq(id))).execute(conn)?;
    Ok(rows == 1)
}

/// Denormalized post counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCounter {
    Likes,
    Comments,
}

/// Move one post counter by one step; decrements never go below zero
pub fn adjust_counter(
    conn: &mut SqliteConnection,
    id: &str,
    counter: PostCounter,
    delta: Delta,
) -> Result<usize, StorageError> {
    let target = posts::table.filter(posts::id.eq(id));

    let rows = match (counter, delta) {
        (PostCounter::Likes, Delta::Increment) => diesel::update(target)
            .set(posts::likes_count.eq(posts::likes_count + 1))
            .execute(conn)?,
        (PostCounter::Likes, Delta::Decrement) => {
            diesel::update(target.filter(posts::likes_count.gt(0)))
                .set(posts::likes_count.eq(posts::likes_count - 1))
                .execute(conn)?
        }
        (PostCounter::Comments, Delta::Increment) => diesel::update(target)
            .set(posts::comments_count.eq(posts::comments_count + 1))
            .execute(conn)?,
        (PostCounter::Comments, Delta::Decrement) => {
            diesel::update(target.filter(posts::comments_count.gt(0)))
                .set(posts::comments_count.eq(posts::comments_count - 1))
                .execute(conn)?
        }
    };

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ordering() {
        let ordering = parse_ordering("-created_at, author").unwrap();
        assert_eq!(
            ordering,
            vec![
                PostOrder::desc(PostOrderField::CreatedAt),
                PostOrder { field: PostOrderField::Author, descending: false },
            ]
        );
        assert_eq!(parse_ordering("").unwrap(), default_ordering());
        assert!(parse_ordering("likes").is_err());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
