//! Comment service - one level of threading with tombstone deletes
//!
//! A deleted comment keeps its row so replies stay attached; listings skip
//! tombstones, while the thread view keeps a tombstoned parent that still
//! has live replies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use diesel::SqliteConnection;
use serde::Deserialize;
use tracing::debug;

use crate::db::comments::{self, CommentFilter, CommentOrder};
use crate::db::models::{format_timestamp, Comment, NewComment, Post};
use crate::db::{posts, profiles, Db, Paged, Pagination, RequestContext};
use crate::error::{StorageError, ValidationErrors};
use crate::visibility::{can_view_comment, Visibility};

use super::counters::{CounterEvent, Counters};
use super::events::{EventBus, SocialEvent};

pub const MAX_COMMENT_LEN: usize = 2000;

const EMPTY_CONTENT: &str = "Comment content cannot be empty.";
const NO_ACCESS: &str = "You do not have access to this post.";
const NOT_AUTHOR: &str = "You do not have permission to perform this action.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    pub post_id: String,
    pub content: String,
    pub parent_id: Option<String>,
}

/// Listing filters from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentQuery {
    pub post: Option<String>,
    pub parent: Option<String>,
    pub ordering: Option<String>,
}

/// A comment with the names its views show
#[derive(Debug, Clone)]
pub struct CommentDetail {
    pub comment: Comment,
    pub author_full_name: String,
    pub post_title: String,
    pub children_count: i64,
}

/// Top-level comment and its live replies
#[derive(Debug, Clone)]
pub struct ThreadNode {
    pub comment: Comment,
    pub author_full_name: String,
    pub replies: Vec<ThreadNode>,
}

/// Comment service
pub struct CommentService {
    db: Arc<Db>,
    events: Arc<EventBus>,
    min_interval: Duration,
}

impl CommentService {
    pub fn new(db: Arc<Db>, events: Arc<EventBus>, min_interval: Duration) -> Self {
        Self {
            db,
            events,
            min_interval,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, ctx: &RequestContext, id: &str) -> Result<CommentDetail, StorageError> {
        ctx.require_profile()?;
        self.db.with_conn(|conn| {
            let comment = live_comment(conn, id)?;
            let post = visible_post(conn, ctx, &comment.post_id)?;
            let mut details = describe(conn, vec![comment], Some(&post))?;
            details
                .pop()
                .ok_or_else(|| StorageError::NotFound(format!("comment {}", id)))
        })
    }

    /// Live comments on posts the viewer can see
    pub fn list(
        &self,
        ctx: &RequestContext,
        query: &CommentQuery,
        page: Pagination,
    ) -> Result<Paged<CommentDetail>, StorageError> {
        let me = ctx.require_profile()?;
        let filter = CommentFilter {
            visible_to: Some((me.to_string(), ctx.following_ids())),
            post_id: query.post.clone(),
            parent_id: query.parent.clone(),
            order: match query.ordering {
                Some(ref raw) => CommentOrder::parse(raw)?,
                None => CommentOrder::default(),
            },
        };

        self.db.with_conn(|conn| {
            let listed = comments::list_comments(conn, &filter, page)?;
            let total = listed.total;
            let page = listed.page;
            let items = describe(conn, listed.items, None)?;
            Ok(Paged { items, total, page })
        })
    }

    /// Live replies to a comment, oldest first; the parent may be a tombstone
    pub fn children(&self, ctx: &RequestContext, id: &str) -> Result<Vec<CommentDetail>, StorageError> {
        ctx.require_profile()?;
        self.db.with_conn(|conn| {
            let parent = comments::get_comment(conn, id)?
                .ok_or_else(|| StorageError::NotFound(format!("comment {}", id)))?;
            let post = visible_post(conn, ctx, &parent.post_id)?;
            let replies = comments::live_children(conn, id)?;
            describe(conn, replies, Some(&post))
        })
    }

    /// Comment tree of a post
    pub fn thread(&self, ctx: &RequestContext, post_id: &str) -> Result<Vec<ThreadNode>, StorageError> {
        ctx.require_profile()?;
        self.db.with_conn(|conn| {
            visible_post(conn, ctx, post_id)?;
            let all = comments::comments_for_post(conn, post_id)?;
            let names = author_names(conn, &all)?;
            Ok(build_thread(all, &names))
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create(&self, ctx: &RequestContext, input: CommentInput) -> Result<CommentDetail, StorageError> {
        let me = ctx.require_profile()?;
        let now = Utc::now();

        let mut errors = ValidationErrors::default();
        check_content(&mut errors, &input.content);
        errors.into_result()?;

        let id = uuid::Uuid::new_v4().to_string();
        let detail = self.db.with_write_txn(|conn| {
            let post = visible_post(conn, ctx, &input.post_id).map_err(|e| match e {
                StorageError::NotFound(_) => {
                    StorageError::field("post_id", format!("Invalid pk \"{}\" - object does not exist.", input.post_id))
                }
                other => other,
            })?;

            if let Some(ref parent_id) = input.parent_id {
                check_parent(conn, parent_id, &post.id)?;
            }

            if let Some(latest) = comments::latest_comment_at(conn, me)? {
                let window = chrono::Duration::from_std(self.min_interval)
                    .map_err(|e| StorageError::Config(format!("comment interval: {}", e)))?;
                if latest >= format_timestamp(now - window) {
                    return Err(StorageError::InvalidInput("You are commenting too quickly.".into()));
                }
            }

            let stamp = format_timestamp(now);
            comments::insert_comment(
                conn,
                &NewComment {
                    id: &id,
                    post_id: &post.id,
                    author_id: me,
                    content: &input.content,
                    parent_id: input.parent_id.as_deref(),
                    created_at: &stamp,
                    updated_at: &stamp,
                },
            )?;
            Counters::apply(conn, &CounterEvent::CommentAdded { post_id: post.id.clone() })?;

            let comment = live_comment(conn, &id)?;
            let mut details = describe(conn, vec![comment], Some(&post))?;
            details
                .pop()
                .ok_or_else(|| StorageError::Internal(format!("comment {} vanished", id)))
        })?;

        debug!(id = %id, post_id = %input.post_id, "Comment created");
        self.events.emit(SocialEvent::CommentCreated {
            id,
            post_id: input.post_id,
            author_id: me.to_string(),
        });
        Ok(detail)
    }

    /// Edit the content of the caller's comment
    pub fn update(&self, ctx: &RequestContext, id: &str, content: &str) -> Result<CommentDetail, StorageError> {
        let me = ctx.require_profile()?;

        let mut errors = ValidationErrors::default();
        check_content(&mut errors, content);
        errors.into_result()?;

        self.db.with_write_txn(|conn| {
            let comment = live_comment(conn, id)?;
            if comment.author_id != me {
                return Err(StorageError::Forbidden(NOT_AUTHOR.into()));
            }
            visible_post(conn, ctx, &comment.post_id)?;
            if !comments::update_content(conn, id, content)? {
                return Err(StorageError::NotFound(format!("comment {}", id)));
            }
            Ok(())
        })?;

        self.get(ctx, id)
    }

    /// Tombstone the caller's comment
    pub fn delete(&self, ctx: &RequestContext, id: &str) -> Result<(), StorageError> {
        let me = ctx.require_profile()?;

        let post_id = self.db.with_write_txn(|conn| {
            let comment = live_comment(conn, id)?;
            if comment.author_id != me {
                return Err(StorageError::Forbidden(NOT_AUTHOR.into()));
            }
            if comments::tombstone(conn, id)? {
                Counters::apply(
                    conn,
                    &CounterEvent::CommentRemoved {
                        post_id: comment.post_id.clone(),
                    },
                )?;
            }
            Ok(comment.post_id)
        })?;

        self.events.emit(SocialEvent::CommentDeleted {
            id: id.to_string(),
            post_id,
        });
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check_content(errors: &mut ValidationErrors, content: &str) {
    if content.trim().is_empty() {
        errors.add("content", EMPTY_CONTENT);
    } else if content.chars().count() > MAX_COMMENT_LEN {
        errors.add(
            "content",
            format!("Ensure this field has no more than {} characters.", MAX_COMMENT_LEN),
        );
    }
}

/// Parent must be a live top-level comment on the same post
fn check_parent(conn: &mut SqliteConnection, parent_id: &str, post_id: &str) -> Result<(), StorageError> {
    let parent = comments::get_comment(conn, parent_id)?
        .filter(|c| !c.is_deleted() && c.parent_id.is_none());
    let Some(parent) = parent else {
        return Err(StorageError::field(
            "parent_id",
            format!("Invalid pk \"{}\" - object does not exist.", parent_id),
        ));
    };
    if parent.post_id != post_id {
        return Err(StorageError::field(
            "parent_id",
            "Parent comment must belong to the same post.",
        ));
    }
    Ok(())
}

fn live_comment(conn: &mut SqliteConnection, id: &str) -> Result<Comment, StorageError> {
    comments::get_comment(conn, id)?
        .filter(|c| !c.is_deleted())
        .ok_or_else(|| StorageError::NotFound(format!("comment {}", id)))
}

/// Load a post whose comments the viewer may see
fn visible_post(conn: &mut SqliteConnection, ctx: &RequestContext, post_id: &str) -> Result<Post, StorageError> {
    let post = posts::get_post(conn, post_id)?
        .ok_or_else(|| StorageError::NotFound(format!("post {}", post_id)))?;
    let author = profiles::get_profile(conn, &post.author_id)?
        .ok_or_else(|| StorageError::Internal(format!("author of post {} missing", post_id)))?;

    if can_view_comment(ctx, &post, &author) == Visibility::None {
        return Err(StorageError::Forbidden(NO_ACCESS.into()));
    }
    Ok(post)
}

fn author_names(conn: &mut SqliteConnection, list: &[Comment]) -> Result<HashMap<String, String>, StorageError> {
    let mut ids: Vec<String> = list.iter().map(|c| c.author_id.clone()).collect();
    ids.sort();
    ids.dedup();
    Ok(profiles::get_profiles_with_email(conn, &ids)?
        .into_iter()
        .map(|(id, p)| (id, p.full_name()))
        .collect())
}

/// Attach author names, post titles and live reply counts
fn describe(
    conn: &mut SqliteConnection,
    list: Vec<Comment>,
    known_post: Option<&Post>,
) -> Result<Vec<CommentDetail>, StorageError> {
    let names = author_names(conn, &list)?;
    let ids: Vec<String> = list.iter().map(|c| c.id.clone()).collect();
    let counts = comments::live_children_counts(conn, &ids)?;

    let mut titles: HashMap<String, String> = HashMap::new();
    if let Some(post) = known_post {
        titles.insert(post.id.clone(), post.title.clone());
    }
    for comment in &list {
        if !titles.contains_key(&comment.post_id) {
            if let Some(post) = posts::get_post(conn, &comment.post_id)? {
                titles.insert(post.id, post.title);
            }
        }
    }

    Ok(list
        .into_iter()
        .map(|comment| CommentDetail {
            author_full_name: names.get(&comment.author_id).cloned().unwrap_or_default(),
            post_title: titles.get(&comment.post_id).cloned().unwrap_or_default(),
            children_count: counts.get(&comment.id).copied().unwrap_or(0),
            comment,
        })
        .collect())
}

/// Arrange a post's comments (tombstones included, oldest first) into a
/// tree. Tombstoned replies are dropped; a tombstoned top-level comment is
/// kept only while it has live replies.
pub fn build_thread(all: Vec<Comment>, names: &HashMap<String, String>) -> Vec<ThreadNode> {
    let node = |comment: Comment| ThreadNode {
        author_full_name: names.get(&comment.author_id).cloned().unwrap_or_default(),
        comment,
        replies: Vec::new(),
    };

    let (top, replies): (Vec<Comment>, Vec<Comment>) =
        all.into_iter().partition(|c| c.parent_id.is_none());

    let mut by_parent: HashMap<String, Vec<ThreadNode>> = HashMap::new();
    for reply in replies.into_iter().filter(|c| !c.is_deleted()) {
        if let Some(parent_id) = reply.parent_id.clone() {
            by_parent.entry(parent_id).or_default().push(node(reply));
        }
    }

    top.into_iter()
        .filter_map(|comment| {
            let replies = by_parent.remove(&comment.id).unwrap_or_default();
            if comment.is_deleted() && replies.is_empty() {
                return None;
            }
            let mut parent = node(comment);
            parent.replies = replies;
            Some(parent)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, parent: Option<&str>, deleted: bool) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: "post".to_string(),
            author_id: "alice".to_string(),
            content: format!("content {}", id),
            parent_id: parent.map(str::to_string),
            is_deleted: deleted as i32,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_thread_keeps_tombstoned_parent_with_live_replies() {
        let names = HashMap::from([("alice".to_string(), "Alice".to_string())]);
        let tree = build_thread(
            vec![
                comment("a", None, true),
                comment("b", None, true),
                comment("c", None, false),
                comment("a1", Some("a"), false),
                comment("b1", Some("b"), true),
            ],
            &names,
        );

        let ids: Vec<&str> = tree.iter().map(|n| n.comment.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].comment.id, "a1");
        assert_eq!(tree[1].author_full_name, "Alice");
    }

    #[test]
    fn test_content_checks() {
        let mut errors = ValidationErrors::default();
        check_content(&mut errors, "   ");
        assert_eq!(errors.messages("content"), [EMPTY_CONTENT]);

        let mut errors = ValidationErrors::default();
        check_content(&mut errors, &"x".repeat(MAX_COMMENT_LEN + 1));
        assert!(errors.contains("content"));
    }
}
