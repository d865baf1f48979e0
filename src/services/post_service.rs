//! Post service - lifecycle, scheduler bridge and post listings
//!
//! Every status-changing write follows the same shape:
//!
//! 1. `BEGIN IMMEDIATE`, load the post, plan the transition
//! 2. write the row, tags and counters in that transaction
//! 3. after commit, run the planned scheduler actions and persist the new
//!    task handle
//!
//! Scheduler failures never fail the request. A scheduled post without a
//! task handle is re-registered by [`PostService::recover_schedules`].

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::SqliteConnection;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::db::models::{format_timestamp, NewPost, Post, PostStateChangeset, PostStatus, ProfileWithEmail};
use crate::db::posts::{self, PostFilter, PostOrder, PostOrderField, PostScope};
use crate::db::{comments, likes, profiles, tags as tag_store, Db, Paged, Pagination, RequestContext};
use crate::error::{StorageError, ValidationErrors};
use crate::lifecycle::{plan_publish, plan_transition, LifecycleEdit, PostState, PublishDecision, SchedulerAction, Transition};
use crate::scheduler::TaskScheduler;
use crate::tags::{extract_hashtags, TagMode};
use crate::views::double_option;
use crate::visibility::{can_view_post, visible_post_scope, Visibility};

use super::counters::{CounterEvent, Counters};
use super::events::{EventBus, SocialEvent};

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_CONTENT_LEN: usize = 5000;

const NO_PERMISSION: &str = "You do not have permission to perform this action.";

/// Create / update body. Absent fields keep their stored value on update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostInput {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub media: Option<Option<String>>,
    pub status: Option<PostStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

impl PostInput {
    fn lifecycle_edit(&self) -> LifecycleEdit {
        LifecycleEdit {
            status: self.status,
            scheduled_at: self.scheduled_at,
        }
    }
}

/// Feed filters and ordering
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostQuery {
    pub author: Option<String>,
    pub status: Option<PostStatus>,
    /// `YYYY-MM-DD`
    pub created: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

/// A post with everything its detail view needs
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: Post,
    pub author: ProfileWithEmail,
    pub tags: Vec<String>,
    pub liked_by_me: bool,
}

/// A post as it appears in listings
#[derive(Debug, Clone)]
pub struct PostSummary {
    pub post: Post,
    pub author_full_name: String,
    pub tags: Vec<String>,
    pub liked_by_me: bool,
}

/// What a fired publish task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// Post was deleted
    Missing,
    /// Post left the scheduled state (including an earlier publish)
    NotScheduled(PostStatus),
    /// Post was rescheduled to a later time
    NotDue,
}

/// Post service
pub struct PostService {
    db: Arc<Db>,
    events: Arc<EventBus>,
    scheduler: Arc<dyn TaskScheduler>,
}

impl PostService {
    pub fn new(db: Arc<Db>, events: Arc<EventBus>, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self { db, events, scheduler }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Post detail, gated by visibility
    pub fn get(&self, ctx: &RequestContext, id: &str) -> Result<PostDetail, StorageError> {
        let me = ctx.require_profile()?;
        self.db.with_conn(|conn| {
            let (post, author) = load_with_author(conn, id)?;
            if can_view_post(ctx, &post, &author.profile) == Visibility::None {
                return Err(StorageError::Forbidden(NO_PERMISSION.into()));
            }

            let tags = tag_store::tags_for_post(conn, id)?;
            let liked_by_me = likes::is_liked(conn, id, me)?;
            Ok(PostDetail {
                post,
                author,
                tags,
                liked_by_me,
            })
        })
    }

    /// Visible published posts with filters and ordering
    pub fn feed(
        &self,
        ctx: &RequestContext,
        query: &PostQuery,
        page: Pagination,
    ) -> Result<Paged<PostSummary>, StorageError> {
        let scope = visible_post_scope(ctx)?;
        let ordering = match query.ordering {
            Some(ref raw) => posts::parse_ordering(raw)?,
            None => posts::default_ordering(),
        };
        let filter = PostFilter {
            scope,
            author: query.author.clone(),
            status: query.status,
            created_on: query.created.as_deref().map(parse_created).transpose()?,
            tag: query.tag.as_deref().map(str::to_lowercase),
            search: query.search.clone().filter(|s| !s.trim().is_empty()),
            ..Default::default()
        };

        self.list(ctx, &filter, &ordering, page)
    }

    /// The caller's own posts, any status, newest first
    pub fn my_posts(
        &self,
        ctx: &RequestContext,
        status: Option<PostStatus>,
        page: Pagination,
    ) -> Result<Paged<PostSummary>, StorageError> {
        let me = ctx.require_profile()?;
        let filter = PostFilter {
            scope: PostScope::OwnedBy(me.to_string()),
            status,
            ..Default::default()
        };
        self.list(ctx, &filter, &[PostOrder::desc(PostOrderField::CreatedAt)], page)
    }

    /// Visible posts carrying all (or any) of `tags`
    pub fn by_tag(
        &self,
        ctx: &RequestContext,
        tags: Vec<String>,
        mode: TagMode,
        page: Pagination,
    ) -> Result<Paged<PostSummary>, StorageError> {
        let scope = visible_post_scope(ctx)?;
        if tags.is_empty() {
            return Err(StorageError::field("tags", "This field may not be blank."));
        }

        let mut filter = PostFilter {
            scope,
            ..Default::default()
        };
        match mode {
            TagMode::All => filter.tags_all = tags,
            TagMode::Any => filter.tags_any = tags,
        }
        self.list(ctx, &filter, &posts::default_ordering(), page)
    }

    /// Visible posts the caller liked
    pub fn liked(&self, ctx: &RequestContext, page: Pagination) -> Result<Paged<PostSummary>, StorageError> {
        let scope = visible_post_scope(ctx)?;
        let filter = PostFilter {
            liked_by: ctx.profile_id().map(str::to_string),
            scope,
            ..Default::default()
        };
        self.list(ctx, &filter, &posts::default_ordering(), page)
    }

    /// Visible posts sharing a tag with published posts the caller liked or
    /// commented on; most liked first, then newest
    pub fn recommended(
        &self,
        ctx: &RequestContext,
        page: Pagination,
    ) -> Result<Paged<PostSummary>, StorageError> {
        let scope = visible_post_scope(ctx)?;
        let me = ctx.require_profile()?;

        let tag_ids = self.db.with_conn(|conn| {
            let mut engaged = likes::liked_post_ids(conn, me)?;
            engaged.extend(comments::commented_post_ids(conn, me)?);
            engaged.sort();
            engaged.dedup();
            tag_store::tag_ids_on_published(conn, &engaged)
        })?;

        if tag_ids.is_empty() {
            return Ok(Paged {
                items: Vec::new(),
                total: 0,
                page,
            });
        }

        let filter = PostFilter {
            scope,
            tag_ids_any: tag_ids,
            ..Default::default()
        };
        let ordering = [
            PostOrder::desc(PostOrderField::LikesCount),
            PostOrder::desc(PostOrderField::CreatedAt),
        ];
        self.list(ctx, &filter, &ordering, page)
    }

    fn list(
        &self,
        ctx: &RequestContext,
        filter: &PostFilter,
        ordering: &[PostOrder],
        page: Pagination,
    ) -> Result<Paged<PostSummary>, StorageError> {
        self.db.with_conn(|conn| {
            let listed = posts::list_posts(conn, filter, ordering, page)?;
            summarize(conn, ctx, listed)
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a post owned by the caller
    pub fn create(&self, ctx: &RequestContext, input: PostInput) -> Result<PostDetail, StorageError> {
        let me = ctx.require_profile()?.to_string();
        let now = Utc::now();

        let mut errors = validate_fields(&input, true);
        let planned = plan_transition(None, &input.lifecycle_edit(), now);
        let transition = match planned {
            Ok(t) if errors.is_empty() => t,
            Ok(_) => return Err(errors.into()),
            Err(lifecycle_errors) => {
                errors.merge(lifecycle_errors);
                return Err(errors.into());
            }
        };

        let id = uuid::Uuid::new_v4().to_string();
        let title = input.title.as_deref().map(str::trim).unwrap_or_default();
        let content = input.content.as_deref().unwrap_or_default();
        let hashtags = extract_hashtags(content);

        self.db.with_write_txn(|conn| {
            let stamp = format_timestamp(now);
            let scheduled_at = transition.scheduled_at.map(format_timestamp);
            let published_at = transition.published_at.map(format_timestamp);

            posts::insert_post(
                conn,
                &NewPost {
                    id: &id,
                    author_id: &me,
                    title,
                    content,
                    media: input.media.as_ref().and_then(|m| m.as_deref()),
                    status: transition.status.as_str(),
                    scheduled_at: scheduled_at.as_deref(),
                    published_at: published_at.as_deref(),
                    created_at: &stamp,
                    updated_at: &stamp,
                },
            )?;

            replace_tags(conn, &id, &hashtags)?;

            if let Some(event) = CounterEvent::for_published_delta(&me, transition.published_delta()) {
                Counters::apply(conn, &event)?;
            }
            Ok(())
        })?;

        debug!(id = %id, author = %me, status = %transition.status, "Post created");
        self.events.emit(SocialEvent::PostCreated {
            id: id.clone(),
            author_id: me.clone(),
            status: transition.status.as_str().to_string(),
        });
        if transition.status == PostStatus::Published {
            self.events.emit(SocialEvent::PostPublished {
                id: id.clone(),
                author_id: me,
                scheduled: false,
            });
        }

        self.apply_scheduler_actions(&id, &transition.actions);
        self.get(ctx, &id)
    }

    /// Update the caller's post. `partial = false` requires title and content.
    pub fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: PostInput,
        partial: bool,
    ) -> Result<PostDetail, StorageError> {
        ctx.require_profile()?;
        let now = Utc::now();

        let transition = self.db.with_write_txn(|conn| {
            let (post, author) = load_with_author(conn, id)?;
            authorize_owner(ctx, &post, &author)?;

            let mut errors = validate_fields(&input, !partial);
            let state = PostState::from_post(&post);
            let transition = match plan_transition(Some(&state), &input.lifecycle_edit(), now) {
                Ok(t) if errors.is_empty() => t,
                Ok(_) => return Err(errors.into()),
                Err(lifecycle_errors) => {
                    errors.merge(lifecycle_errors);
                    return Err(errors.into());
                }
            };

            let title = input.title.as_deref().map(str::trim).unwrap_or(post.title.as_str());
            let content = input.content.as_deref().unwrap_or(post.content.as_str());
            let media = match input.media {
                Some(ref media) => media.as_deref(),
                None => post.media.as_deref(),
            };
            let scheduled_at = transition.scheduled_at.map(format_timestamp);
            let published_at = transition.published_at.map(format_timestamp);
            let updated_at = format_timestamp(now);

            posts::update_post_state(
                conn,
                id,
                &PostStateChangeset {
                    title,
                    content,
                    media,
                    status: transition.status.as_str(),
                    scheduled_task_id: transition.task.as_ref().map(|t| t.as_str()),
                    scheduled_at: scheduled_at.as_deref(),
                    published_at: published_at.as_deref(),
                    updated_at: &updated_at,
                },
            )?;

            if let Some(ref content) = input.content {
                replace_tags(conn, id, &extract_hashtags(content))?;
            }

            if let Some(event) = CounterEvent::for_published_delta(&post.author_id, transition.published_delta()) {
                Counters::apply(conn, &event)?;
            }
            Ok(transition)
        })?;

        self.emit_transition(ctx, id, &transition);
        self.apply_scheduler_actions(id, &transition.actions);
        self.get(ctx, id)
    }

    /// Delete the caller's post, cancelling its publish task
    pub fn delete(&self, ctx: &RequestContext, id: &str) -> Result<(), StorageError> {
        ctx.require_profile()?;

        let task = self.db.with_write_txn(|conn| {
            let (post, author) = load_with_author(conn, id)?;
            authorize_owner(ctx, &post, &author)?;

            posts::delete_post(conn, id)?;
            if post.status() == PostStatus::Published {
                Counters::apply(
                    conn,
                    &CounterEvent::PostUnpublished {
                        author_id: post.author_id.clone(),
                    },
                )?;
            }
            Ok(PostState::from_post(&post).task)
        })?;

        if let Some(task) = task {
            self.apply_scheduler_actions(id, &[SchedulerAction::Cancel(task)]);
        }
        self.events.emit(SocialEvent::PostDeleted { id: id.to_string() });
        Ok(())
    }

    // =========================================================================
    // Scheduler Bridge
    // =========================================================================

    /// Body of the deferred publish task
    pub fn publish_scheduled(&self, post_id: &str) -> Result<PublishOutcome, StorageError> {
        self.publish_scheduled_at(post_id, Utc::now())
    }

    /// Publish `post_id` if it is still scheduled and due at `now`.
    /// Safe to run any number of times.
    pub fn publish_scheduled_at(
        &self,
        post_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome, StorageError> {
        let (outcome, author_id) = self.db.with_write_txn(|conn| {
            let post = posts::get_post(conn, post_id)?;
            let state = post.as_ref().map(PostState::from_post);

            let outcome = match plan_publish(state.as_ref(), now) {
                PublishDecision::Missing => PublishOutcome::Missing,
                PublishDecision::NotScheduled(status) => PublishOutcome::NotScheduled(status),
                PublishDecision::NotDue => PublishOutcome::NotDue,
                PublishDecision::Publish => {
                    if posts::mark_published(conn, post_id, &format_timestamp(now))? {
                        PublishOutcome::Published
                    } else {
                        PublishOutcome::NotScheduled(PostStatus::Published)
                    }
                }
            };

            let author_id = post.map(|p| p.author_id);
            if outcome == PublishOutcome::Published {
                if let Some(ref author_id) = author_id {
                    Counters::apply(
                        conn,
                        &CounterEvent::PostPublished {
                            author_id: author_id.clone(),
                        },
                    )?;
                }
            }
            Ok((outcome, author_id))
        })?;

        match outcome {
            PublishOutcome::Published => {
                info!(post_id = %post_id, "Scheduled post published");
                self.events.emit(SocialEvent::PostPublished {
                    id: post_id.to_string(),
                    author_id: author_id.unwrap_or_default(),
                    scheduled: true,
                });
            }
            other => {
                debug!(post_id = %post_id, outcome = ?other, "Publish task was a no-op");
            }
        }
        Ok(outcome)
    }

    /// Register a publish task for every scheduled post. Returns how many
    /// were registered.
    pub fn recover_schedules(&self) -> Result<usize, StorageError> {
        let scheduled = self.db.with_conn(posts::scheduled_posts)?;
        let mut registered = 0;

        for post in scheduled {
            let state = PostState::from_post(&post);
            let Some(fire_at) = state.scheduled_at else {
                warn!(post_id = %post.id, "Scheduled post without fire time");
                continue;
            };

            let mut actions = Vec::new();
            if let Some(task) = state.task {
                actions.push(SchedulerAction::Cancel(task));
            }
            actions.push(SchedulerAction::Schedule { fire_at });
            if self.apply_scheduler_actions(&post.id, &actions) {
                registered += 1;
            }
        }

        info!(count = registered, backend = self.scheduler.name(), "Recovered scheduled posts");
        Ok(registered)
    }

    /// Run post-commit scheduler work. Failures are logged, never raised.
    /// Returns true when every registration was persisted.
    fn apply_scheduler_actions(&self, post_id: &str, actions: &[SchedulerAction]) -> bool {
        let mut ok = true;

        for action in actions {
            match action {
                SchedulerAction::Cancel(handle) => {
                    if let Err(e) = self.scheduler.cancel(handle) {
                        warn!(post_id = %post_id, handle = %handle, error = %e, "Failed to cancel publish task");
                    }
                }
                SchedulerAction::Schedule { fire_at } => {
                    let handle = match self.scheduler.schedule(post_id, *fire_at) {
                        Ok(handle) => handle,
                        Err(e) => {
                            warn!(post_id = %post_id, error = %e, "Failed to schedule publish task");
                            ok = false;
                            continue;
                        }
                    };

                    let fire_at_str = format_timestamp(*fire_at);
                    let attached = self.db.with_conn(|conn| {
                        posts::attach_task_handle(conn, post_id, &fire_at_str, handle.as_str())
                    });
                    match attached {
                        Ok(true) => {
                            self.events.emit(SocialEvent::PublishScheduled {
                                id: post_id.to_string(),
                                handle: handle.to_string(),
                                fire_at: fire_at_str,
                            });
                        }
                        Ok(false) => {
                            // Post moved on between commit and registration
                            debug!(post_id = %post_id, handle = %handle, "Dropping stale publish task");
                            let _ = self.scheduler.cancel(&handle);
                        }
                        Err(e) => {
                            warn!(post_id = %post_id, error = %e, "Failed to persist task handle");
                            ok = false;
                        }
                    }
                }
            }
        }

        ok
    }

    fn emit_transition(&self, ctx: &RequestContext, id: &str, transition: &Transition) {
        self.events.emit(SocialEvent::PostUpdated {
            id: id.to_string(),
            status: transition.status.as_str().to_string(),
        });
        if transition.published_delta() > 0 {
            self.events.emit(SocialEvent::PostPublished {
                id: id.to_string(),
                author_id: ctx.profile_id().unwrap_or_default().to_string(),
                scheduled: false,
            });
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn load_with_author(conn: &mut SqliteConnection, id: &str) -> Result<(Post, ProfileWithEmail), StorageError> {
    let post = posts::get_post(conn, id)?.ok_or_else(|| StorageError::NotFound(format!("post {}", id)))?;
    let author = profiles::get_profile_with_email(conn, &post.author_id)?
        .ok_or_else(|| StorageError::Internal(format!("author of post {} missing", id)))?;
    Ok((post, author))
}

/// Only the author may modify a post; others learn whether it exists only
/// if they can see it
fn authorize_owner(ctx: &RequestContext, post: &Post, author: &ProfileWithEmail) -> Result<(), StorageError> {
    if ctx.is_self(&post.author_id) {
        return Ok(());
    }
    if can_view_post(ctx, post, &author.profile) == Visibility::None {
        return Err(StorageError::NotFound(format!("post {}", post.id)));
    }
    Err(StorageError::Forbidden(NO_PERMISSION.into()))
}

fn replace_tags(conn: &mut SqliteConnection, post_id: &str, names: &[String]) -> Result<(), StorageError> {
    let tags = tag_store::upsert_tags(conn, names)?;
    let ids: Vec<String> = tags.into_iter().map(|t| t.id).collect();
    tag_store::replace_post_tags(conn, post_id, &ids)
}

fn summarize(
    conn: &mut SqliteConnection,
    ctx: &RequestContext,
    listed: Paged<Post>,
) -> Result<Paged<PostSummary>, StorageError> {
    let post_ids: Vec<String> = listed.items.iter().map(|p| p.id.clone()).collect();
    let mut author_ids: Vec<String> = listed.items.iter().map(|p| p.author_id.clone()).collect();
    author_ids.sort();
    author_ids.dedup();

    let authors = profiles::get_profiles_with_email(conn, &author_ids)?;
    let mut tags = tag_store::tags_for_posts(conn, &post_ids)?;
    let liked = match ctx.profile_id() {
        Some(me) => likes::liked_among(conn, me, &post_ids)?,
        None => Default::default(),
    };

    Ok(listed.map(|post| PostSummary {
        author_full_name: authors
            .get(&post.author_id)
            .map(ProfileWithEmail::full_name)
            .unwrap_or_default(),
        tags: tags.remove(&post.id).unwrap_or_default(),
        liked_by_me: liked.contains(&post.id),
        post,
    }))
}

fn check_text(errors: &mut ValidationErrors, field: &str, value: Option<&str>, max: usize, required: bool) {
    match value {
        None if required => errors.add(field, "This field is required."),
        None => {}
        Some(v) if v.trim().is_empty() => errors.add(field, "This field may not be blank."),
        Some(v) if v.chars().count() > max => {
            errors.add(field, format!("Ensure this field has no more than {} characters.", max))
        }
        Some(_) => {}
    }
}

/// Field checks for title and content
fn validate_fields(input: &PostInput, require_all: bool) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    check_text(&mut errors, "title", input.title.as_deref(), MAX_TITLE_LEN, require_all);
    check_text(&mut errors, "content", input.content.as_deref(), MAX_CONTENT_LEN, require_all);
    errors
}

fn parse_created(raw: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| StorageError::field("created", "Enter a valid date (YYYY-MM-DD)."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_title_and_content() {
        let errors = validate_fields(&PostInput::default(), true);
        assert_eq!(errors.messages("title"), ["This field is required."]);
        assert_eq!(errors.messages("content"), ["This field is required."]);
        assert!(validate_fields(&PostInput::default(), false).is_empty());
    }

    #[test]
    fn test_title_length_limit() {
        let input = PostInput {
            title: Some("x".repeat(MAX_TITLE_LEN + 1)),
            content: Some("body".into()),
            ..Default::default()
        };
        let errors = validate_fields(&input, true);
        assert!(errors.contains("title"));
        assert!(!errors.contains("content"));
    }

    #[test]
    fn test_input_distinguishes_null_from_absent() {
        let absent: PostInput = serde_json::from_str(r#"{"title": "t"}"#).unwrap();
        assert_eq!(absent.scheduled_at, None);

        let cleared: PostInput = serde_json::from_str(r#"{"scheduledAt": null}"#).unwrap();
        assert_eq!(cleared.scheduled_at, Some(None));

        let set: PostInput =
            serde_json::from_str(r#"{"status": "scheduled", "scheduledAt": "2030-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(set.status, Some(PostStatus::Scheduled));
        assert!(matches!(set.scheduled_at, Some(Some(_))));
    }
}
