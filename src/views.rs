//! API view types - the JSON shapes handlers send
//!
//! Models keep their storage representation (TEXT timestamps, INTEGER
//! booleans, snake_case). Views are what clients see: camelCase keys, real
//! booleans, and only the fields the viewer is allowed.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::db::models::{Account, Follow, FollowStatus, Post, ProfileWithEmail};
use crate::db::Paged;
use crate::services::comment_service::{CommentDetail, ThreadNode};
use crate::services::follow_service::{FollowOutcome, FollowRequest, UnfollowOutcome};
use crate::services::like_service::LikeStatus;
use crate::services::post_service::{PostDetail, PostSummary};
use crate::services::profile_service::{ProfileDetail, ProfileListEntry};
use crate::visibility::Visibility;

/// Deserialize a field where `null` and absent mean different things.
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`:
/// absent gives `None`, `null` gives `Some(None)`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

// ============================================================================
// Account & Profile Views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub email: String,
    pub created_at: String,
}

impl From<Account> for AccountView {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            email: a.email,
            created_at: a.created_at,
        }
    }
}

/// Every profile field
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFullView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub date_of_birth: Option<String>,
    pub age: Option<i32>,
    pub location: String,
    pub gender: String,
    pub profile_picture: Option<String>,
    pub is_private: bool,
    pub followers_count: i32,
    pub following_count: i32,
    pub posts_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_status: Option<FollowStatus>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProfileFullView {
    /// The caller's own profile, email included
    pub fn own(p: ProfileWithEmail) -> Self {
        let email = p.email.clone();
        let mut view = Self::from_profile(p, None);
        view.email = Some(email);
        view
    }

    fn from_profile(p: ProfileWithEmail, follow_status: Option<FollowStatus>) -> Self {
        let full_name = p.full_name();
        let age = p.profile.age(Utc::now().date_naive());
        let profile = p.profile;
        Self {
            is_private: profile.is_private(),
            id: profile.id,
            email: None,
            full_name,
            first_name: profile.first_name,
            last_name: profile.last_name,
            bio: profile.bio,
            date_of_birth: profile.date_of_birth,
            age,
            location: profile.location,
            gender: profile.gender,
            profile_picture: profile.profile_picture,
            followers_count: profile.followers_count,
            following_count: profile.following_count,
            posts_count: profile.posts_count,
            follow_status,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

/// Identity fields of a private profile the viewer does not follow
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePartialView {
    pub id: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_status: Option<FollowStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProfileView {
    Full(Box<ProfileFullView>),
    Partial(ProfilePartialView),
}

impl From<ProfileDetail> for ProfileView {
    fn from(d: ProfileDetail) -> Self {
        match d.visibility {
            Visibility::Full => {
                ProfileView::Full(Box::new(ProfileFullView::from_profile(d.profile, d.follow_status)))
            }
            Visibility::Partial | Visibility::None => ProfileView::Partial(ProfilePartialView {
                full_name: d.profile.full_name(),
                is_private: d.profile.profile.is_private(),
                id: d.profile.profile.id,
                profile_picture: d.profile.profile.profile_picture,
                follow_status: d.follow_status,
            }),
        }
    }
}

/// Row of the profile directory
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileListItem {
    pub id: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub is_private: bool,
    pub followers_count: i32,
    pub follow_status: Option<FollowStatus>,
}

impl From<ProfileListEntry> for ProfileListItem {
    fn from(e: ProfileListEntry) -> Self {
        let full_name = e.profile.full_name();
        let profile = e.profile.profile;
        Self {
            is_private: profile.is_private(),
            id: profile.id,
            full_name,
            profile_picture: profile.profile_picture,
            followers_count: profile.followers_count,
            follow_status: e.follow_status,
        }
    }
}

// ============================================================================
// Follow Views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowView {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    pub status: FollowStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Follow> for FollowView {
    fn from(f: Follow) -> Self {
        Self {
            status: f.status(),
            id: f.id,
            follower_id: f.follower_id,
            following_id: f.following_id,
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

/// Result of a follow or unfollow call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResultView {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FollowStatus>,
}

impl From<&FollowOutcome> for FollowResultView {
    fn from(o: &FollowOutcome) -> Self {
        Self {
            detail: o.message().to_string(),
            status: Some(o.follow().status()),
        }
    }
}

impl From<UnfollowOutcome> for FollowResultView {
    fn from(o: UnfollowOutcome) -> Self {
        Self {
            detail: o.message().to_string(),
            status: None,
        }
    }
}

/// Inbound pending request with the requester's identity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequestView {
    pub follower_id: String,
    pub follower_name: String,
    pub follower_picture: Option<String>,
    pub requested_at: String,
}

impl From<FollowRequest> for FollowRequestView {
    fn from(r: FollowRequest) -> Self {
        Self {
            follower_name: r.follower.full_name(),
            follower_id: r.follow.follower_id,
            follower_picture: r.follower.profile.profile_picture,
            requested_at: r.follow.created_at,
        }
    }
}

/// Accept / reject result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDecisionView {
    pub detail: String,
    pub follower_id: String,
    pub status: FollowStatus,
}

impl From<Follow> for RequestDecisionView {
    fn from(f: Follow) -> Self {
        let status = f.status();
        let detail = match status {
            FollowStatus::Accepted => "Request accepted (Accepted).",
            FollowStatus::Rejected => "Request rejected (Rejected).",
            FollowStatus::Pending => "Request pending (Pending).",
        };
        Self {
            detail: detail.to_string(),
            follower_id: f.follower_id,
            status,
        }
    }
}

/// Plain `{"detail": "..."}` body
#[derive(Debug, Clone, Serialize)]
pub struct DetailView {
    pub detail: String,
}

impl DetailView {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

// ============================================================================
// Post Views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthorView {
    pub id: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
}

/// Post detail
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub author: PostAuthorView,
    pub title: String,
    pub content: String,
    pub media: Option<String>,
    pub status: String,
    pub scheduled_at: Option<String>,
    pub published_at: Option<String>,
    pub tags: Vec<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub liked_by_me: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PostDetail> for PostView {
    fn from(d: PostDetail) -> Self {
        let author = PostAuthorView {
            full_name: d.author.full_name(),
            id: d.author.profile.id,
            profile_picture: d.author.profile.profile_picture,
        };
        let p: Post = d.post;
        Self {
            id: p.id,
            author,
            title: p.title,
            content: p.content,
            media: p.media,
            status: p.status,
            scheduled_at: p.scheduled_at,
            published_at: p.published_at,
            tags: d.tags,
            likes_count: p.likes_count,
            comments_count: p.comments_count,
            liked_by_me: d.liked_by_me,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Post listing row; content omitted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListItem {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub title: String,
    pub media: Option<String>,
    pub status: String,
    pub scheduled_at: Option<String>,
    pub published_at: Option<String>,
    pub tags: Vec<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub liked_by_me: bool,
    pub created_at: String,
}

impl From<PostSummary> for PostListItem {
    fn from(s: PostSummary) -> Self {
        let p = s.post;
        Self {
            id: p.id,
            author_id: p.author_id,
            author_name: s.author_full_name,
            title: p.title,
            media: p.media,
            status: p.status,
            scheduled_at: p.scheduled_at,
            published_at: p.published_at,
            tags: s.tags,
            likes_count: p.likes_count,
            comments_count: p.comments_count,
            liked_by_me: s.liked_by_me,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatusView {
    pub liked: bool,
    pub likes_count: i32,
}

impl From<LikeStatus> for LikeStatusView {
    fn from(s: LikeStatus) -> Self {
        Self {
            liked: s.liked,
            likes_count: s.likes_count,
        }
    }
}

// ============================================================================
// Comment Views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub post_title: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub parent_id: Option<String>,
    pub children_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CommentDetail> for CommentView {
    fn from(d: CommentDetail) -> Self {
        let c = d.comment;
        Self {
            id: c.id,
            post_id: c.post_id,
            post_title: d.post_title,
            author_id: c.author_id,
            author_name: d.author_full_name,
            content: c.content,
            parent_id: c.parent_id,
            children_count: d.children_count,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Node of a post's comment tree; a tombstone keeps its place with no content
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadNodeView {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: Option<String>,
    pub is_deleted: bool,
    pub created_at: String,
    pub replies: Vec<ThreadNodeView>,
}

impl From<ThreadNode> for ThreadNodeView {
    fn from(n: ThreadNode) -> Self {
        let c = n.comment;
        let is_deleted = c.is_deleted();
        Self {
            id: c.id,
            author_id: c.author_id,
            author_name: n.author_full_name,
            content: if is_deleted { None } else { Some(c.content) },
            is_deleted,
            created_at: c.created_at,
            replies: n.replies.into_iter().map(ThreadNodeView::from).collect(),
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    /// Next page number, if any
    pub next: Option<i64>,
    pub results: Vec<T>,
}

impl<T, U> From<Paged<T>> for Page<U>
where
    U: From<T>,
{
    fn from(p: Paged<T>) -> Self {
        let next = if p.has_next() { Some(p.page.page + 1) } else { None };
        Self {
            count: p.total,
            page: p.page.page,
            page_size: p.page.page_size,
            next,
            results: p.items.into_iter().map(U::from).collect(),
        }
    }
}
