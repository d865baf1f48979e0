//! Visibility decisions for profiles, posts and comments
//!
//! Pure functions over a [`RequestContext`]; no database access. Anonymous
//! viewers see public profiles in full and private ones partially, and never
//! see posts or comments.

use crate::db::models::{Post, PostStatus, Profile};
use crate::db::posts::PostScope;
use crate::db::RequestContext;
use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Every field
    Full,
    /// Identity fields only
    Partial,
    None,
}

impl Visibility {
    pub fn is_full(self) -> bool {
        self == Visibility::Full
    }
}

/// How much of `profile` the viewer may see
pub fn can_view(ctx: &RequestContext, profile: &Profile) -> Visibility {
    if !profile.is_private() {
        return Visibility::Full;
    }
    match ctx.profile_id() {
        None => Visibility::Partial,
        Some(viewer) if viewer == profile.id => Visibility::Full,
        Some(_) if ctx.follows(&profile.id) => Visibility::Full,
        Some(_) => Visibility::Partial,
    }
}

/// Whether the viewer may see `post`, written by `author`
pub fn can_view_post(ctx: &RequestContext, post: &Post, author: &Profile) -> Visibility {
    let Some(viewer) = ctx.profile_id() else {
        return Visibility::None;
    };
    if viewer == post.author_id {
        return Visibility::Full;
    }
    if post.status() != PostStatus::Published {
        return Visibility::None;
    }
    if can_view(ctx, author).is_full() {
        Visibility::Full
    } else {
        Visibility::None
    }
}

/// Comments inherit the visibility of their post
pub fn can_view_comment(ctx: &RequestContext, post: &Post, post_author: &Profile) -> Visibility {
    can_view_post(ctx, post, post_author)
}

/// Listing scope matching [`can_view_post`] for published posts
pub fn visible_post_scope(ctx: &RequestContext) -> Result<PostScope, StorageError> {
    let viewer = ctx.require_profile()?;
    Ok(PostScope::Visible {
        viewer: viewer.to_string(),
        following: ctx.following_ids(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, private: bool) -> Profile {
        Profile {
            id: id.to_string(),
            account_id: format!("acct-{}", id),
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            date_of_birth: None,
            location: String::new(),
            gender: "Other".to_string(),
            profile_picture: None,
            is_private: private as i32,
            followers_count: 0,
            following_count: 0,
            posts_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn post(author: &str, status: PostStatus) -> Post {
        Post {
            id: "post".to_string(),
            author_id: author.to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            media: None,
            status: status.as_str().to_string(),
            scheduled_task_id: None,
            scheduled_at: None,
            published_at: None,
            likes_count: 0,
            comments_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_public_profile_is_full_for_everyone() {
        let alice = profile("alice", false);
        assert_eq!(can_view(&RequestContext::anonymous(), &alice), Visibility::Full);
        assert_eq!(can_view(&RequestContext::for_profile("bob", vec![]), &alice), Visibility::Full);
    }

    #[test]
    fn test_private_profile_needs_accepted_follow() {
        let alice = profile("alice", true);
        assert_eq!(can_view(&RequestContext::anonymous(), &alice), Visibility::Partial);
        assert_eq!(can_view(&RequestContext::for_profile("bob", vec![]), &alice), Visibility::Partial);
        assert_eq!(
            can_view(&RequestContext::for_profile("bob", vec!["alice".to_string()]), &alice),
            Visibility::Full
        );
        assert_eq!(can_view(&RequestContext::for_profile("alice", vec![]), &alice), Visibility::Full);
    }

    #[test]
    fn test_owner_sees_unpublished_posts() {
        let alice = profile("alice", true);
        let draft = post("alice", PostStatus::Draft);
        assert_eq!(
            can_view_post(&RequestContext::for_profile("alice", vec![]), &draft, &alice),
            Visibility::Full
        );
        let follower = RequestContext::for_profile("bob", vec!["alice".to_string()]);
        assert_eq!(can_view_post(&follower, &draft, &alice), Visibility::None);
    }

    #[test]
    fn test_published_post_of_private_author() {
        let alice = profile("alice", true);
        let published = post("alice", PostStatus::Published);
        let stranger = RequestContext::for_profile("bob", vec![]);
        let follower = RequestContext::for_profile("bob", vec!["alice".to_string()]);
        assert_eq!(can_view_post(&stranger, &published, &alice), Visibility::None);
        assert_eq!(can_view_post(&follower, &published, &alice), Visibility::Full);
        assert_eq!(can_view_comment(&follower, &published, &alice), Visibility::Full);
    }

    #[test]
    fn test_anonymous_never_sees_posts() {
        let alice = profile("alice", false);
        let published = post("alice", PostStatus::Published);
        assert_eq!(
            can_view_post(&RequestContext::anonymous(), &published, &alice),
            Visibility::None
        );
        assert!(visible_post_scope(&RequestContext::anonymous()).is_err());
    }
}
