//! Integration tests for the follow graph, counters and visibility

mod common;

use agora::db::models::FollowStatus;
use agora::db::{follows, Pagination};
use agora::services::{FollowOutcome, UnfollowOutcome};
use agora::visibility::Visibility;
use agora::StorageError;
use common::{Harness, User};

fn accepted_followers(h: &Harness, user: &User) -> i64 {
    let mut conn = h.db.conn().unwrap();
    follows::count_accepted_followers(&mut conn, &user.profile_id).unwrap()
}

#[test]
fn test_followers_count_matches_accepted_edges() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let fans: Vec<User> = (0..3).map(|i| h.user(&format!("fan{}@example.com", i))).collect();

    for fan in &fans {
        h.services.follows.follow(&h.ctx(fan), &ada.profile_id).unwrap();
    }
    // Repeats change nothing
    let again = h.services.follows.follow(&h.ctx(&fans[0]), &ada.profile_id).unwrap();
    assert!(matches!(again, FollowOutcome::Existing(_)));

    assert_eq!(h.profile(&ada).followers_count, 3);
    assert_eq!(accepted_followers(&h, &ada), 3);

    h.services.follows.unfollow(&h.ctx(&fans[1]), &ada.profile_id).unwrap();
    assert_eq!(h.profile(&ada).followers_count, 2);
    assert_eq!(accepted_followers(&h, &ada), 2);
    assert_eq!(h.profile(&fans[1]).following_count, 0);
    assert_eq!(h.profile(&fans[0]).following_count, 1);

    let gone = h.services.follows.unfollow(&h.ctx(&fans[1]), &ada.profile_id).unwrap();
    assert!(matches!(gone, UnfollowOutcome::NotFollowing));
    assert_eq!(h.profile(&ada).followers_count, 2);
}

#[test]
fn test_private_follow_counts_only_after_accept() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    h.make_private(&ada);

    let outcome = h.services.follows.follow(&h.ctx(&bob), &ada.profile_id).unwrap();
    assert!(matches!(outcome, FollowOutcome::Pending(_)));
    assert_eq!(h.profile(&ada).followers_count, 0);

    let inbox = h.services.follows.pending_requests(&h.ctx(&ada)).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].follower.profile.id, bob.profile_id);

    let accepted = h.services.follows.accept(&h.ctx(&ada), &bob.profile_id).unwrap();
    assert_eq!(accepted.status(), FollowStatus::Accepted);
    assert_eq!(h.profile(&ada).followers_count, 1);
    assert_eq!(h.profile(&bob).following_count, 1);

    // A second accept finds no pending request and moves nothing
    assert!(matches!(
        h.services.follows.accept(&h.ctx(&ada), &bob.profile_id),
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(h.profile(&ada).followers_count, 1);
}

#[test]
fn test_private_profile_is_partial_until_follow_accepted() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    h.make_private(&ada);

    let detail = h.services.profiles.get_profile(&h.ctx(&bob), &ada.profile_id).unwrap();
    assert_eq!(detail.visibility, Visibility::Partial);

    h.services.follows.follow(&h.ctx(&bob), &ada.profile_id).unwrap();
    let detail = h.services.profiles.get_profile(&h.ctx(&bob), &ada.profile_id).unwrap();
    assert_eq!(detail.visibility, Visibility::Partial);
    assert_eq!(detail.follow_status, Some(FollowStatus::Pending));

    h.services.follows.accept(&h.ctx(&ada), &bob.profile_id).unwrap();
    let detail = h.services.profiles.get_profile(&h.ctx(&bob), &ada.profile_id).unwrap();
    assert_eq!(detail.visibility, Visibility::Full);
    assert_eq!(detail.follow_status, Some(FollowStatus::Accepted));

    // Anonymous viewers see identity fields only
    let anon = h.services.profiles.context_for(None).unwrap();
    let detail = h.services.profiles.get_profile(&anon, &ada.profile_id).unwrap();
    assert_eq!(detail.visibility, Visibility::Partial);
}

#[test]
fn test_private_author_posts_hidden_until_follow_accepted() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    h.make_private(&ada);
    let post_id = h.publish(&ada, "Members only", "hi #club");

    assert!(matches!(
        h.services.posts.get(&h.ctx(&bob), &post_id),
        Err(StorageError::Forbidden(_))
    ));
    let feed = h.services.posts.feed(&h.ctx(&bob), &Default::default(), Pagination::default()).unwrap();
    assert_eq!(feed.total, 0);

    h.services.follows.follow(&h.ctx(&bob), &ada.profile_id).unwrap();
    assert!(h.services.posts.get(&h.ctx(&bob), &post_id).is_err());

    h.services.follows.accept(&h.ctx(&ada), &bob.profile_id).unwrap();
    let detail = h.services.posts.get(&h.ctx(&bob), &post_id).unwrap();
    assert_eq!(detail.tags, vec!["club".to_string()]);
    let feed = h.services.posts.feed(&h.ctx(&bob), &Default::default(), Pagination::default()).unwrap();
    assert_eq!(feed.total, 1);

    // Unfollowing hides it again
    h.services.follows.unfollow(&h.ctx(&bob), &ada.profile_id).unwrap();
    assert!(h.services.posts.get(&h.ctx(&bob), &post_id).is_err());
}

#[test]
fn test_reject_then_refollow_goes_back_to_pending() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    h.make_private(&ada);

    h.services.follows.follow(&h.ctx(&bob), &ada.profile_id).unwrap();
    let rejected = h.services.follows.reject(&h.ctx(&ada), &bob.profile_id).unwrap();
    assert_eq!(rejected.status(), FollowStatus::Rejected);

    let outcome = h.services.follows.follow(&h.ctx(&bob), &ada.profile_id).unwrap();
    assert!(matches!(outcome, FollowOutcome::Pending(_)));
    assert_eq!(h.profile(&ada).followers_count, 0);
}

#[test]
fn test_profile_directory_annotates_follow_status() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    let cy = h.user("cy@example.com");
    h.services.follows.follow(&h.ctx(&ada), &bob.profile_id).unwrap();

    let listed = h.services.profiles.list_profiles(&h.ctx(&ada), Pagination::default()).unwrap();
    assert_eq!(listed.total, 2);
    for entry in &listed.items {
        if entry.profile.profile.id == bob.profile_id {
            assert_eq!(entry.follow_status, Some(FollowStatus::Accepted));
        } else {
            assert_eq!(entry.profile.profile.id, cy.profile_id);
            assert_eq!(entry.follow_status, None);
        }
    }
}
