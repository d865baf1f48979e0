//! Integration tests for likes, comments, tags and recommendations

mod common;

use agora::db::{comments, likes, Pagination};
use agora::services::comment_service::{CommentInput, CommentQuery};
use agora::tags::TagMode;
use agora::StorageError;
use common::Harness;

fn comment(post_id: &str, content: &str, parent: Option<&str>) -> CommentInput {
    CommentInput {
        post_id: post_id.to_string(),
        content: content.to_string(),
        parent_id: parent.map(str::to_string),
    }
}

#[test]
fn test_like_is_idempotent_and_counted() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    let post_id = h.publish(&ada, "Likeable", "body");

    let first = h.services.likes.like(&h.ctx(&bob), &post_id).unwrap();
    let again = h.services.likes.like(&h.ctx(&bob), &post_id).unwrap();
    assert!(first.liked && again.liked);
    assert_eq!(again.likes_count, 1);

    h.services.likes.like(&h.ctx(&ada), &post_id).unwrap();
    let mut conn = h.db.conn().unwrap();
    assert_eq!(likes::count_likes(&mut conn, &post_id).unwrap(), 2);
    drop(conn);
    assert_eq!(h.post(&post_id).unwrap().likes_count, 2);

    let removed = h.services.likes.unlike(&h.ctx(&bob), &post_id).unwrap();
    let removed_again = h.services.likes.unlike(&h.ctx(&bob), &post_id).unwrap();
    assert!(!removed.liked);
    assert_eq!(removed_again.likes_count, 1);

    let status = h.services.likes.status(&h.ctx(&bob), &post_id).unwrap();
    assert!(!status.liked);
    assert_eq!(status.likes_count, 1);
}

#[test]
fn test_cannot_like_hidden_post() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    h.make_private(&ada);
    let post_id = h.publish(&ada, "Private", "body");

    assert!(matches!(
        h.services.likes.like(&h.ctx(&bob), &post_id),
        Err(StorageError::Forbidden(_))
    ));
    assert_eq!(h.post(&post_id).unwrap().likes_count, 0);
}

#[test]
fn test_liked_listing_and_liked_by_me_flag() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    let liked = h.publish(&ada, "Liked", "one");
    h.publish(&ada, "Skipped", "two");
    h.services.likes.like(&h.ctx(&bob), &liked).unwrap();

    let listed = h.services.posts.liked(&h.ctx(&bob), Pagination::default()).unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].post.id, liked);
    assert!(listed.items[0].liked_by_me);

    assert!(h.services.posts.get(&h.ctx(&bob), &liked).unwrap().liked_by_me);
}

#[test]
fn test_comment_counts_and_tombstones() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    let post_id = h.publish(&ada, "Discuss", "body");

    let top = h.services.comments.create(&h.ctx(&bob), comment(&post_id, "first!", None)).unwrap();
    let reply = h
        .services
        .comments
        .create(&h.ctx(&ada), comment(&post_id, "thanks", Some(&top.comment.id)))
        .unwrap();
    assert_eq!(h.post(&post_id).unwrap().comments_count, 2);

    // Replies are one level deep
    let nested = h
        .services
        .comments
        .create(&h.ctx(&bob), comment(&post_id, "deeper", Some(&reply.comment.id)));
    assert!(matches!(nested, Err(StorageError::Validation(_))));

    // Only the author may delete
    assert!(matches!(
        h.services.comments.delete(&h.ctx(&ada), &top.comment.id),
        Err(StorageError::Forbidden(_))
    ));
    h.services.comments.delete(&h.ctx(&bob), &top.comment.id).unwrap();
    assert_eq!(h.post(&post_id).unwrap().comments_count, 1);
    assert!(matches!(
        h.services.comments.delete(&h.ctx(&bob), &top.comment.id),
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(h.post(&post_id).unwrap().comments_count, 1);

    // The tombstoned parent stays in the thread while it has live replies
    let thread = h.services.comments.thread(&h.ctx(&bob), &post_id).unwrap();
    assert_eq!(thread.len(), 1);
    assert!(thread[0].comment.is_deleted());
    assert_eq!(thread[0].replies.len(), 1);
    assert_eq!(thread[0].replies[0].comment.content, "thanks");

    let children = h.services.comments.children(&h.ctx(&bob), &top.comment.id).unwrap();
    assert_eq!(children.len(), 1);

    let query = CommentQuery {
        post: Some(post_id.clone()),
        ..Default::default()
    };
    let listed = h.services.comments.list(&h.ctx(&bob), &query, Pagination::default()).unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].comment.id, reply.comment.id);
}

#[test]
fn test_comment_spam_guard() {
    let h = Harness::with_comment_interval(60);
    let ada = h.user("ada@example.com");
    let post_id = h.publish(&ada, "Busy", "body");

    h.services.comments.create(&h.ctx(&ada), comment(&post_id, "one", None)).unwrap();
    let err = h
        .services
        .comments
        .create(&h.ctx(&ada), comment(&post_id, "two", None))
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidInput(ref msg) if msg == "You are commenting too quickly."));
    assert_eq!(h.post(&post_id).unwrap().comments_count, 1);
}

#[test]
fn test_comment_on_hidden_or_missing_post() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    h.make_private(&ada);
    let post_id = h.publish(&ada, "Private", "body");

    assert!(matches!(
        h.services.comments.create(&h.ctx(&bob), comment(&post_id, "hi", None)),
        Err(StorageError::Forbidden(_))
    ));
    match h.services.comments.create(&h.ctx(&bob), comment("missing", "hi", None)) {
        Err(StorageError::Validation(errors)) => assert_eq!(errors.messages("post_id").len(), 1),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_comment_edit_refused_once_post_is_hidden() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");
    let post_id = h.publish(&ada, "Open for now", "body");
    let id = h
        .services
        .comments
        .create(&h.ctx(&bob), comment(&post_id, "original", None))
        .unwrap()
        .comment
        .id;

    h.make_private(&ada);
    assert!(matches!(
        h.services.comments.update(&h.ctx(&bob), &id, "edited"),
        Err(StorageError::Forbidden(_))
    ));

    let mut conn = h.db.conn().unwrap();
    let stored = comments::get_comment(&mut conn, &id).unwrap().unwrap();
    assert_eq!(stored.content, "original");
}

#[test]
fn test_tags_follow_content_edits() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let post_id = h.publish(&ada, "Tagged", "learning #Rust and #tokio #rust");
    assert_eq!(h.services.posts.get(&h.ctx(&ada), &post_id).unwrap().tags, vec!["rust", "tokio"]);

    let edit = agora::services::post_service::PostInput {
        content: Some("now about #diesel".into()),
        ..Default::default()
    };
    let updated = h.services.posts.update(&h.ctx(&ada), &post_id, edit, true).unwrap();
    assert_eq!(updated.tags, vec!["diesel"]);
}

#[test]
fn test_by_tag_all_and_any() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let both = h.publish(&ada, "Both", "#rust #web");
    let rust_only = h.publish(&ada, "Rust", "#rust");
    h.publish(&ada, "Other", "#cooking");

    let tags = vec!["rust".to_string(), "web".to_string()];
    let all = h
        .services
        .posts
        .by_tag(&h.ctx(&ada), tags.clone(), TagMode::All, Pagination::default())
        .unwrap();
    assert_eq!(all.total, 1);
    assert_eq!(all.items[0].post.id, both);

    let any = h
        .services
        .posts
        .by_tag(&h.ctx(&ada), tags, TagMode::Any, Pagination::default())
        .unwrap();
    let ids: Vec<&str> = any.items.iter().map(|s| s.post.id.as_str()).collect();
    assert_eq!(any.total, 2);
    assert!(ids.contains(&both.as_str()) && ids.contains(&rust_only.as_str()));

    assert!(matches!(
        h.services.posts.by_tag(&h.ctx(&ada), vec![], TagMode::Any, Pagination::default()),
        Err(StorageError::Validation(_))
    ));
}

#[test]
fn test_recommendations_share_tags_with_engaged_posts() {
    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let bob = h.user("bob@example.com");

    let seed = h.publish(&ada, "Seed", "#rust basics");
    let popular = h.publish(&ada, "Popular", "#rust advanced");
    let fresh = h.publish(&ada, "Fresh", "#rust news");
    h.publish(&ada, "Unrelated", "#cooking");

    h.services.likes.like(&h.ctx(&bob), &seed).unwrap();
    h.services.likes.like(&h.ctx(&ada), &popular).unwrap();
    h.services.likes.like(&h.ctx(&bob), &popular).unwrap();

    let recommended = h.services.posts.recommended(&h.ctx(&bob), Pagination::default()).unwrap();
    let ids: Vec<&str> = recommended.items.iter().map(|s| s.post.id.as_str()).collect();
    assert_eq!(recommended.total, 3);
    assert_eq!(ids[0], popular);
    assert!(ids.contains(&fresh.as_str()));
    assert!(ids.contains(&seed.as_str()));

    // No engagement, no recommendations
    let cy = h.user("cy@example.com");
    assert_eq!(h.services.posts.recommended(&h.ctx(&cy), Pagination::default()).unwrap().total, 0);
}

#[test]
fn test_feed_search_and_date_filters_are_literal() {
    use agora::services::post_service::PostQuery;

    let h = Harness::new();
    let ada = h.user("ada@example.com");
    let sale = h.publish(&ada, "Sale", "now 50% off");
    h.publish(&ada, "Plain", "nothing special");

    let search = |term: &str| PostQuery {
        search: Some(term.to_string()),
        ..Default::default()
    };
    let feed = |query: &PostQuery| h.services.posts.feed(&h.ctx(&ada), query, Pagination::default());

    // Wildcards in user text match only themselves
    assert_eq!(feed(&search("_")).unwrap().total, 0);
    let percent = feed(&search("%")).unwrap();
    assert_eq!(percent.total, 1);
    assert_eq!(percent.items[0].post.id, sale);

    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let on_day = PostQuery {
        created: Some(today),
        ..Default::default()
    };
    assert_eq!(feed(&on_day).unwrap().total, 2);

    let wildcard_day = PostQuery {
        created: Some("%".into()),
        ..Default::default()
    };
    match feed(&wildcard_day) {
        Err(StorageError::Validation(errors)) => assert_eq!(errors.messages("created").len(), 1),
        other => panic!("unexpected result: {other:?}"),
    }
}
