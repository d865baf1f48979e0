//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agora::db::RequestContext;
use agora::services::post_service::PostInput;
use agora::{Config, Db, ManualScheduler, Services, TaskScheduler};
use chrono::{DateTime, Utc};
use tempfile::TempDir;

/// A registered account and its profile
pub struct User {
    pub account_id: String,
    pub profile_id: String,
}

/// Services over a throwaway database and a manual scheduler
pub struct Harness {
    pub services: Services,
    pub scheduler: Arc<ManualScheduler>,
    pub db: Arc<Db>,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_comment_interval(0)
    }

    pub fn with_comment_interval(secs: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Db::open_at(&dir.path().join("agora.db"), 4, Duration::from_secs(2)).unwrap());
        let scheduler = Arc::new(ManualScheduler::new());
        let config = Config {
            comment_min_interval_secs: secs,
            ..Config::default()
        };
        let backend: Arc<dyn TaskScheduler> = scheduler.clone();
        let services = Services::new(db.clone(), backend, &config);
        Self {
            services,
            scheduler,
            db,
            _dir: dir,
        }
    }

    pub fn user(&self, email: &str) -> User {
        let account = self.services.profiles.register(email).unwrap();
        let profile = self.services.profiles.get_or_create_profile(&account.id).unwrap();
        User {
            account_id: account.id,
            profile_id: profile.id,
        }
    }

    /// Fresh context; follow edges are read at build time
    pub fn ctx(&self, user: &User) -> RequestContext {
        self.services.profiles.context_for(Some(&user.account_id)).unwrap()
    }

    pub fn make_private(&self, user: &User) {
        let patch = serde_json::from_str(r#"{"isPrivate": true}"#).unwrap();
        self.services.profiles.update_me(&self.ctx(user), patch).unwrap();
    }

    pub fn publish(&self, user: &User, title: &str, content: &str) -> String {
        let input = PostInput {
            title: Some(title.into()),
            content: Some(content.into()),
            status: Some(agora::db::models::PostStatus::Published),
            ..Default::default()
        };
        self.services.posts.create(&self.ctx(user), input).unwrap().post.id
    }

    pub fn schedule(&self, user: &User, title: &str, at: DateTime<Utc>) -> String {
        let input = PostInput {
            title: Some(title.into()),
            content: Some("scheduled body".into()),
            status: Some(agora::db::models::PostStatus::Scheduled),
            scheduled_at: Some(Some(at)),
            ..Default::default()
        };
        self.services.posts.create(&self.ctx(user), input).unwrap().post.id
    }

    pub fn profile(&self, user: &User) -> agora::db::models::Profile {
        let mut conn = self.db.conn().unwrap();
        agora::db::profiles::get_profile(&mut conn, &user.profile_id).unwrap().unwrap()
    }

    pub fn post(&self, id: &str) -> Option<agora::db::models::Post> {
        let mut conn = self.db.conn().unwrap();
        agora::db::posts::get_post(&mut conn, id).unwrap()
    }
}
