//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::StorageError;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Upgrading schema from v{} to v{}", current_version, SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, StorageError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| StorageError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let row = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<VersionRow>(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Failed to read schema_version: {}", e)))?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), StorageError> {
    conn.batch_execute(&format!(
        "DELETE FROM schema_version; INSERT INTO schema_version (version) VALUES ({});",
        version
    ))
    .map_err(|e| StorageError::Internal(format!("Failed to set schema_version: {}", e)))
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    conn.batch_execute(IDENTITY_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create identity tables: {}", e)))?;

    conn.batch_execute(CONTENT_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create content tables: {}", e)))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Accounts, profiles and the follow graph
const IDENTITY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY NOT NULL,
    account_id TEXT NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    bio TEXT NOT NULL DEFAULT '',
    date_of_birth TEXT,
    location TEXT NOT NULL DEFAULT '',
    gender TEXT NOT NULL DEFAULT 'Other',
    profile_picture TEXT,
    is_private INTEGER NOT NULL DEFAULT 0,

    -- Denormalized counters, maintained by counter events
    followers_count INTEGER NOT NULL DEFAULT 0 CHECK (followers_count >= 0),
    following_count INTEGER NOT NULL DEFAULT 0 CHECK (following_count >= 0),
    posts_count INTEGER NOT NULL DEFAULT 0 CHECK (posts_count >= 0),

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS follows (
    id TEXT PRIMARY KEY NOT NULL,
    follower_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    following_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    status TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'rejected')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (follower_id, following_id),
    CHECK (follower_id <> following_id)
);
"#;

/// Posts, tags, likes and comments
const CONTENT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY NOT NULL,
    author_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    media TEXT,
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'scheduled', 'published', 'canceled')),

    -- Handle of the deferred publish task, if one is registered
    scheduled_task_id TEXT,
    scheduled_at TEXT,
    published_at TEXT,

    likes_count INTEGER NOT NULL DEFAULT 0 CHECK (likes_count >= 0),
    comments_count INTEGER NOT NULL DEFAULT 0 CHECK (comments_count >= 0),

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (author_id, title),
    CHECK ((status = 'scheduled') = (scheduled_at IS NOT NULL)),
    CHECK ((status = 'published') = (published_at IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS post_tags (
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (post_id, tag_id)
);

CREATE TABLE IF NOT EXISTS likes (
    id TEXT PRIMARY KEY NOT NULL,
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    profile_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE (post_id, profile_id)
);

-- Comments are tombstoned, never removed, so threads keep their shape
CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY NOT NULL,
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    author_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    parent_id TEXT REFERENCES comments(id) ON DELETE SET NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_follows_follower ON follows(follower_id, status);
CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id, status);
CREATE INDEX IF NOT EXISTS idx_profiles_private ON profiles(is_private);
CREATE INDEX IF NOT EXISTS idx_posts_published ON posts(created_at) WHERE status = 'published';
CREATE INDEX IF NOT EXISTS idx_posts_author_published ON posts(author_id, created_at) WHERE status = 'published';
CREATE INDEX IF NOT EXISTS idx_posts_scheduled ON posts(author_id, scheduled_at) WHERE status = 'scheduled';
CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id, created_at);
CREATE INDEX IF NOT EXISTS idx_likes_profile ON likes(profile_id, created_at);
CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at);
CREATE INDEX IF NOT EXISTS idx_comments_thread ON comments(post_id, parent_id, created_at);
CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id, created_at);
"#;
