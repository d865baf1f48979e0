//! SQLite database module for the social graph and post storage
//!
//! ## Architecture
//!
//! - Diesel over a pooled set of SQLite connections (r2d2)
//! - Repository functions take `&mut SqliteConnection` so services can
//!   compose them inside one transaction
//! - Status-changing work runs under `BEGIN IMMEDIATE`, which takes the
//!   database write lock before the first read
//!
//! ## Tables
//!
//! - `accounts` / `profiles` - identity and denormalized counters
//! - `follows` - directed follow edges with a tri-state status
//! - `posts` / `tags` / `post_tags` - posts and their hashtags
//! - `likes` / `comments` - engagement

pub mod accounts;
pub mod comments;
pub mod context;
pub mod diesel_schema;
pub mod follows;
pub mod likes;
pub mod models;
pub mod pagination;
pub mod posts;
pub mod profiles;
pub mod schema;
pub mod tags;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::info;

use crate::config::Config;
use crate::error::StorageError;

pub use context::{RequestContext, Viewer};
pub use models::{current_timestamp, format_timestamp, parse_timestamp};
pub use pagination::{PageParams, Paged, Pagination};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas applied when the pool opens a connection
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database
pub struct Db {
    pool: DbPool,
}

impl Db {
    /// Open or create the database described by `config`
    pub fn open(config: &Config) -> Result<Self, StorageError> {
        Self::open_at(&config.database_path(), config.pool_size, config.busy_timeout())
    }

    /// Open or create a database file with explicit pool settings
    pub fn open_at(
        db_path: &Path,
        pool_size: u32,
        busy_timeout: Duration,
    ) -> Result<Self, StorageError> {
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(busy_timeout.max(Duration::from_secs(1)))
            .connection_customizer(Box::new(ConnectionOptions { busy_timeout }))
            .build(manager)
            .map_err(|e| StorageError::Pool(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };

        let mut conn = db.conn()?;
        // WAL is persistent per database file
        conn.batch_execute("PRAGMA journal_mode = WAL;")
            .map_err(|e| StorageError::Internal(format!("Failed to set PRAGMA: {}", e)))?;
        schema::init_schema(&mut conn)?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<PooledConn, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Pool(format!("Failed to get connection: {}", e)))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run `f` with a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Run `f` inside `BEGIN IMMEDIATE`; rolls back on error
    pub fn with_write_txn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn()?;
        conn.immediate_transaction(f)
    }
}
