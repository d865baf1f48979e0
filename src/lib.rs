//! Agora - social graph backend
//!
//! Profiles, a follow graph with private accounts, posts with a scheduled
//! publication lifecycle, likes and threaded comments, served over a small
//! JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! http (routing, views)
//!     |
//! services (validation, visibility, transactions, counters, events)
//!     |                         \
//! db (diesel repositories)      scheduler (deferred publish tasks)
//!     |
//! SQLite
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/agora/
//! ├── agora.db          # SQLite database (WAL mode)
//! └── config.toml       # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod scheduler;
pub mod services;
pub mod tags;
pub mod views;
pub mod visibility;

// Re-exports
pub use config::{Config, SchedulerBackend};
pub use db::{Db, RequestContext};
pub use error::StorageError;
pub use http::HttpServer;
pub use scheduler::{ManualScheduler, TaskScheduler, TokioScheduler};
pub use services::Services;
