//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! Status columns are stored as TEXT and exposed through the typed enums
//! below; booleans are stored as INTEGER 0/1.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Format a timestamp for a TEXT column.
///
/// Fixed microsecond precision keeps lexical order equal to time order,
/// which the spam guard and recency ordering rely on.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Get current UTC timestamp as a string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whole years between `born` and `today`
pub fn age_on(born: NaiveDate, today: NaiveDate) -> i32 {
    use chrono::Datelike;
    let mut age = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    age
}

// ============================================================================
// Status Enums
// ============================================================================

/// Follow edge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FollowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowStatus::Pending => "pending",
            FollowStatus::Accepted => "accepted",
            FollowStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for FollowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FollowStatus::Pending),
            "accepted" => Ok(FollowStatus::Accepted),
            "rejected" => Ok(FollowStatus::Rejected),
            other => Err(format!("unknown follow status '{}'", other)),
        }
    }
}

impl fmt::Display for FollowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
    Canceled,
}

impl PostStatus {
    pub const ALL: [PostStatus; 4] = [
        PostStatus::Draft,
        PostStatus::Scheduled,
        PostStatus::Published,
        PostStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown post status '{}'", s))
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub mod genders {
    pub const MALE: &str = "Male";
    pub const FEMALE: &str = "Female";
    pub const OTHER: &str = "Other";

    pub const ALL: [&str; 3] = [MALE, FEMALE, OTHER];

    pub fn is_valid(value: &str) -> bool {
        ALL.contains(&value)
    }
}

// ============================================================================
// Account & Profile Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Account {
    pub id: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub created_at: &'a str,
}

/// Profile row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Profile {
    pub id: String,
    pub account_id: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub date_of_birth: Option<String>,
    pub location: String,
    pub gender: String,
    pub profile_picture: Option<String>,
    pub is_private: i32,
    pub followers_count: i32,
    pub following_count: i32,
    pub posts_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    pub fn is_private(&self) -> bool {
        self.is_private == 1
    }

    /// Display name: both name parts, either one, or the email local part
    pub fn full_name(&self, email: &str) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => email.split('@').next().unwrap_or_default().to_string(),
        }
    }

    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        self.date_of_birth
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(|born| age_on(born, today))
    }
}

/// Profile joined with its account email (needed for the display name)
#[derive(Debug, Clone)]
pub struct ProfileWithEmail {
    pub profile: Profile,
    pub email: String,
}

impl ProfileWithEmail {
    pub fn full_name(&self) -> String {
        self.profile.full_name(&self.email)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile<'a> {
    pub id: &'a str,
    pub account_id: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Partial profile update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = profiles)]
pub struct ProfileChangeset {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub date_of_birth: Option<Option<String>>,
    pub location: Option<String>,
    pub gender: Option<String>,
    pub profile_picture: Option<Option<String>>,
    pub is_private: Option<i32>,
    pub updated_at: Option<String>,
}

// ============================================================================
// Follow Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = follows)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Follow {
    pub fn status(&self) -> FollowStatus {
        self.status.parse().unwrap_or(FollowStatus::Pending)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = follows)]
pub struct NewFollow<'a> {
    pub id: &'a str,
    pub follower_id: &'a str,
    pub following_id: &'a str,
    pub status: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Post Models
// ============================================================================

/// Post row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = posts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub media: Option<String>,
    pub status: String,
    pub scheduled_task_id: Option<String>,
    pub scheduled_at: Option<String>,
    pub published_at: Option<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Post {
    pub fn status(&self) -> PostStatus {
        self.status.parse().unwrap_or_default()
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at.as_deref().and_then(parse_timestamp)
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at.as_deref().and_then(parse_timestamp)
    }
}

/// Post with its tag names attached
#[derive(Debug, Clone)]
pub struct PostWithTags {
    pub post: Post,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost<'a> {
    pub id: &'a str,
    pub author_id: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub media: Option<&'a str>,
    pub status: &'a str,
    pub scheduled_at: Option<&'a str>,
    pub published_at: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Full lifecycle + content write for an existing post
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = posts)]
#[diesel(treat_none_as_null = true)]
pub struct PostStateChangeset<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub media: Option<&'a str>,
    pub status: &'a str,
    pub scheduled_task_id: Option<&'a str>,
    pub scheduled_at: Option<&'a str>,
    pub published_at: Option<&'a str>,
    pub updated_at: &'a str,
}

// ============================================================================
// Tag / Like / Comment Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Tag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tags)]
pub struct NewTag<'a> {
    pub id: String,
    pub name: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = post_tags)]
pub struct NewPostTag<'a> {
    pub post_id: &'a str,
    pub tag_id: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = likes)]
pub struct NewLike<'a> {
    pub id: &'a str,
    pub post_id: &'a str,
    pub profile_id: &'a str,
    pub created_at: &'a str,
}

/// Comment row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub parent_id: Option<String>,
    pub is_deleted: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Comment {
    pub fn is_deleted(&self) -> bool {
        self.is_deleted == 1
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment<'a> {
    pub id: &'a str,
    pub post_id: &'a str,
    pub author_id: &'a str,
    pub content: &'a str,
    pub parent_id: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_order_is_lexical() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(5);
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(parse_timestamp(&format_timestamp(late)), Some(late));
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let born = NaiveDate::from_ymd_opt(2000, 6, 15).unwrap();
        assert_eq!(age_on(born, NaiveDate::from_ymd_opt(2026, 6, 14).unwrap()), 25);
        assert_eq!(age_on(born, NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()), 26);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("scheduled".parse::<PostStatus>(), Ok(PostStatus::Scheduled));
        assert!("archived".parse::<PostStatus>().is_err());
        assert_eq!("accepted".parse::<FollowStatus>(), Ok(FollowStatus::Accepted));
    }
}
