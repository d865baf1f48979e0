//! Profile service - accounts, profiles and request contexts
//!
//! Registration creates the account synchronously and hands profile creation
//! to the background [`ProfileCreationWorker`](crate::scheduler::ProfileCreationWorker)
//! when one is attached. Any later access creates the profile lazily, so a
//! lost creation task only delays it.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::db::models::{age_on, genders, Account, FollowStatus, Profile, ProfileChangeset, ProfileWithEmail};
use crate::db::{accounts, follows, profiles, Db, Paged, Pagination, RequestContext};
use crate::error::{StorageError, ValidationErrors};
use crate::views::double_option;
use crate::visibility::{can_view, Visibility};

use super::events::{EventBus, SocialEvent};

const MIN_AGE: i32 = 13;
const MAX_AGE: i32 = 100;

/// Partial update of the caller's own profile
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub location: Option<String>,
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub profile_picture: Option<Option<String>>,
    pub is_private: Option<bool>,
}

/// A profile as one viewer may see it
#[derive(Debug, Clone)]
pub struct ProfileDetail {
    pub profile: ProfileWithEmail,
    pub visibility: Visibility,
    /// Viewer's edge toward this profile
    pub follow_status: Option<FollowStatus>,
}

/// Row of the profile directory
#[derive(Debug, Clone)]
pub struct ProfileListEntry {
    pub profile: ProfileWithEmail,
    pub follow_status: Option<FollowStatus>,
}

/// Profile service
pub struct ProfileService {
    db: Arc<Db>,
    events: Arc<EventBus>,
    creation_queue: Option<UnboundedSender<String>>,
}

impl ProfileService {
    pub fn new(db: Arc<Db>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            events,
            creation_queue: None,
        }
    }

    /// Send new account ids to a background profile-creation worker
    pub fn with_creation_queue(mut self, queue: UnboundedSender<String>) -> Self {
        self.creation_queue = Some(queue);
        self
    }

    // =========================================================================
    // Accounts & Contexts
    // =========================================================================

    /// Create an account and enqueue its profile
    pub fn register(&self, email: &str) -> Result<Account, StorageError> {
        let account = self.db.with_write_txn(|conn| accounts::create_account(conn, email))?;
        self.events.emit(SocialEvent::AccountRegistered {
            account_id: account.id.clone(),
        });

        let queued = match self.creation_queue {
            Some(ref queue) => queue.send(account.id.clone()).is_ok(),
            None => false,
        };
        if !queued {
            // No worker: create inline; failure here is recovered lazily
            if let Err(e) = self.get_or_create_profile(&account.id) {
                warn!(account_id = %account.id, error = %e, "Inline profile creation failed");
            }
        }

        Ok(account)
    }

    /// Profile for an account, created on first access
    pub fn get_or_create_profile(&self, account_id: &str) -> Result<Profile, StorageError> {
        let (profile, created) = self.db.with_write_txn(|conn| {
            let existed = profiles::get_profile_by_account(conn, account_id)?.is_some();
            let profile = profiles::get_or_create_profile(conn, account_id)?;
            Ok((profile, !existed))
        })?;

        if created {
            debug!(account_id = %account_id, profile_id = %profile.id, "Profile created");
            self.events.emit(SocialEvent::ProfileCreated {
                profile_id: profile.id.clone(),
                account_id: account_id.to_string(),
            });
        }
        Ok(profile)
    }

    /// Build the request context for an optional caller account
    pub fn context_for(&self, account_id: Option<&str>) -> Result<RequestContext, StorageError> {
        let Some(account_id) = account_id else {
            return Ok(RequestContext::anonymous());
        };

        let known = self.db.with_conn(|conn| accounts::get_account(conn, account_id))?;
        if known.is_none() {
            return Err(StorageError::Unauthorized(format!("unknown account {}", account_id)));
        }

        let profile = self.get_or_create_profile(account_id)?;
        let following = self
            .db
            .with_conn(|conn| follows::accepted_following_ids(conn, &profile.id))?;
        Ok(RequestContext::for_profile(profile.id, following))
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// The caller's own profile
    pub fn me(&self, ctx: &RequestContext) -> Result<ProfileWithEmail, StorageError> {
        let me = ctx.require_profile()?;
        self.db
            .with_conn(|conn| profiles::get_profile_with_email(conn, me))?
            .ok_or_else(|| StorageError::NotFound(format!("profile {}", me)))
    }

    /// A profile at the detail level the viewer is allowed
    pub fn get_profile(&self, ctx: &RequestContext, id: &str) -> Result<ProfileDetail, StorageError> {
        self.db.with_conn(|conn| {
            let profile = profiles::get_profile_with_email(conn, id)?
                .ok_or_else(|| StorageError::NotFound(format!("profile {}", id)))?;

            let follow_status = match ctx.profile_id() {
                Some(me) if me != id => follows::get_follow(conn, me, id)?.map(|f| f.status()),
                _ => None,
            };

            Ok(ProfileDetail {
                visibility: can_view(ctx, &profile.profile),
                profile,
                follow_status,
            })
        })
    }

    /// Every profile except the caller's, annotated with the caller's follow status
    pub fn list_profiles(
        &self,
        ctx: &RequestContext,
        page: Pagination,
    ) -> Result<Paged<ProfileListEntry>, StorageError> {
        self.db.with_conn(|conn| {
            let listed = profiles::list_profiles(conn, ctx.profile_id(), page)?;

            let statuses = match ctx.profile_id() {
                Some(me) => {
                    let ids: Vec<String> = listed.items.iter().map(|p| p.profile.id.clone()).collect();
                    follows::statuses_toward(conn, me, &ids)?
                }
                None => Default::default(),
            };

            Ok(listed.map(|profile| ProfileListEntry {
                follow_status: statuses.get(&profile.profile.id).copied(),
                profile,
            }))
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Apply a patch to the caller's own profile
    pub fn update_me(
        &self,
        ctx: &RequestContext,
        patch: ProfilePatch,
    ) -> Result<ProfileWithEmail, StorageError> {
        let me = ctx.require_profile()?;
        let changes = validate_patch(patch, Utc::now().date_naive())?;

        self.db.with_write_txn(|conn| profiles::update_profile(conn, me, changes))?;
        self.events.emit(SocialEvent::ProfileUpdated {
            profile_id: me.to_string(),
        });
        self.me(ctx)
    }
}

fn check_len(errors: &mut ValidationErrors, field: &str, value: &Option<String>, max: usize) {
    if let Some(ref v) = value {
        if v.chars().count() > max {
            errors.add(field, format!("Ensure this field has no more than {} characters.", max));
        }
    }
}

/// Validate a profile patch against `today` and turn it into a changeset
pub fn validate_patch(patch: ProfilePatch, today: NaiveDate) -> Result<ProfileChangeset, StorageError> {
    let mut errors = ValidationErrors::default();

    check_len(&mut errors, "first_name", &patch.first_name, 255);
    check_len(&mut errors, "last_name", &patch.last_name, 255);
    check_len(&mut errors, "bio", &patch.bio, 500);
    check_len(&mut errors, "location", &patch.location, 100);

    if let Some(ref gender) = patch.gender {
        if !genders::is_valid(gender) {
            errors.add("gender", format!("\"{}\" is not a valid choice.", gender));
        }
    }

    if let Some(Some(born)) = patch.date_of_birth {
        if born > today {
            errors.add("date_of_birth", "Birth date cannot be in the future.");
        } else {
            let age = age_on(born, today);
            if age < MIN_AGE {
                errors.add("date_of_birth", "You must be at least 13 years old to register.");
            } else if age > MAX_AGE {
                errors.add("date_of_birth", "Please enter a valid birth date.");
            }
        }
    }

    errors.into_result()?;

    Ok(ProfileChangeset {
        first_name: patch.first_name,
        last_name: patch.last_name,
        bio: patch.bio,
        date_of_birth: patch
            .date_of_birth
            .map(|d| d.map(|d| d.format("%Y-%m-%d").to_string())),
        location: patch.location,
        gender: patch.gender,
        profile_picture: patch.profile_picture,
        is_private: patch.is_private.map(i32::from),
        updated_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service() -> (TempDir, ProfileService) {
        let dir = TempDir::new().unwrap();
        let db = Db::open_at(&dir.path().join("p.db"), 2, Duration::from_millis(500)).unwrap();
        (dir, ProfileService::new(Arc::new(db), Arc::new(EventBus::new())))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn dob_patch(y: i32, m: u32, d: u32) -> ProfilePatch {
        ProfilePatch {
            date_of_birth: Some(NaiveDate::from_ymd_opt(y, m, d)),
            ..Default::default()
        }
    }

    fn dob_error(patch: ProfilePatch) -> Vec<String> {
        match validate_patch(patch, today()) {
            Err(StorageError::Validation(errors)) => errors.messages("date_of_birth").to_vec(),
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_date_of_birth_rules() {
        assert_eq!(dob_error(dob_patch(2027, 1, 1)), vec!["Birth date cannot be in the future."]);
        assert_eq!(
            dob_error(dob_patch(2013, 6, 2)),
            vec!["You must be at least 13 years old to register."]
        );
        assert_eq!(dob_error(dob_patch(1920, 1, 1)), vec!["Please enter a valid birth date."]);
        assert!(validate_patch(dob_patch(2013, 6, 1), today()).is_ok());
    }

    #[test]
    fn test_clearing_date_of_birth_is_allowed() {
        let patch = ProfilePatch {
            date_of_birth: Some(None),
            ..Default::default()
        };
        let changes = validate_patch(patch, today()).unwrap();
        assert_eq!(changes.date_of_birth, Some(None));
    }

    #[test]
    fn test_invalid_gender_rejected() {
        let patch = ProfilePatch {
            gender: Some("Robot".into()),
            ..Default::default()
        };
        assert!(validate_patch(patch, today()).is_err());
    }

    #[test]
    fn test_register_creates_profile_inline_without_worker() {
        let (_dir, service) = service();
        let account = service.register("Alice@Example.com").unwrap();
        assert_eq!(account.email, "alice@example.com");

        let ctx = service.context_for(Some(&account.id)).unwrap();
        let me = service.me(&ctx).unwrap();
        assert_eq!(me.full_name(), "alice");
    }

    #[test]
    fn test_unknown_account_is_unauthorized() {
        let (_dir, service) = service();
        assert!(matches!(
            service.context_for(Some("nobody")),
            Err(StorageError::Unauthorized(_))
        ));
        assert!(!service.context_for(None).unwrap().is_authenticated());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (_dir, service) = service();
        let account = service.register("bob@example.com").unwrap();
        let first = service.get_or_create_profile(&account.id).unwrap();
        let second = service.get_or_create_profile(&account.id).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_list_excludes_self() {
        let (_dir, service) = service();
        let a = service.register("a@example.com").unwrap();
        service.register("b@example.com").unwrap();
        let ctx = service.context_for(Some(&a.id)).unwrap();

        let listed = service.list_profiles(&ctx, Pagination::default()).unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].profile.email, "b@example.com");
        assert_eq!(listed.items[0].follow_status, None);
    }
}
