//! Account operations
//!
//! Accounts are the identity store; every profile hangs off one.

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::accounts;
use super::models::{current_timestamp, Account, NewAccount};
use crate::error::StorageError;

/// Create an account; a duplicate email is a field error
pub fn create_account(conn: &mut SqliteConnection, email: &str) -> Result<Account, StorageError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(StorageError::field("email", "Enter a valid email address."));
    }

    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    let inserted = diesel::insert_into(accounts::table)
        .values(&NewAccount {
            id: &id,
            email: &email,
            created_at: &now,
        })
        .execute(conn)
        .map_err(StorageError::from);

    match inserted {
        Ok(_) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(StorageError::field("email", "An account with this email already exists."));
        }
        Err(e) => return Err(e),
    }

    Ok(Account {
        id,
        email,
        created_at: now,
    })
}

pub fn get_account(conn: &mut SqliteConnection, id: &str) -> Result<Option<Account>, StorageError> {
    accounts::table
        .filter(accounts::id.eq(id))
        .select(Account::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}

pub fn get_account_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<Account>, StorageError> {
    accounts::table
        .filter(accounts::email.eq(email.trim().to_lowercase()))
        .select(Account::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)
}
