//! Error types for agora

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Shorthand for a single field validation failure
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::default();
        errors.add(field, message);
        StorageError::Validation(errors)
    }

    /// Errors worth retrying from a background task (busy database, exhausted pool)
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Pool(_) => true,
            // SQLite reports SQLITE_BUSY / "database is locked" as Unknown
            StorageError::Database(diesel::result::Error::DatabaseError(kind, _)) => {
                matches!(kind, diesel::result::DatabaseErrorKind::Unknown)
            }
            _ => false,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}

/// Field-level validation errors, rendered as `{"field": ["message", ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Turn accumulated errors into a result
    pub fn into_result(self) -> Result<(), StorageError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Validation(self))
        }
    }

    /// `Ok(f())` when empty, otherwise the errors themselves
    pub fn into_result_with<T>(self, f: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(f())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationErrors> for StorageError {
    fn from(errors: ValidationErrors) -> Self {
        StorageError::Validation(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, msgs.join("; ")))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_renders_field_map() {
        let err = StorageError::field("scheduled_at", "Must be in the future.");
        match err {
            StorageError::Validation(errors) => {
                assert!(errors.contains("scheduled_at"));
                let json = serde_json::to_value(&errors).unwrap();
                assert_eq!(json["scheduled_at"][0], "Must be in the future.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Pool("timed out".into()).is_transient());
        assert!(!StorageError::Database(diesel::result::Error::NotFound).is_transient());
        assert!(!StorageError::NotFound("post".into()).is_transient());
    }
}
