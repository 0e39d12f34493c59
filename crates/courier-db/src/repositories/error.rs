//! Error handling utilities for repositories

use courier_core::error::DomainError;
use courier_core::value_objects::SessionId;
use sqlx::Error as SqlxError;

/// Convert SQLx error to DomainError
pub fn map_db_error(e: SqlxError) -> DomainError {
    DomainError::DatabaseError(e.to_string())
}

/// Check for unique violation and return appropriate error or fallback
pub fn map_unique_violation<F>(e: SqlxError, on_unique: F) -> DomainError
where
    F: FnOnce() -> DomainError,
{
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return on_unique();
        }
    }
    map_db_error(e)
}

/// Create a "session not found" error
pub fn session_not_found(id: &SessionId) -> DomainError {
    DomainError::SessionNotFound(id.clone())
}

/// Treat an UPDATE/DELETE that touched no rows as a missing session
pub fn require_affected(rows: u64, id: &SessionId) -> Result<(), DomainError> {
    if rows == 0 {
        Err(session_not_found(id))
    } else {
        Ok(())
    }
}
