use thiserror::Error;

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another subsweep process has locked the state database
    #[error("Another instance of subsweep appears to be running. Please close it and try again.")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, mapping SQLite lock conditions to `InstanceLocked`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if Self::is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }

    // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
    pub(crate) fn is_lock_message(message: &str) -> bool {
        let message = message.to_lowercase();
        message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("sqlite_busy")
            || message.contains("sqlite_locked")
            || message.contains("unable to open database file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages_detected() {
        assert!(DatabaseError::is_lock_message("error: database is locked"));
        assert!(DatabaseError::is_lock_message("SQLITE_BUSY"));
        assert!(!DatabaseError::is_lock_message("no such table: kv_store"));
    }
}
