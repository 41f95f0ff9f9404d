use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        table: Option<String>,
        /// The column (or comma-separated columns) the constraint covers, if extractable
        column: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation { message: String },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let (table, column) = match extract_unique_target(db_err.message()) {
                        Some((table, column)) => (Some(table), Some(column)),
                        None => (db_err.table().map(|s| s.to_string()), None),
                    };
                    DbError::UniqueViolation {
                        table,
                        column,
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract the table and column(s) from a SQLite unique violation message.
///
/// SQLite reports these as `UNIQUE constraint failed: users.email` or, for composite keys,
/// `UNIQUE constraint failed: group_members.group_id, group_members.user_id`.
fn extract_unique_target(message: &str) -> Option<(String, String)> {
    let targets = message.split_once("constraint failed:")?.1;
    let mut table = None;
    let mut columns = Vec::new();
    for target in targets.split(',') {
        let (t, c) = target.trim().split_once('.')?;
        table.get_or_insert_with(|| t.to_string());
        columns.push(c.to_string());
    }
    Some((table?, columns.join(",")))
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
