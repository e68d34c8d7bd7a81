use frameql_error::DbError;

pub type Result<T, E = SqliteError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),

    #[error("Failed to create temporary database file: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("Table '{0}' is already registered")]
    DuplicateTable(String),

    #[error("Table '{0}' is not registered")]
    MissingTable(String),

    #[error("Invalid index plan '{plan}': {reason}")]
    InvalidPlan { plan: String, reason: String },

    #[error("Engine is closed")]
    Closed,
}

impl From<SqliteError> for DbError {
    fn from(e: SqliteError) -> Self {
        DbError::with_source("SQLite error", Box::new(e))
    }
}

impl From<SqliteError> for rusqlite::Error {
    fn from(e: SqliteError) -> Self {
        match e {
            SqliteError::Rusqlite(e) => e,
            other => rusqlite::Error::ModuleError(other.to_string()),
        }
    }
}
