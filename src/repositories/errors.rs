use thiserror::Error;

/// Postgres SQLSTATE for unique_violation.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store cannot be reached or cannot be trusted; runs abort on this.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store is reachable but rejected one statement.
    #[error("store rejected statement: {0}")]
    Rejected(String),

    #[error("row not found")]
    NotFound,

    #[error("no free slug for '{0}'")]
    SlugExhausted(String),
}

impl StoreError {
    /// Errors that should fail a whole pipeline run rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) => Self::Rejected(db.to_string()),
            // Decode and column errors mean the schema and code disagree.
            other => Self::Unavailable(other.to_string()),
        }
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}
