use thiserror::Error;

/// Failures reported by a [`TodoStore`](crate::store::TodoStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live row with this id.
    #[error("todo {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Backend(#[from] rusqlite::Error),
}

/// Errors surfaced by the operations in [`ops`](crate::ops).
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-fixable: malformed id or an update with nothing to change.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("todo '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
