//! Database error types.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("word not found: {0}")]
    WordNotFound(Uuid),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
