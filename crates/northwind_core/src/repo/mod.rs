//! Repository layer: query descriptors, row mapping and the session-scoped
//! unit of work.
//!
//! # Responsibility
//! - Build composable, lazily executed entity queries.
//! - Apply the session-ownership filter on every session-saveable read path.
//! - Wire the save guard into the context's save pipeline.
//!
//! # Invariants
//! - A session-scoped query returns only rows whose `user_session_id` is
//!   NULL or the caller's session id, including eagerly included rows.
//! - Repository read APIs return `Ok(None)` for absent rows, not errors.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod northwind_repo;
pub mod query;
mod rows;
pub mod save_guard;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for query, reset and metadata operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Persisted data cannot be mapped to its entity shape.
    InvalidData(String),
    /// The entity has no navigation matching the requested include.
    UnsupportedInclude {
        table: &'static str,
        include: query::Include,
    },
    Serialization(serde_json::Error),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UnsupportedInclude { table, include } => {
                write!(f, "include {include:?} is not supported for `{table}`")
            }
            Self::Serialization(err) => write!(f, "serialization failed: {err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::UnsupportedInclude { .. } => None,
            Self::Serialization(err) => Some(err),
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
