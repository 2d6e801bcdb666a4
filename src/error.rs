//! Error types for wayfarer
//!
//! Every fallible operation in the crate returns [`TripError`]. Callers that
//! need to decide on a response (the HTTP layer) look at [`TripError::kind`]
//! instead of the message text.

use std::fmt;

use thiserror::Error;

/// Structural classification of an error, independent of its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed token, payload or identifier
    BadInput,
    /// Unknown login or wrong password
    Unauthorized,
    /// Duplicate write (check-in, like, login)
    Conflict,
    /// Entity missing in storage
    NotFound,
    /// Storage or other unexpected failure
    Internal,
}

/// SQL operation that produced a database error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOp {
    Transaction,
    Commit,
    Exec,
    Query,
    Scan,
    Bind,
}

impl fmt::Display for DbOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbOp::Transaction => "transaction",
            DbOp::Commit => "commit",
            DbOp::Exec => "execution",
            DbOp::Query => "query",
            DbOp::Scan => "scan",
            DbOp::Bind => "bind",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TripError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("User {user_id} has already checked in at place {place_id}")]
    DuplicateCheckIn { user_id: i64, place_id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{op} error: {source}")]
    Database {
        op: DbOp,
        #[source]
        source: rusqlite::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TripError {
    /// Classify the error for response selection
    pub fn kind(&self) -> ErrorKind {
        match self {
            TripError::BadInput(_) => ErrorKind::BadInput,
            TripError::Unauthorized(_) => ErrorKind::Unauthorized,
            TripError::DuplicateCheckIn { .. } | TripError::Conflict(_) => ErrorKind::Conflict,
            TripError::NotFound(_) => ErrorKind::NotFound,
            TripError::Json(_) => ErrorKind::BadInput,
            TripError::Database { .. }
            | TripError::Io(_)
            | TripError::Config(_)
            | TripError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wrap a rusqlite error, tagging it with the operation that failed
    pub fn db(op: DbOp, source: rusqlite::Error) -> Self {
        TripError::Database { op, source }
    }
}

/// Map a rusqlite error for a lookup of `what`.
///
/// "No rows" becomes [`TripError::NotFound`], everything else is tagged with `op`.
pub fn lookup_err(op: DbOp, what: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> TripError {
    let what = what.into();
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => TripError::NotFound(what),
        other => TripError::db(op, other),
    }
}

/// True when the error is a UNIQUE / PRIMARY KEY constraint violation
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, TripError>;
