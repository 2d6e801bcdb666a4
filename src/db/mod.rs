//! SQLite database module for trip planning data
//!
//! Repository functions take a `&Connection` (or `&mut Connection` when they
//! open their own transaction), so services can compose several of them
//! inside one transaction.
//!
//! ## Tables
//!
//! - `places`, `routes`, `route_places` - catalogue
//! - `trips`, `trip_places`, `trip_routes` - user itineraries
//! - `users`, `place_check_ins`, `route_logs` - accounts and progress
//! - `favourite_places`, `favourite_routes` - likes
//! - `place_reviews`, `route_reviews` - reviews

pub mod schema;
pub mod places;
pub mod routes;
pub mod trips;
pub mod users;
pub mod check_ins;
pub mod route_logs;
pub mod favourites;
pub mod reviews;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{DbOp, TripError};

/// SQLite database for the whole service
pub struct TripDb {
    conn: Mutex<Connection>,
}

impl TripDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, TripError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path).map_err(|e| TripError::db(DbOp::Exec, e))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TripError::db(DbOp::Exec, e))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, TripError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| TripError::db(DbOp::Exec, e))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, TripError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| TripError::db(DbOp::Exec, e))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.with_conn(|conn| schema::init_schema(conn))?;

        Ok(db)
    }

    /// Run a read operation
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TripError>
    where
        F: FnOnce(&Connection) -> Result<T, TripError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| TripError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, TripError>
    where
        F: FnOnce(&mut Connection) -> Result<T, TripError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| TripError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Run `f` inside one transaction, committing only if it succeeds
    pub fn in_transaction<F, T>(&self, f: F) -> Result<T, TripError>
    where
        F: FnOnce(&Connection) -> Result<T, TripError>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| TripError::db(DbOp::Transaction, e))?;
            let value = f(&tx)?;
            tx.commit().map_err(|e| TripError::db(DbOp::Commit, e))?;
            Ok(value)
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, TripError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, TripError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .map_err(|e| TripError::db(DbOp::Query, e))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                users: count("users")?,
                places: count("places")?,
                routes: count("routes")?,
                trips: count("trips")?,
                check_ins: count("place_check_ins")?,
                open_route_logs: conn
                    .query_row(
                        "SELECT COUNT(*) FROM route_logs WHERE end_time IS NULL",
                        [],
                        |row| row.get::<_, i64>(0),
                    )
                    .map_err(|e| TripError::db(DbOp::Query, e))? as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub users: u64,
    pub places: u64,
    pub routes: u64,
    pub trips: u64,
    pub check_ins: u64,
    pub open_route_logs: u64,
}

/// Offset for a 1-based page number
pub(crate) fn page_offset(page: u32, per_page: u32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(per_page)
}
