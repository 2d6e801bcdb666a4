//! Route traversal logs
//!
//! One row per (user, route). A NULL `end_time` means the traversal is open.
//! Rows are never deleted or reopened, so the derived [`RouteProgress`] only
//! moves forward: NotStarted -> InProgress -> Completed.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{DbOp, TripError};

/// Route log row from database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteLogRow {
    pub user_id: i64,
    pub route_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RouteLogRow {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn progress(&self) -> RouteProgress {
        match self.end_time {
            None => RouteProgress::InProgress {
                started_at: self.start_time,
            },
            Some(finished_at) => RouteProgress::Completed {
                started_at: self.start_time,
                finished_at,
            },
        }
    }
}

/// Traversal state of a route for one user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouteProgress {
    NotStarted,
    InProgress {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
}

const LOG_COLUMNS: &str = "user_id, route_id, start_time, end_time";

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<RouteLogRow> {
    Ok(RouteLogRow {
        user_id: row.get(0)?,
        route_id: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
    })
}

fn query_logs(conn: &Connection, sql: &str, user_id: i64) -> Result<Vec<RouteLogRow>, TripError> {
    let mut stmt = conn.prepare(sql).map_err(|e| TripError::db(DbOp::Query, e))?;
    let rows = stmt
        .query_map(params![user_id], log_from_row)
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut logs = Vec::new();
    for row in rows {
        logs.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(logs)
}

/// Open a traversal. Returns false, leaving the row untouched, when the user
/// already has a log for this route.
pub fn start_route(
    conn: &Connection,
    user_id: i64,
    route_id: i64,
    at: DateTime<Utc>,
) -> Result<bool, TripError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO route_logs (user_id, route_id, start_time, end_time) VALUES (?, ?, ?, NULL)",
            params![user_id, route_id, at],
        )
        .map_err(|e| TripError::db(DbOp::Exec, e))?;
    Ok(inserted == 1)
}

/// Close an open traversal. Returns false when there is no open log.
pub fn end_route(
    conn: &Connection,
    user_id: i64,
    route_id: i64,
    at: DateTime<Utc>,
) -> Result<bool, TripError> {
    let updated = conn
        .execute(
            "UPDATE route_logs SET end_time = ? WHERE user_id = ? AND route_id = ? AND end_time IS NULL",
            params![at, user_id, route_id],
        )
        .map_err(|e| TripError::db(DbOp::Exec, e))?;
    Ok(updated == 1)
}

pub fn get_route_log(
    conn: &Connection,
    user_id: i64,
    route_id: i64,
) -> Result<Option<RouteLogRow>, TripError> {
    let sql = format!(
        "SELECT {} FROM route_logs WHERE user_id = ? AND route_id = ?",
        LOG_COLUMNS
    );
    conn.query_row(&sql, params![user_id, route_id], log_from_row)
        .optional()
        .map_err(|e| TripError::db(DbOp::Scan, e))
}

/// Progress of one route for one user
pub fn get_progress(conn: &Connection, user_id: i64, route_id: i64) -> Result<RouteProgress, TripError> {
    Ok(get_route_log(conn, user_id, route_id)?
        .map(|log| log.progress())
        .unwrap_or(RouteProgress::NotStarted))
}

/// All logs of a user, oldest start first
pub fn get_route_logs(conn: &Connection, user_id: i64) -> Result<Vec<RouteLogRow>, TripError> {
    let sql = format!(
        "SELECT {} FROM route_logs WHERE user_id = ? ORDER BY start_time, route_id",
        LOG_COLUMNS
    );
    query_logs(conn, &sql, user_id)
}

/// Open logs of a user, oldest start first
pub fn get_open_route_logs(conn: &Connection, user_id: i64) -> Result<Vec<RouteLogRow>, TripError> {
    let sql = format!(
        "SELECT {} FROM route_logs WHERE user_id = ? AND end_time IS NULL ORDER BY start_time, route_id",
        LOG_COLUMNS
    );
    query_logs(conn, &sql, user_id)
}

/// Most recently finished log of a user
pub fn get_last_finished(conn: &Connection, user_id: i64) -> Result<Option<RouteLogRow>, TripError> {
    let sql = format!(
        "SELECT {} FROM route_logs WHERE user_id = ? AND end_time IS NOT NULL
         ORDER BY end_time DESC, route_id DESC LIMIT 1",
        LOG_COLUMNS
    );
    conn.query_row(&sql, params![user_id], log_from_row)
        .optional()
        .map_err(|e| TripError::db(DbOp::Scan, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::routes::{create_route, CreateRouteInput};
    use crate::db::users::{create_user, CreateUserInput};
    use crate::db::TripDb;
    use chrono::Duration;

    fn seed(db: &TripDb) -> (i64, i64) {
        db.with_conn_mut(|conn| {
            let user = create_user(
                conn,
                &CreateUserInput {
                    login: "walker".into(),
                    password: "p".into(),
                    properties: serde_json::Value::Null,
                },
            )?;
            let route = create_route(
                conn,
                &CreateRouteInput {
                    name: "loop".into(),
                    city_id: 0,
                    price: 0,
                    properties: serde_json::Value::Null,
                    places: vec![],
                },
            )?;
            Ok((user, route))
        })
        .unwrap()
    }

    #[test]
    fn test_lifecycle_moves_forward_only() {
        let db = TripDb::open_in_memory().unwrap();
        let (user, route) = seed(&db);
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(30);

        db.with_conn(|conn| {
            assert_eq!(get_progress(conn, user, route)?, RouteProgress::NotStarted);
            assert!(!end_route(conn, user, route, t0)?);

            assert!(start_route(conn, user, route, t0)?);
            assert!(!start_route(conn, user, route, t1)?);
            assert_eq!(
                get_progress(conn, user, route)?,
                RouteProgress::InProgress { started_at: t0 }
            );
            assert_eq!(get_open_route_logs(conn, user)?.len(), 1);

            assert!(get_route_log(conn, user, route)?.is_some_and(|l| l.is_open()));
            assert!(end_route(conn, user, route, t1)?);
            assert!(!end_route(conn, user, route, t1)?);
            assert!(get_route_log(conn, user, route)?.is_some_and(|l| !l.is_open()));
            assert_eq!(
                get_progress(conn, user, route)?,
                RouteProgress::Completed { started_at: t0, finished_at: t1 }
            );

            // a completed traversal is not restarted
            assert!(!start_route(conn, user, route, t1)?);
            assert!(get_open_route_logs(conn, user)?.is_empty());
            assert_eq!(get_last_finished(conn, user)?.map(|l| l.route_id), Some(route));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_progress_serializes_with_status_tag() {
        let json = serde_json::to_value(RouteProgress::NotStarted).unwrap();
        assert_eq!(json, serde_json::json!({"status": "not_started"}));
    }
}
