//! Place check-in operations
//!
//! A user checks in at a place at most once. Manual check-ins reject
//! duplicates; auto check-ins produced by skip-ahead silently skip places the
//! user already has.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{is_unique_violation, DbOp, TripError};

/// Check-in row from database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckInRow {
    pub user_id: i64,
    pub place_id: i64,
    pub checked_in_at: DateTime<Utc>,
    /// Recorded by skip-ahead rather than by the user
    pub auto: bool,
}

/// Record a manual check-in.
///
/// Fails with [`TripError::DuplicateCheckIn`] when the pair already exists.
pub fn insert_check_in(
    conn: &Connection,
    user_id: i64,
    place_id: i64,
    at: DateTime<Utc>,
) -> Result<(), TripError> {
    conn.execute(
        "INSERT INTO place_check_ins (user_id, place_id, checked_in_at, auto) VALUES (?, ?, ?, 0)",
        params![user_id, place_id, at],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            TripError::DuplicateCheckIn { user_id, place_id }
        } else {
            TripError::db(DbOp::Exec, e)
        }
    })?;
    Ok(())
}

/// Record an automatic check-in, returning false if the user already had one
pub fn insert_auto_check_in(
    conn: &Connection,
    user_id: i64,
    place_id: i64,
    at: DateTime<Utc>,
) -> Result<bool, TripError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO place_check_ins (user_id, place_id, checked_in_at, auto) VALUES (?, ?, ?, 1)",
            params![user_id, place_id, at],
        )
        .map_err(|e| TripError::db(DbOp::Exec, e))?;
    Ok(inserted == 1)
}

/// Every place the user has ever checked in at
pub fn get_checked_in_place_ids(conn: &Connection, user_id: i64) -> Result<HashSet<i64>, TripError> {
    let mut stmt = conn
        .prepare("SELECT place_id FROM place_check_ins WHERE user_id = ?")
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let rows = stmt
        .query_map(params![user_id], |row| row.get::<_, i64>(0))
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut ids = HashSet::new();
    for row in rows {
        ids.insert(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(ids)
}

/// All check-ins of a user in time order
pub fn get_check_ins(conn: &Connection, user_id: i64) -> Result<Vec<CheckInRow>, TripError> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, place_id, checked_in_at, auto FROM place_check_ins
             WHERE user_id = ? ORDER BY checked_in_at, place_id",
        )
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(CheckInRow {
                user_id: row.get(0)?,
                place_id: row.get(1)?,
                checked_in_at: row.get(2)?,
                auto: row.get(3)?,
            })
        })
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(results)
}

/// When the user checked in at a place, if ever
pub fn get_check_in_timestamp(
    conn: &Connection,
    user_id: i64,
    place_id: i64,
) -> Result<Option<DateTime<Utc>>, TripError> {
    conn.query_row(
        "SELECT checked_in_at FROM place_check_ins WHERE user_id = ? AND place_id = ?",
        params![user_id, place_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| TripError::db(DbOp::Scan, e))
}

pub fn has_checked_in(conn: &Connection, user_id: i64, place_id: i64) -> Result<bool, TripError> {
    Ok(get_check_in_timestamp(conn, user_id, place_id)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::places::{create_place, CreatePlaceInput};
    use crate::db::users::{create_user, CreateUserInput};
    use crate::db::TripDb;

    fn seed(conn: &Connection) -> (i64, i64, i64) {
        let user = create_user(
            conn,
            &CreateUserInput {
                login: "u".into(),
                password: "p".into(),
                properties: serde_json::Value::Null,
            },
        )
        .unwrap();
        let place = || {
            create_place(
                conn,
                &CreatePlaceInput {
                    name: "p".into(),
                    variety: "museum".into(),
                    city_id: 0,
                    district_id: 0,
                    properties: serde_json::Value::Null,
                },
            )
            .unwrap()
        };
        let a = place();
        let b = place();
        (user, a, b)
    }

    #[test]
    fn test_duplicate_manual_check_in() {
        let db = TripDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let (user, place, _) = seed(conn);
            insert_check_in(conn, user, place, Utc::now())?;
            let err = insert_check_in(conn, user, place, Utc::now()).unwrap_err();
            assert!(matches!(
                err,
                TripError::DuplicateCheckIn { user_id, place_id } if user_id == user && place_id == place
            ));
            assert_eq!(get_check_ins(conn, user)?.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_auto_check_in_skips_existing() {
        let db = TripDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let (user, a, b) = seed(conn);
            insert_check_in(conn, user, a, Utc::now())?;
            assert!(!insert_auto_check_in(conn, user, a, Utc::now())?);
            assert!(insert_auto_check_in(conn, user, b, Utc::now())?);

            let rows = get_check_ins(conn, user)?;
            let auto_b = rows.iter().find(|r| r.place_id == b).unwrap();
            assert!(auto_b.auto);

            let ids = get_checked_in_place_ids(conn, user)?;
            assert_eq!(ids, HashSet::from([a, b]));
            assert!(has_checked_in(conn, user, b)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_missing_timestamp_is_none() {
        let db = TripDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert_eq!(get_check_in_timestamp(conn, 1, 1)?, None);
            Ok(())
        })
        .unwrap();
    }
}
