//! Liked places and routes

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{is_unique_violation, DbOp, TripError};

/// What kind of entity a like points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Place,
    Route,
}

impl LikeTarget {
    fn table(self) -> &'static str {
        match self {
            LikeTarget::Place => "favourite_places",
            LikeTarget::Route => "favourite_routes",
        }
    }

    fn column(self) -> &'static str {
        match self {
            LikeTarget::Place => "place_id",
            LikeTarget::Route => "route_id",
        }
    }
}

/// A like with the time it was given
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Like {
    pub entity_id: i64,
    pub liked_at: DateTime<Utc>,
}

/// Everything a user has liked
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikedByUser {
    pub places: Vec<Like>,
    pub routes: Vec<Like>,
}

impl LikedByUser {
    pub fn place_ids(&self) -> Vec<i64> {
        self.places.iter().map(|l| l.entity_id).collect()
    }

    pub fn route_ids(&self) -> Vec<i64> {
        self.routes.iter().map(|l| l.entity_id).collect()
    }
}

/// Like a place or route; Conflict when already liked
pub fn like(
    conn: &Connection,
    target: LikeTarget,
    user_id: i64,
    entity_id: i64,
    at: DateTime<Utc>,
) -> Result<(), TripError> {
    let sql = format!(
        "INSERT INTO {} (user_id, {}, liked_at) VALUES (?, ?, ?)",
        target.table(),
        target.column()
    );
    conn.execute(&sql, params![user_id, entity_id, at])
        .map_err(|e| {
            if is_unique_violation(&e) {
                TripError::Conflict(format!("user {} already likes {} {}", user_id, target.column(), entity_id))
            } else {
                TripError::db(DbOp::Exec, e)
            }
        })?;
    Ok(())
}

/// Remove a like; NotFound when there was none
pub fn unlike(conn: &Connection, target: LikeTarget, user_id: i64, entity_id: i64) -> Result<(), TripError> {
    let sql = format!(
        "DELETE FROM {} WHERE user_id = ? AND {} = ?",
        target.table(),
        target.column()
    );
    let removed = conn
        .execute(&sql, params![user_id, entity_id])
        .map_err(|e| TripError::db(DbOp::Exec, e))?;

    if removed == 0 {
        return Err(TripError::NotFound(format!(
            "like of {} {} by user {}",
            target.column(),
            entity_id,
            user_id
        )));
    }
    Ok(())
}

fn get_likes(conn: &Connection, target: LikeTarget, user_id: i64) -> Result<Vec<Like>, TripError> {
    let sql = format!(
        "SELECT {}, liked_at FROM {} WHERE user_id = ? ORDER BY liked_at, {}",
        target.column(),
        target.table(),
        target.column()
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| TripError::db(DbOp::Query, e))?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(Like {
                entity_id: row.get(0)?,
                liked_at: row.get(1)?,
            })
        })
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut likes = Vec::new();
    for row in rows {
        likes.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(likes)
}

/// Liked places and routes of a user, each with its timestamp
pub fn liked_by_user(conn: &Connection, user_id: i64) -> Result<LikedByUser, TripError> {
    Ok(LikedByUser {
        places: get_likes(conn, LikeTarget::Place, user_id)?,
        routes: get_likes(conn, LikeTarget::Route, user_id)?,
    })
}

/// When the user liked an entity, if they did
pub fn like_timestamp(
    conn: &Connection,
    target: LikeTarget,
    user_id: i64,
    entity_id: i64,
) -> Result<Option<DateTime<Utc>>, TripError> {
    let sql = format!(
        "SELECT liked_at FROM {} WHERE user_id = ? AND {} = ?",
        target.table(),
        target.column()
    );
    conn.query_row(&sql, params![user_id, entity_id], |row| row.get(0))
        .optional()
        .map_err(|e| TripError::db(DbOp::Scan, e))
}
