//! Trip CRUD operations
//!
//! A trip owns a date window `[date_start, date_end)` and a schedule of
//! places and routes, each placed on a day at a position.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{lookup_err, DbOp, TripError};

/// Place or route scheduled on a trip day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledEntity {
    #[serde(rename = "id")]
    pub entity_id: i64,
    pub day: i64,
    pub position: i64,
}

/// Which schedule table an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripEntry {
    Place,
    Route,
}

impl TripEntry {
    fn table(self) -> &'static str {
        match self {
            TripEntry::Place => "trip_places",
            TripEntry::Route => "trip_routes",
        }
    }

    fn column(self) -> &'static str {
        match self {
            TripEntry::Place => "place_id",
            TripEntry::Route => "route_id",
        }
    }

    fn label(self) -> &'static str {
        match self {
            TripEntry::Place => "place",
            TripEntry::Route => "route",
        }
    }
}

/// Trip row with its schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripRow {
    pub id: i64,
    pub user_id: i64,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub properties: serde_json::Value,
    pub places: Vec<ScheduledEntity>,
    pub routes: Vec<ScheduledEntity>,
}

impl TripRow {
    /// True when `ts` falls in `[date_start, date_end)`
    pub fn covers(&self, ts: DateTime<Utc>) -> bool {
        self.date_start <= ts && ts < self.date_end
    }

    pub fn schedules_place(&self, place_id: i64) -> bool {
        self.places.iter().any(|p| p.entity_id == place_id)
    }

    pub fn schedules_route(&self, route_id: i64) -> bool {
        self.routes.iter().any(|r| r.entity_id == route_id)
    }
}

/// Input for creating a trip
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTripInput {
    pub user_id: i64,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub places: Vec<ScheduledEntity>,
    #[serde(default)]
    pub routes: Vec<ScheduledEntity>,
}

/// Create a trip with its schedule in one transaction
pub fn create_trip(conn: &mut Connection, input: &CreateTripInput) -> Result<i64, TripError> {
    let properties = serde_json::to_string(&input.properties)
        .map_err(|_| TripError::BadInput("trip properties are not serializable".into()))?;

    let tx = conn.transaction().map_err(|e| TripError::db(DbOp::Transaction, e))?;

    tx.execute(
        "INSERT INTO trips (user_id, date_start, date_end, properties) VALUES (?, ?, ?, ?)",
        params![input.user_id, input.date_start, input.date_end, properties],
    )
    .map_err(|e| TripError::db(DbOp::Exec, e))?;
    let trip_id = tx.last_insert_rowid();

    for place in &input.places {
        add_entry(&tx, TripEntry::Place, trip_id, place)?;
    }
    for route in &input.routes {
        add_entry(&tx, TripEntry::Route, trip_id, route)?;
    }

    tx.commit().map_err(|e| TripError::db(DbOp::Commit, e))?;

    Ok(trip_id)
}

fn get_entries(conn: &Connection, kind: TripEntry, trip_id: i64) -> Result<Vec<ScheduledEntity>, TripError> {
    let sql = format!(
        "SELECT {}, day, position FROM {} WHERE trip_id = ? ORDER BY day, position",
        kind.column(),
        kind.table()
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| TripError::db(DbOp::Query, e))?;

    let rows = stmt
        .query_map(params![trip_id], |row| {
            Ok(ScheduledEntity {
                entity_id: row.get(0)?,
                day: row.get(1)?,
                position: row.get(2)?,
            })
        })
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(entries)
}

/// Get a trip with its schedule
pub fn get_trip(conn: &Connection, id: i64) -> Result<TripRow, TripError> {
    let (user_id, date_start, date_end, properties): (i64, DateTime<Utc>, DateTime<Utc>, String) = conn
        .query_row(
            "SELECT user_id, date_start, date_end, properties FROM trips WHERE id = ?",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(lookup_err(DbOp::Scan, format!("trip {}", id)))?;

    Ok(TripRow {
        id,
        user_id,
        date_start,
        date_end,
        properties: serde_json::from_str(&properties).unwrap_or(serde_json::Value::Null),
        places: get_entries(conn, TripEntry::Place, id)?,
        routes: get_entries(conn, TripEntry::Route, id)?,
    })
}

/// All trips of a user, oldest first
pub fn get_trips_by_user(conn: &Connection, user_id: i64) -> Result<Vec<TripRow>, TripError> {
    let mut stmt = conn
        .prepare("SELECT id FROM trips WHERE user_id = ? ORDER BY id")
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let ids = stmt
        .query_map(params![user_id], |row| row.get::<_, i64>(0))
        .map_err(|e| TripError::db(DbOp::Query, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TripError::db(DbOp::Scan, e))?;

    ids.into_iter().map(|id| get_trip(conn, id)).collect()
}

/// Schedule a place or route on a trip
pub fn add_entry(
    conn: &Connection,
    kind: TripEntry,
    trip_id: i64,
    entry: &ScheduledEntity,
) -> Result<(), TripError> {
    let sql = format!(
        "INSERT INTO {} (trip_id, {}, day, position) VALUES (?, ?, ?, ?)",
        kind.table(),
        kind.column()
    );
    conn.execute(&sql, params![trip_id, entry.entity_id, entry.day, entry.position])
        .map_err(|e| {
            if crate::error::is_unique_violation(&e) {
                TripError::Conflict(format!(
                    "{} {} is already on trip {}",
                    kind.label(),
                    entry.entity_id,
                    trip_id
                ))
            } else {
                TripError::db(DbOp::Exec, e)
            }
        })?;
    Ok(())
}

fn update_entry(
    conn: &Connection,
    kind: TripEntry,
    column: &str,
    trip_id: i64,
    entity_id: i64,
    value: i64,
) -> Result<(), TripError> {
    let sql = format!(
        "UPDATE {} SET {} = ? WHERE trip_id = ? AND {} = ?",
        kind.table(),
        column,
        kind.column()
    );
    let changed = conn
        .execute(&sql, params![value, trip_id, entity_id])
        .map_err(|e| TripError::db(DbOp::Exec, e))?;

    if changed != 1 {
        return Err(TripError::NotFound(format!(
            "{} {} on trip {}",
            kind.label(),
            entity_id,
            trip_id
        )));
    }
    Ok(())
}

/// Move a scheduled entity to another day
pub fn change_day(conn: &Connection, kind: TripEntry, trip_id: i64, entity_id: i64, day: i64) -> Result<(), TripError> {
    update_entry(conn, kind, "day", trip_id, entity_id, day)
}

/// Move a scheduled entity within its day
pub fn change_position(
    conn: &Connection,
    kind: TripEntry,
    trip_id: i64,
    entity_id: i64,
    position: i64,
) -> Result<(), TripError> {
    update_entry(conn, kind, "position", trip_id, entity_id, position)
}

/// Remove a scheduled entity from a trip
pub fn remove_entry(conn: &Connection, kind: TripEntry, trip_id: i64, entity_id: i64) -> Result<(), TripError> {
    let sql = format!("DELETE FROM {} WHERE trip_id = ? AND {} = ?", kind.table(), kind.column());
    let removed = conn
        .execute(&sql, params![trip_id, entity_id])
        .map_err(|e| TripError::db(DbOp::Exec, e))?;

    if removed != 1 {
        return Err(TripError::NotFound(format!(
            "{} {} on trip {}",
            kind.label(),
            entity_id,
            trip_id
        )));
    }
    Ok(())
}
