//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{DbOp, TripError};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), TripError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, TripError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| TripError::db(DbOp::Exec, e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|e| TripError::db(DbOp::Scan, e))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), TripError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| TripError::db(DbOp::Exec, e))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| TripError::db(DbOp::Exec, e))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), TripError> {
    for batch in [CATALOGUE_SCHEMA, TRIPS_SCHEMA, USERS_SCHEMA, ACTIVITY_SCHEMA, INDEXES_SCHEMA] {
        conn.execute_batch(batch)
            .map_err(|e| TripError::db(DbOp::Exec, e))?;
    }
    Ok(())
}

/// Places and routes
const CATALOGUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS places (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    variety TEXT NOT NULL,
    city_id INTEGER NOT NULL DEFAULT 0,
    district_id INTEGER NOT NULL DEFAULT 0,
    properties TEXT NOT NULL DEFAULT 'null'
);

CREATE TABLE IF NOT EXISTS routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    city_id INTEGER NOT NULL DEFAULT 0,
    price INTEGER NOT NULL DEFAULT 0,
    properties TEXT NOT NULL DEFAULT 'null'
);

-- Ordered places of a route; position is 1-based but not guaranteed contiguous
CREATE TABLE IF NOT EXISTS route_places (
    route_id INTEGER NOT NULL,
    place_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (route_id, position),
    FOREIGN KEY (route_id) REFERENCES routes(id) ON DELETE CASCADE,
    FOREIGN KEY (place_id) REFERENCES places(id)
);
"#;

/// Trips and their scheduled entities
const TRIPS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS trips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    date_start TEXT NOT NULL,
    date_end TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT 'null',
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS trip_places (
    trip_id INTEGER NOT NULL,
    place_id INTEGER NOT NULL,
    day INTEGER NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (trip_id, place_id),
    FOREIGN KEY (trip_id) REFERENCES trips(id) ON DELETE CASCADE,
    FOREIGN KEY (place_id) REFERENCES places(id)
);

CREATE TABLE IF NOT EXISTS trip_routes (
    trip_id INTEGER NOT NULL,
    route_id INTEGER NOT NULL,
    day INTEGER NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (trip_id, route_id),
    FOREIGN KEY (trip_id) REFERENCES trips(id) ON DELETE CASCADE,
    FOREIGN KEY (route_id) REFERENCES routes(id)
);
"#;

/// User accounts
const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
"#;

/// Timestamped user activity
const ACTIVITY_SCHEMA: &str = r#"
-- A user checks in at a place at most once
CREATE TABLE IF NOT EXISTS place_check_ins (
    user_id INTEGER NOT NULL,
    place_id INTEGER NOT NULL,
    checked_in_at TEXT NOT NULL,
    auto INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, place_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (place_id) REFERENCES places(id)
);

-- end_time NULL means the traversal is still open
CREATE TABLE IF NOT EXISTS route_logs (
    user_id INTEGER NOT NULL,
    route_id INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    PRIMARY KEY (user_id, route_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (route_id) REFERENCES routes(id)
);

CREATE TABLE IF NOT EXISTS favourite_places (
    user_id INTEGER NOT NULL,
    place_id INTEGER NOT NULL,
    liked_at TEXT NOT NULL,
    PRIMARY KEY (user_id, place_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (place_id) REFERENCES places(id)
);

CREATE TABLE IF NOT EXISTS favourite_routes (
    user_id INTEGER NOT NULL,
    route_id INTEGER NOT NULL,
    liked_at TEXT NOT NULL,
    PRIMARY KEY (user_id, route_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (route_id) REFERENCES routes(id)
);

CREATE TABLE IF NOT EXISTS place_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id INTEGER NOT NULL,
    place_id INTEGER NOT NULL,
    mark REAL NOT NULL,
    properties TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL,
    FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (place_id) REFERENCES places(id)
);

CREATE TABLE IF NOT EXISTS route_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id INTEGER NOT NULL,
    route_id INTEGER NOT NULL,
    mark REAL NOT NULL,
    properties TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL,
    FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (route_id) REFERENCES routes(id)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_places_variety ON places(variety);
CREATE INDEX IF NOT EXISTS idx_route_places_place ON route_places(place_id);
CREATE INDEX IF NOT EXISTS idx_trips_user ON trips(user_id);
CREATE INDEX IF NOT EXISTS idx_trip_routes_route ON trip_routes(route_id);
CREATE INDEX IF NOT EXISTS idx_place_reviews_author ON place_reviews(author_id);
CREATE INDEX IF NOT EXISTS idx_route_reviews_author ON route_reviews(author_id);
"#;
