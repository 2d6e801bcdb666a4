//! Place CRUD operations

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{lookup_err, DbOp, TripError};

/// Place row from database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceRow {
    pub id: i64,
    pub name: String,
    /// Category tag, decides checkpoint vs. decorative waypoint
    pub variety: String,
    pub city_id: i64,
    pub district_id: i64,
    pub properties: serde_json::Value,
}

/// Input for creating a place
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlaceInput {
    pub name: String,
    pub variety: String,
    #[serde(default)]
    pub city_id: i64,
    #[serde(default)]
    pub district_id: i64,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Filters for listing places
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceFilter {
    pub variety: Option<String>,
    /// Substring match on the name
    pub name: Option<String>,
}

const PLACE_COLUMNS: &str = "id, name, variety, city_id, district_id, properties";

pub(crate) fn place_from_row(row: &Row<'_>) -> rusqlite::Result<PlaceRow> {
    let properties: String = row.get(5)?;
    Ok(PlaceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        variety: row.get(2)?,
        city_id: row.get(3)?,
        district_id: row.get(4)?,
        properties: serde_json::from_str(&properties).unwrap_or(serde_json::Value::Null),
    })
}

/// Create a place, returning its id
pub fn create_place(conn: &Connection, input: &CreatePlaceInput) -> Result<i64, TripError> {
    let properties = serde_json::to_string(&input.properties)
        .map_err(|_| TripError::BadInput("place properties are not serializable".into()))?;

    conn.execute(
        "INSERT INTO places (name, variety, city_id, district_id, properties) VALUES (?, ?, ?, ?, ?)",
        params![input.name, input.variety, input.city_id, input.district_id, properties],
    )
    .map_err(|e| TripError::db(DbOp::Exec, e))?;

    Ok(conn.last_insert_rowid())
}

/// Get a place by ID
pub fn get_place(conn: &Connection, id: i64) -> Result<PlaceRow, TripError> {
    let sql = format!("SELECT {} FROM places WHERE id = ?", PLACE_COLUMNS);
    conn.query_row(&sql, params![id], place_from_row)
        .map_err(lookup_err(DbOp::Scan, format!("place {}", id)))
}

/// Get several places, silently skipping unknown ids, in id order
pub fn get_places(conn: &Connection, ids: &[i64]) -> Result<Vec<PlaceRow>, TripError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT {} FROM places WHERE id IN ({}) ORDER BY id",
        PLACE_COLUMNS,
        placeholders.join(",")
    );

    let mut stmt = conn.prepare(&sql).map_err(|e| TripError::db(DbOp::Query, e))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), place_from_row)
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(results)
}

/// List places with optional filters, one page at a time
pub fn list_places(
    conn: &Connection,
    filter: &PlaceFilter,
    limit: u32,
    offset: i64,
) -> Result<Vec<PlaceRow>, TripError> {
    let mut sql = format!("SELECT {} FROM places WHERE 1=1", PLACE_COLUMNS);
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(variety) = &filter.variety {
        sql.push_str(" AND variety = ?");
        params_vec.push(Box::new(variety.clone()));
    }

    if let Some(name) = &filter.name {
        sql.push_str(" AND name LIKE ?");
        params_vec.push(Box::new(format!("%{}%", name)));
    }

    sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");
    params_vec.push(Box::new(i64::from(limit)));
    params_vec.push(Box::new(offset));

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql).map_err(|e| TripError::db(DbOp::Query, e))?;
    let rows = stmt
        .query_map(params_refs.as_slice(), place_from_row)
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(results)
}
