//! Route CRUD operations
//!
//! A route is an ordered list of places. Positions are 1-based and expected,
//! but not guaranteed, to be contiguous.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{lookup_err, DbOp, TripError};

/// Place reference inside a route
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutePlace {
    pub place_id: i64,
    pub position: i64,
}

/// Route row with its ordered places
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRow {
    pub id: i64,
    pub name: String,
    pub city_id: i64,
    pub price: i64,
    pub properties: serde_json::Value,
    /// Sorted by ascending position
    pub places: Vec<RoutePlace>,
}

impl RouteRow {
    pub fn contains_place(&self, place_id: i64) -> bool {
        self.places.iter().any(|p| p.place_id == place_id)
    }

    /// Position of `place_id` in this route, if present
    pub fn position_of(&self, place_id: i64) -> Option<i64> {
        self.places
            .iter()
            .find(|p| p.place_id == place_id)
            .map(|p| p.position)
    }
}

/// Input for creating a route
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRouteInput {
    pub name: String,
    #[serde(default)]
    pub city_id: i64,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub properties: serde_json::Value,
    pub places: Vec<RoutePlace>,
}

fn route_header_from_row(row: &Row<'_>) -> rusqlite::Result<RouteRow> {
    let properties: String = row.get(4)?;
    Ok(RouteRow {
        id: row.get(0)?,
        name: row.get(1)?,
        city_id: row.get(2)?,
        price: row.get(3)?,
        properties: serde_json::from_str(&properties).unwrap_or(serde_json::Value::Null),
        places: Vec::new(),
    })
}

/// Create a route with its places in one transaction
pub fn create_route(conn: &mut Connection, input: &CreateRouteInput) -> Result<i64, TripError> {
    let properties = serde_json::to_string(&input.properties)
        .map_err(|_| TripError::BadInput("route properties are not serializable".into()))?;

    let tx = conn.transaction().map_err(|e| TripError::db(DbOp::Transaction, e))?;

    tx.execute(
        "INSERT INTO routes (name, city_id, price, properties) VALUES (?, ?, ?, ?)",
        params![input.name, input.city_id, input.price, properties],
    )
    .map_err(|e| TripError::db(DbOp::Exec, e))?;
    let route_id = tx.last_insert_rowid();

    for place in &input.places {
        tx.execute(
            "INSERT INTO route_places (route_id, place_id, position) VALUES (?, ?, ?)",
            params![route_id, place.place_id, place.position],
        )
        .map_err(|e| TripError::db(DbOp::Exec, e))?;
    }

    tx.commit().map_err(|e| TripError::db(DbOp::Commit, e))?;

    Ok(route_id)
}

/// Ordered places of a route
pub fn get_route_places(conn: &Connection, route_id: i64) -> Result<Vec<RoutePlace>, TripError> {
    let mut stmt = conn
        .prepare("SELECT place_id, position FROM route_places WHERE route_id = ? ORDER BY position")
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let rows = stmt
        .query_map(params![route_id], |row| {
            Ok(RoutePlace {
                place_id: row.get(0)?,
                position: row.get(1)?,
            })
        })
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut places = Vec::new();
    for row in rows {
        places.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(places)
}

/// Get a route with its ordered places
pub fn get_route(conn: &Connection, id: i64) -> Result<RouteRow, TripError> {
    let mut route = conn
        .query_row(
            "SELECT id, name, city_id, price, properties FROM routes WHERE id = ?",
            params![id],
            route_header_from_row,
        )
        .map_err(lookup_err(DbOp::Scan, format!("route {}", id)))?;

    route.places = get_route_places(conn, id)?;
    Ok(route)
}

/// List routes one page at a time
pub fn list_routes(conn: &Connection, limit: u32, offset: i64) -> Result<Vec<RouteRow>, TripError> {
    let mut stmt = conn
        .prepare("SELECT id, name, city_id, price, properties FROM routes ORDER BY id LIMIT ? OFFSET ?")
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let rows = stmt
        .query_map(params![i64::from(limit), offset], route_header_from_row)
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut routes = Vec::new();
    for row in rows {
        routes.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }

    for route in &mut routes {
        route.places = get_route_places(conn, route.id)?;
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::places::{create_place, CreatePlaceInput};
    use crate::db::TripDb;

    fn seed_places(conn: &Connection, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                create_place(
                    conn,
                    &CreatePlaceInput {
                        name: format!("place {}", i),
                        variety: "museum".into(),
                        city_id: 0,
                        district_id: 0,
                        properties: serde_json::Value::Null,
                    },
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_places_come_back_sorted() {
        let db = TripDb::open_in_memory().unwrap();
        let ids = db.with_conn(|conn| Ok(seed_places(conn, 3))).unwrap();

        let input = CreateRouteInput {
            name: "Center".into(),
            city_id: 1,
            price: 100,
            properties: serde_json::Value::Null,
            places: vec![
                RoutePlace { place_id: ids[2], position: 3 },
                RoutePlace { place_id: ids[0], position: 1 },
                RoutePlace { place_id: ids[1], position: 2 },
            ],
        };
        let route_id = db.with_conn_mut(|conn| create_route(conn, &input)).unwrap();

        let route = db.with_conn(|conn| get_route(conn, route_id)).unwrap();
        let order: Vec<i64> = route.places.iter().map(|p| p.place_id).collect();
        assert_eq!(order, ids);
        assert_eq!(route.position_of(ids[1]), Some(2));
        assert!(!route.contains_place(9999));
    }

    #[test]
    fn test_duplicate_position_rolls_back() {
        let db = TripDb::open_in_memory().unwrap();
        let ids = db.with_conn(|conn| Ok(seed_places(conn, 2))).unwrap();

        let input = CreateRouteInput {
            name: "Broken".into(),
            city_id: 0,
            price: 0,
            properties: serde_json::Value::Null,
            places: vec![
                RoutePlace { place_id: ids[0], position: 1 },
                RoutePlace { place_id: ids[1], position: 1 },
            ],
        };
        assert!(db.with_conn_mut(|conn| create_route(conn, &input)).is_err());
        assert_eq!(db.stats().unwrap().routes, 0);
    }

    #[test]
    fn test_missing_route() {
        let db = TripDb::open_in_memory().unwrap();
        let err = db.with_conn(|conn| get_route(conn, 1)).unwrap_err();
        assert!(matches!(err, TripError::NotFound(_)));
    }
}
