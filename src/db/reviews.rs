//! Place and route reviews

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{DbOp, TripError};

/// What a review is written about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTarget {
    Place,
    Route,
}

impl ReviewTarget {
    fn table(self) -> &'static str {
        match self {
            ReviewTarget::Place => "place_reviews",
            ReviewTarget::Route => "route_reviews",
        }
    }

    fn column(self) -> &'static str {
        match self {
            ReviewTarget::Place => "place_id",
            ReviewTarget::Route => "route_id",
        }
    }
}

/// Review row from database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRow {
    pub id: i64,
    pub author_id: i64,
    pub entity_id: i64,
    pub mark: f32,
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a review
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewInput {
    pub author_id: i64,
    #[serde(alias = "place_id", alias = "route_id")]
    pub entity_id: i64,
    pub mark: f32,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Input for updating a review
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReviewInput {
    pub id: i64,
    pub mark: f32,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Reviews written by one author
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthoredReviews {
    pub place_reviews: Vec<ReviewRow>,
    pub route_reviews: Vec<ReviewRow>,
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    let properties: String = row.get(4)?;
    Ok(ReviewRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        entity_id: row.get(2)?,
        mark: row.get(3)?,
        properties: serde_json::from_str(&properties).unwrap_or(serde_json::Value::Null),
        created_at: row.get(5)?,
    })
}

fn select_sql(target: ReviewTarget, filter_column: &str) -> String {
    format!(
        "SELECT id, author_id, {}, mark, properties, created_at FROM {} WHERE {} = ? ORDER BY created_at, id",
        target.column(),
        target.table(),
        filter_column
    )
}

/// Create a review, returning its id
pub fn create_review(
    conn: &Connection,
    target: ReviewTarget,
    input: &CreateReviewInput,
    at: DateTime<Utc>,
) -> Result<i64, TripError> {
    let properties = serde_json::to_string(&input.properties)
        .map_err(|_| TripError::BadInput("review properties are not serializable".into()))?;

    let sql = format!(
        "INSERT INTO {} (author_id, {}, mark, properties, created_at) VALUES (?, ?, ?, ?, ?)",
        target.table(),
        target.column()
    );
    conn.execute(
        &sql,
        params![input.author_id, input.entity_id, input.mark, properties, at],
    )
    .map_err(|e| TripError::db(DbOp::Exec, e))?;

    Ok(conn.last_insert_rowid())
}

fn query_reviews(
    conn: &Connection,
    target: ReviewTarget,
    filter_column: &str,
    value: i64,
) -> Result<Vec<ReviewRow>, TripError> {
    let sql = select_sql(target, filter_column);
    let mut stmt = conn.prepare(&sql).map_err(|e| TripError::db(DbOp::Query, e))?;
    let rows = stmt
        .query_map(params![value], review_from_row)
        .map_err(|e| TripError::db(DbOp::Query, e))?;

    let mut reviews = Vec::new();
    for row in rows {
        reviews.push(row.map_err(|e| TripError::db(DbOp::Scan, e))?);
    }
    Ok(reviews)
}

/// Place and route reviews written by a user
pub fn get_by_author(conn: &Connection, author_id: i64) -> Result<AuthoredReviews, TripError> {
    Ok(AuthoredReviews {
        place_reviews: query_reviews(conn, ReviewTarget::Place, "author_id", author_id)?,
        route_reviews: query_reviews(conn, ReviewTarget::Route, "author_id", author_id)?,
    })
}

/// Reviews written about one place or route
pub fn get_by_entity(conn: &Connection, target: ReviewTarget, entity_id: i64) -> Result<Vec<ReviewRow>, TripError> {
    query_reviews(conn, target, target.column(), entity_id)
}

/// Replace mark and properties of a review
pub fn update_review(conn: &Connection, target: ReviewTarget, input: &UpdateReviewInput) -> Result<(), TripError> {
    let properties = serde_json::to_string(&input.properties)
        .map_err(|_| TripError::BadInput("review properties are not serializable".into()))?;

    let sql = format!("UPDATE {} SET mark = ?, properties = ? WHERE id = ?", target.table());
    let changed = conn
        .execute(&sql, params![input.mark, properties, input.id])
        .map_err(|e| TripError::db(DbOp::Exec, e))?;

    if changed == 0 {
        return Err(TripError::NotFound(format!("review {}", input.id)));
    }
    Ok(())
}
