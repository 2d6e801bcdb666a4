//! Route progress tracking
//!
//! After a check-in, every candidate route of the user that contains the
//! checked-in place is re-evaluated against the user's full check-in history.
//! Candidate routes are the liked routes plus the routes scheduled in any of
//! the user's trips.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::route_logs::{self, RouteProgress};
use crate::db::{check_ins, favourites, routes, trips, TripDb};
use crate::error::TripError;

use super::events::{EventBus, TripEvent};

/// Route log transition caused by a check-in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ProgressChange {
    Started { route_id: i64 },
    Completed { route_id: i64 },
}

impl ProgressChange {
    pub fn event(self, user_id: i64) -> TripEvent {
        match self {
            ProgressChange::Started { route_id } => TripEvent::RouteStarted { user_id, route_id },
            ProgressChange::Completed { route_id } => TripEvent::RouteCompleted { user_id, route_id },
        }
    }
}

/// Where the user stands on their routes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CurrentRoute {
    /// No route log exists for the user
    NotStarted,
    /// First open route, the next place to visit and how many come before it
    InProgress {
        route_id: i64,
        next_place_id: Option<i64>,
        completed: usize,
    },
    /// Nothing open; the most recently finished route
    Finished { route_id: i64 },
}

/// Liked routes followed by trip routes, without duplicates
pub fn candidate_route_ids(conn: &Connection, user_id: i64) -> Result<Vec<i64>, TripError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    let liked = favourites::liked_by_user(conn, user_id)?;
    for route_id in liked.route_ids() {
        if seen.insert(route_id) {
            ids.push(route_id);
        }
    }

    for trip in trips::get_trips_by_user(conn, user_id)? {
        for route in &trip.routes {
            if seen.insert(route.entity_id) {
                ids.push(route.entity_id);
            }
        }
    }

    Ok(ids)
}

/// Open or close route logs after `place_id` was checked in.
///
/// Runs on the caller's connection so it can share the check-in transaction.
pub fn apply_check_in(
    conn: &Connection,
    user_id: i64,
    place_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<ProgressChange>, TripError> {
    let checked_in = check_ins::get_checked_in_place_ids(conn, user_id)?;
    let mut changes = Vec::new();

    for route_id in candidate_route_ids(conn, user_id)? {
        let route = routes::get_route(conn, route_id)?;
        if !route.contains_place(place_id) {
            continue;
        }

        let intersection = route
            .places
            .iter()
            .filter(|p| checked_in.contains(&p.place_id))
            .count();
        let total = route.places.len();

        if intersection == 1 {
            if route_logs::start_route(conn, user_id, route_id, now)? {
                changes.push(ProgressChange::Started { route_id });
            } else {
                debug!(user_id, route_id, "Route already has a log, not restarting");
            }
        }

        if intersection == total {
            if route_logs::end_route(conn, user_id, route_id, now)? {
                changes.push(ProgressChange::Completed { route_id });
            } else {
                debug!(user_id, route_id, "No open log to close");
            }
        }
    }

    Ok(changes)
}

/// Current route of a user, read on the caller's connection
pub fn current_route_in(conn: &Connection, user_id: i64) -> Result<CurrentRoute, TripError> {
    let open = route_logs::get_open_route_logs(conn, user_id)?;

    let Some(log) = open.first() else {
        return Ok(match route_logs::get_last_finished(conn, user_id)? {
            Some(last) => CurrentRoute::Finished { route_id: last.route_id },
            None => CurrentRoute::NotStarted,
        });
    };

    let places = routes::get_route_places(conn, log.route_id)?;
    let checked_in = check_ins::get_checked_in_place_ids(conn, user_id)?;

    let next = places
        .iter()
        .enumerate()
        .find(|(_, p)| !checked_in.contains(&p.place_id));

    Ok(match next {
        Some((completed, place)) => CurrentRoute::InProgress {
            route_id: log.route_id,
            next_place_id: Some(place.place_id),
            completed,
        },
        None => CurrentRoute::InProgress {
            route_id: log.route_id,
            next_place_id: None,
            completed: places.len(),
        },
    })
}

/// Decides when check-ins open and close route traversals
pub struct RouteProgressTracker {
    db: Arc<TripDb>,
    events: Arc<EventBus>,
}

impl RouteProgressTracker {
    pub fn new(db: Arc<TripDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Re-evaluate the user's routes for a place already checked in
    pub fn update(&self, user_id: i64, place_id: i64) -> Result<Vec<ProgressChange>, TripError> {
        let changes = self
            .db
            .in_transaction(|conn| apply_check_in(conn, user_id, place_id, Utc::now()))?;

        for change in &changes {
            self.events.emit(change.event(user_id));
        }
        Ok(changes)
    }

    pub fn current_route(&self, user_id: i64) -> Result<CurrentRoute, TripError> {
        self.db.with_conn(|conn| current_route_in(conn, user_id))
    }

    /// Traversal state of one route for one user
    pub fn route_progress(&self, user_id: i64, route_id: i64) -> Result<RouteProgress, TripError> {
        self.db
            .with_conn(|conn| route_logs::get_progress(conn, user_id, route_id))
    }
}
