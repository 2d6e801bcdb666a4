//! Chronology of a user's activity
//!
//! Every timestamped fact (like, review, check-in, route start) is attributed
//! to the first trip, in id order, whose window contains the timestamp and
//! whose schedule contains the fact's place or route. Unattributed facts get
//! trip id 0. The six lists are returned independently; merging and sorting
//! across them is left to the client.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::trips::TripRow;
use crate::db::{check_ins, favourites, reviews, route_logs, trips, TripDb};
use crate::error::TripError;

/// One timestamped fact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChronoEntity {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// 0 when no trip covers the fact
    pub trip_id: i64,
}

/// Trip-attributed timelines of a user
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chrono {
    pub liked_routes: Vec<ChronoEntity>,
    pub liked_places: Vec<ChronoEntity>,
    pub place_reviews: Vec<ChronoEntity>,
    pub route_reviews: Vec<ChronoEntity>,
    pub check_ins: Vec<ChronoEntity>,
    pub route_logs: Vec<ChronoEntity>,
}

#[derive(Clone, Copy)]
enum Subject {
    Place(i64),
    Route(i64),
}

fn attribute(user_trips: &[TripRow], subject: Subject, ts: DateTime<Utc>) -> i64 {
    user_trips
        .iter()
        .find(|trip| {
            trip.covers(ts)
                && match subject {
                    Subject::Place(id) => trip.schedules_place(id),
                    Subject::Route(id) => trip.schedules_route(id),
                }
        })
        .map(|trip| trip.id)
        .unwrap_or(0)
}

fn entity(user_trips: &[TripRow], id: i64, subject: Subject, timestamp: DateTime<Utc>) -> ChronoEntity {
    ChronoEntity {
        id,
        timestamp,
        trip_id: attribute(user_trips, subject, timestamp),
    }
}

/// Builds [`Chrono`] views from every activity table
pub struct ChronologyAggregator {
    db: Arc<TripDb>,
}

impl ChronologyAggregator {
    pub fn new(db: Arc<TripDb>) -> Self {
        Self { db }
    }

    pub fn get_chrono(&self, user_id: i64) -> Result<Chrono, TripError> {
        let chrono = self.db.with_conn(|conn| {
            let user_trips = trips::get_trips_by_user(conn, user_id)?;
            let liked = favourites::liked_by_user(conn, user_id)?;
            let authored = reviews::get_by_author(conn, user_id)?;
            let visits = check_ins::get_check_ins(conn, user_id)?;
            let logs = route_logs::get_route_logs(conn, user_id)?;

            Ok(Chrono {
                liked_routes: liked
                    .routes
                    .iter()
                    .map(|l| entity(&user_trips, l.entity_id, Subject::Route(l.entity_id), l.liked_at))
                    .collect(),
                liked_places: liked
                    .places
                    .iter()
                    .map(|l| entity(&user_trips, l.entity_id, Subject::Place(l.entity_id), l.liked_at))
                    .collect(),
                place_reviews: authored
                    .place_reviews
                    .iter()
                    .map(|r| entity(&user_trips, r.id, Subject::Place(r.entity_id), r.created_at))
                    .collect(),
                route_reviews: authored
                    .route_reviews
                    .iter()
                    .map(|r| entity(&user_trips, r.id, Subject::Route(r.entity_id), r.created_at))
                    .collect(),
                check_ins: visits
                    .iter()
                    .map(|c| entity(&user_trips, c.place_id, Subject::Place(c.place_id), c.checked_in_at))
                    .collect(),
                route_logs: logs
                    .iter()
                    .map(|l| entity(&user_trips, l.route_id, Subject::Route(l.route_id), l.start_time))
                    .collect(),
            })
        })?;

        debug!(
            user_id,
            check_ins = chrono.check_ins.len(),
            route_logs = chrono.route_logs.len(),
            "Chronology built"
        );
        Ok(chrono)
    }
}
