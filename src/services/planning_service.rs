//! Planning service - places, routes and trips
//!
//! Wraps the catalogue and itinerary repositories with validation, paging and
//! event emission.

use std::collections::HashSet;
use std::sync::Arc;

use crate::db::places::{self, CreatePlaceInput, PlaceFilter, PlaceRow};
use crate::db::routes::{self, CreateRouteInput, RouteRow};
use crate::db::trips::{self, CreateTripInput, ScheduledEntity, TripEntry, TripRow};
use crate::db::{page_offset, TripDb};
use crate::error::TripError;

use super::events::{EventBus, TripEvent};

/// Page sizes for list endpoints
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub places_on_page: u32,
    pub routes_on_page: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            places_on_page: 20,
            routes_on_page: 20,
        }
    }
}

pub struct PlanningService {
    db: Arc<TripDb>,
    events: Arc<EventBus>,
    paging: Paging,
}

impl PlanningService {
    pub fn new(db: Arc<TripDb>, events: Arc<EventBus>, paging: Paging) -> Self {
        Self { db, events, paging }
    }

    // =========================================================================
    // Places
    // =========================================================================

    pub fn create_place(&self, input: CreatePlaceInput) -> Result<i64, TripError> {
        if input.name.trim().is_empty() {
            return Err(TripError::BadInput("place name must not be empty".into()));
        }
        let id = self.db.with_conn(|conn| places::create_place(conn, &input))?;
        self.events.emit(TripEvent::PlaceCreated { id });
        Ok(id)
    }

    pub fn get_place(&self, id: i64) -> Result<PlaceRow, TripError> {
        self.db.with_conn(|conn| places::get_place(conn, id))
    }

    /// One page (1-based) of places matching `filter`
    pub fn list_places(&self, filter: &PlaceFilter, page: u32) -> Result<Vec<PlaceRow>, TripError> {
        let limit = self.paging.places_on_page;
        self.db
            .with_conn(|conn| places::list_places(conn, filter, limit, page_offset(page, limit)))
    }

    // =========================================================================
    // Routes
    // =========================================================================

    pub fn create_route(&self, input: CreateRouteInput) -> Result<i64, TripError> {
        validate_route(&input)?;
        let place_count = input.places.len();

        let id = self.db.with_conn_mut(|conn| {
            let mut unique: Vec<i64> = input.places.iter().map(|p| p.place_id).collect();
            unique.sort_unstable();
            unique.dedup();
            if places::get_places(conn, &unique)?.len() != unique.len() {
                return Err(TripError::NotFound("route references an unknown place".into()));
            }
            routes::create_route(conn, &input)
        })?;

        self.events.emit(TripEvent::RouteCreated { id, place_count });
        Ok(id)
    }

    pub fn get_route(&self, id: i64) -> Result<RouteRow, TripError> {
        self.db.with_conn(|conn| routes::get_route(conn, id))
    }

    pub fn list_routes(&self, page: u32) -> Result<Vec<RouteRow>, TripError> {
        let limit = self.paging.routes_on_page;
        self.db
            .with_conn(|conn| routes::list_routes(conn, limit, page_offset(page, limit)))
    }

    // =========================================================================
    // Trips
    // =========================================================================

    pub fn create_trip(&self, input: CreateTripInput) -> Result<i64, TripError> {
        if input.date_end <= input.date_start {
            return Err(TripError::BadInput("trip must end after it starts".into()));
        }
        let user_id = input.user_id;

        let id = self.db.with_conn_mut(|conn| trips::create_trip(conn, &input))?;
        self.events.emit(TripEvent::TripCreated { id, user_id });
        Ok(id)
    }

    pub fn get_trip(&self, id: i64) -> Result<TripRow, TripError> {
        self.db.with_conn(|conn| trips::get_trip(conn, id))
    }

    pub fn trips_by_user(&self, user_id: i64) -> Result<Vec<TripRow>, TripError> {
        self.db.with_conn(|conn| trips::get_trips_by_user(conn, user_id))
    }

    /// Schedule a place or route on an existing trip
    pub fn add_entry(&self, kind: TripEntry, trip_id: i64, entry: ScheduledEntity) -> Result<(), TripError> {
        self.db.with_conn(|conn| {
            trips::get_trip(conn, trip_id)?;
            trips::add_entry(conn, kind, trip_id, &entry)
        })?;
        self.events.emit(TripEvent::TripUpdated { id: trip_id });
        Ok(())
    }

    pub fn change_day(&self, kind: TripEntry, trip_id: i64, entity_id: i64, day: i64) -> Result<(), TripError> {
        self.db
            .with_conn(|conn| trips::change_day(conn, kind, trip_id, entity_id, day))?;
        self.events.emit(TripEvent::TripUpdated { id: trip_id });
        Ok(())
    }

    pub fn change_position(
        &self,
        kind: TripEntry,
        trip_id: i64,
        entity_id: i64,
        position: i64,
    ) -> Result<(), TripError> {
        self.db
            .with_conn(|conn| trips::change_position(conn, kind, trip_id, entity_id, position))?;
        self.events.emit(TripEvent::TripUpdated { id: trip_id });
        Ok(())
    }

    pub fn remove_entry(&self, kind: TripEntry, trip_id: i64, entity_id: i64) -> Result<(), TripError> {
        self.db
            .with_conn(|conn| trips::remove_entry(conn, kind, trip_id, entity_id))?;
        self.events.emit(TripEvent::TripUpdated { id: trip_id });
        Ok(())
    }
}

fn validate_route(input: &CreateRouteInput) -> Result<(), TripError> {
    if input.name.trim().is_empty() {
        return Err(TripError::BadInput("route name must not be empty".into()));
    }
    if input.places.is_empty() {
        return Err(TripError::BadInput("route must contain at least one place".into()));
    }

    // progress counts distinct checked-in places against the route length,
    // so a place may appear only once
    let mut positions = HashSet::new();
    let mut place_ids = HashSet::new();
    for place in &input.places {
        if place.position < 1 {
            return Err(TripError::BadInput(format!(
                "route positions start at 1, got {}",
                place.position
            )));
        }
        if !positions.insert(place.position) {
            return Err(TripError::BadInput(format!(
                "position {} is used twice",
                place.position
            )));
        }
        if !place_ids.insert(place.place_id) {
            return Err(TripError::BadInput(format!(
                "place {} appears twice in the route",
                place.place_id
            )));
        }
    }
    Ok(())
}
