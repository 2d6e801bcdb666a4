//! User service - accounts, profile properties and check-in lookups

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::places::{self, PlaceRow};
use crate::db::users::{self, CreateUserInput};
use crate::db::{check_ins, trips, TripDb};
use crate::error::TripError;

use super::events::{EventBus, TripEvent};

/// Profile view returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProperties {
    pub login: String,
    pub properties: serde_json::Value,
    /// Start of the trip the user is on right now, if any
    pub current_trip_start: Option<DateTime<Utc>>,
}

pub struct UserService {
    db: Arc<TripDb>,
    events: Arc<EventBus>,
}

impl UserService {
    pub fn new(db: Arc<TripDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Register a new account
    pub fn register(&self, input: CreateUserInput) -> Result<i64, TripError> {
        if input.login.trim().is_empty() {
            return Err(TripError::BadInput("login must not be empty".into()));
        }
        if input.password.is_empty() {
            return Err(TripError::BadInput("password must not be empty".into()));
        }

        let user_id = self.db.with_conn(|conn| users::create_user(conn, &input))?;

        self.events.emit(TripEvent::UserRegistered {
            user_id,
            login: input.login,
        });
        Ok(user_id)
    }

    /// Check credentials, returning the user id
    pub fn login(&self, login: &str, password: &str) -> Result<i64, TripError> {
        let credentials = self
            .db
            .with_conn(|conn| users::get_credentials(conn, login))
            .map_err(|e| match e {
                TripError::NotFound(_) => TripError::Unauthorized("unknown login".into()),
                other => other,
            })?;

        if credentials.password != password {
            warn!(login = %login, "Wrong password");
            return Err(TripError::Unauthorized("wrong password".into()));
        }

        info!(user_id = credentials.user_id, "User logged in");
        Ok(credentials.user_id)
    }

    pub fn get_properties(&self, user_id: i64) -> Result<UserProperties, TripError> {
        let now = Utc::now();
        self.db.with_conn(|conn| {
            let profile = users::get_profile(conn, user_id)?;
            let current_trip_start = trips::get_trips_by_user(conn, user_id)?
                .into_iter()
                .find(|trip| trip.covers(now))
                .map(|trip| trip.date_start);

            Ok(UserProperties {
                login: profile.login,
                properties: profile.properties,
                current_trip_start,
            })
        })
    }

    pub fn update_properties(&self, user_id: i64, properties: &serde_json::Value) -> Result<(), TripError> {
        self.db
            .with_conn(|conn| users::update_properties(conn, user_id, properties))
    }

    /// Places the user has checked in at, in id order
    pub fn checked_in_places(&self, user_id: i64) -> Result<Vec<PlaceRow>, TripError> {
        self.db.with_conn(|conn| {
            let mut ids: Vec<i64> = check_ins::get_checked_in_place_ids(conn, user_id)?
                .into_iter()
                .collect();
            ids.sort_unstable();
            places::get_places(conn, &ids)
        })
    }

    pub fn place_check_in_flag(&self, user_id: i64, place_id: i64) -> Result<bool, TripError> {
        self.db
            .with_conn(|conn| check_ins::has_checked_in(conn, user_id, place_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> UserService {
        UserService::new(
            Arc::new(TripDb::open_in_memory().unwrap()),
            Arc::new(EventBus::new()),
        )
    }

    fn input(login: &str, password: &str) -> CreateUserInput {
        CreateUserInput {
            login: login.into(),
            password: password.into(),
            properties: serde_json::json!({"lang": "ru"}),
        }
    }

    #[test]
    fn test_register_and_login() {
        let svc = service();
        let id = svc.register(input("masha", "pw")).unwrap();
        assert_eq!(svc.login("masha", "pw").unwrap(), id);
        assert!(matches!(svc.login("masha", "nope"), Err(TripError::Unauthorized(_))));
        assert!(matches!(svc.login("ghost", "pw"), Err(TripError::Unauthorized(_))));
        assert!(matches!(svc.register(input("masha", "x")), Err(TripError::Conflict(_))));
    }

    #[test]
    fn test_register_rejects_blank_login() {
        assert!(matches!(service().register(input("  ", "pw")), Err(TripError::BadInput(_))));
    }

    #[test]
    fn test_properties_without_trip() {
        let svc = service();
        let id = svc.register(input("petr", "pw")).unwrap();
        let props = svc.get_properties(id).unwrap();
        assert_eq!(props.login, "petr");
        assert_eq!(props.properties["lang"], "ru");
        assert_eq!(props.current_trip_start, None);

        svc.update_properties(id, &serde_json::json!({"lang": "en"})).unwrap();
        assert_eq!(svc.get_properties(id).unwrap().properties["lang"], "en");
        assert!(svc.checked_in_places(id).unwrap().is_empty());
        assert!(!svc.place_check_in_flag(id, 1).unwrap());
    }
}
