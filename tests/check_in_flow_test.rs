//! End-to-end check-in flow through the public service API

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use wayfarer::db::places::CreatePlaceInput;
use wayfarer::db::route_logs::RouteProgress;
use wayfarer::db::routes::{CreateRouteInput, RoutePlace};
use wayfarer::db::trips::{CreateTripInput, ScheduledEntity};
use wayfarer::db::users::CreateUserInput;
use wayfarer::db::favourites::LikeTarget;
use wayfarer::services::{CurrentRoute, Paging, ProgressChange};
use wayfarer::{ErrorKind, OneTimeTokenStore, Services, TripDb, TripError};

const KEY: &str = "k3y-for-tests-0123456789-abcdefghijklmnop";

fn services() -> Services {
    Services::with_parts(
        Arc::new(TripDb::open_in_memory().unwrap()),
        KEY,
        Arc::new(OneTimeTokenStore::new(Duration::from_secs(60), 100)),
        Paging::default(),
    )
}

fn user(s: &Services, login: &str) -> i64 {
    s.users
        .register(CreateUserInput {
            login: login.into(),
            password: "pw".into(),
            properties: serde_json::Value::Null,
        })
        .unwrap()
}

fn place(s: &Services, name: &str, variety: &str) -> i64 {
    s.planning
        .create_place(CreatePlaceInput {
            name: name.into(),
            variety: variety.into(),
            city_id: 1,
            district_id: 0,
            properties: serde_json::Value::Null,
        })
        .unwrap()
}

fn route(s: &Services, places: &[i64]) -> i64 {
    s.planning
        .create_route(CreateRouteInput {
            name: "route".into(),
            city_id: 1,
            price: 0,
            properties: serde_json::Value::Null,
            places: places
                .iter()
                .enumerate()
                .map(|(i, id)| RoutePlace { place_id: *id, position: i as i64 + 1 })
                .collect(),
        })
        .unwrap()
}

fn token(s: &Services, place_id: i64) -> Vec<u8> {
    s.check_in.encode_payload(place_id, "nonce").unwrap()
}

fn check_in(s: &Services, user_id: i64, place_id: i64) -> wayfarer::services::CheckInReceipt {
    s.check_in.check_in(&token(s, place_id), user_id).unwrap()
}

#[test]
fn duplicate_check_in_is_conflict_and_keeps_one_row() {
    let s = services();
    let u = user(&s, "dup");
    let p = place(&s, "Museum", "museum");

    check_in(&s, u, p);
    let err = s.check_in.check_in(&token(&s, p), u).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, TripError::DuplicateCheckIn { .. }));
    assert_eq!(s.db.stats().unwrap().check_ins, 1);
}

#[test]
fn receipt_validates_exactly_once() {
    let s = services();
    let u = user(&s, "receipt");
    let p = place(&s, "Museum", "museum");

    let receipt = check_in(&s, u, p).receipt;
    assert!(s.check_in.validate_hash(&receipt));
    assert!(!s.check_in.validate_hash(&receipt));
    assert!(!s.check_in.validate_hash("not-a-receipt"));
}

#[test]
fn malformed_tokens_are_bad_input() {
    let s = services();
    let u = user(&s, "bad");

    let too_long = vec![b'x'; KEY.len() + 1];
    assert_eq!(s.check_in.check_in(&too_long, u).unwrap_err().kind(), ErrorKind::BadInput);

    let no_nonce = s.check_in.encode_payload(1, "").unwrap();
    assert_eq!(s.check_in.check_in(&no_nonce, u).unwrap_err().kind(), ErrorKind::BadInput);

    let garbage = wayfarer::CipherCodec::new(KEY).encode(b"abc nonce").unwrap();
    assert_eq!(s.check_in.check_in(&garbage, u).unwrap_err().kind(), ErrorKind::BadInput);
}

#[test]
fn unknown_place_is_not_found_and_persists_nothing() {
    let s = services();
    let u = user(&s, "lost");

    let err = s.check_in.check_in(&token(&s, 999), u).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(s.db.stats().unwrap().check_ins, 0);
}

#[test]
fn skip_ahead_checks_in_waypoints_until_a_checkpoint() {
    let s = services();
    let u = user(&s, "walker");
    let w0 = place(&s, "Old street", "street");
    let p1 = place(&s, "Gallery", "museum");
    let w2 = place(&s, "Embankment", "embankment");
    let p3 = place(&s, "Cathedral", "museum");
    let r = route(&s, &[w0, p1, w2, p3]);
    s.feedback.like(LikeTarget::Route, u, r).unwrap();

    let first = check_in(&s, u, p1);
    assert!(first.auto_checked_in.is_empty());
    assert_eq!(first.route_changes, vec![ProgressChange::Started { route_id: r }]);

    let second = check_in(&s, u, p3);
    let auto: Vec<i64> = second.auto_checked_in.iter().map(|a| a.place_id).collect();
    assert_eq!(auto, vec![w2]);

    assert!(s.users.place_check_in_flag(u, w2).unwrap());
    // the walk stopped at the checkpoint, the street before it is untouched
    assert!(!s.users.place_check_in_flag(u, w0).unwrap());
    assert!(second.route_changes.is_empty());
    assert_eq!(
        s.progress.current_route(u).unwrap(),
        CurrentRoute::InProgress { route_id: r, next_place_id: Some(w0), completed: 0 }
    );
}

#[test]
fn skip_ahead_completes_route_when_waypoints_fill_the_gap() {
    let s = services();
    let u = user(&s, "finisher");
    let p1 = place(&s, "Start", "museum");
    let p2 = place(&s, "Main street", "Street");
    let p3 = place(&s, "End", "museum");
    let r = route(&s, &[p1, p2, p3]);
    s.feedback.like(LikeTarget::Route, u, r).unwrap();

    check_in(&s, u, p1);
    let receipt = check_in(&s, u, p3);

    assert_eq!(receipt.auto_checked_in.len(), 1);
    assert_eq!(receipt.auto_checked_in[0].place_id, p2);
    assert_eq!(receipt.route_changes, vec![ProgressChange::Completed { route_id: r }]);
}

#[test]
fn checkpoint_predecessor_halts_the_walk() {
    let s = services();
    let u = user(&s, "strict");
    let a = place(&s, "A", "museum");
    let p1 = place(&s, "P1", "museum");
    let p2 = place(&s, "P2", "museum");
    let r = route(&s, &[a, p1, p2]);
    s.feedback.like(LikeTarget::Route, u, r).unwrap();

    check_in(&s, u, a);
    let receipt = check_in(&s, u, p2);

    assert!(receipt.auto_checked_in.is_empty());
    assert!(!s.users.place_check_in_flag(u, p1).unwrap());
}

#[test]
fn out_of_order_check_in_does_not_backfill_checkpoints() {
    let s = services();
    let u = user(&s, "jumper");
    let p1 = place(&s, "P1", "museum");
    let p2 = place(&s, "P2", "museum");
    let r = route(&s, &[p1, p2]);
    s.feedback.like(LikeTarget::Route, u, r).unwrap();

    let receipt = check_in(&s, u, p2);
    assert!(receipt.auto_checked_in.is_empty());
    assert!(!s.users.place_check_in_flag(u, p1).unwrap());
    assert_eq!(receipt.route_changes, vec![ProgressChange::Started { route_id: r }]);
}

#[test]
fn trip_route_is_tracked_and_attributed_end_to_end() {
    let s = services();
    let u = user(&s, "traveller");
    let p1 = place(&s, "Kremlin", "museum");
    let p2 = place(&s, "Tretyakov", "museum");
    let r = route(&s, &[p1, p2]);

    let now = Utc::now();
    let trip = s
        .planning
        .create_trip(CreateTripInput {
            user_id: u,
            date_start: now - chrono::Duration::hours(1),
            date_end: now + chrono::Duration::days(1),
            properties: serde_json::Value::Null,
            places: vec![],
            routes: vec![ScheduledEntity { entity_id: r, day: 1, position: 1 }],
        })
        .unwrap();

    assert_eq!(s.progress.current_route(u).unwrap(), CurrentRoute::NotStarted);

    check_in(&s, u, p1);
    assert!(matches!(
        s.progress.route_progress(u, r).unwrap(),
        RouteProgress::InProgress { .. }
    ));

    let chrono = s.chronology.get_chrono(u).unwrap();
    assert_eq!(chrono.route_logs.len(), 1);
    assert_eq!(chrono.route_logs[0].id, r);
    assert_eq!(chrono.route_logs[0].trip_id, trip);
    // places are not scheduled on the trip, only the route is
    assert_eq!(chrono.check_ins[0].trip_id, 0);

    check_in(&s, u, p2);
    assert!(matches!(
        s.progress.route_progress(u, r).unwrap(),
        RouteProgress::Completed { .. }
    ));
    assert_eq!(s.progress.current_route(u).unwrap(), CurrentRoute::Finished { route_id: r });
    assert_eq!(s.db.stats().unwrap().open_route_logs, 0);

    // a completed route is never reopened
    let p3 = place(&s, "Other", "museum");
    check_in(&s, u, p3);
    assert_eq!(s.progress.current_route(u).unwrap(), CurrentRoute::Finished { route_id: r });
}

#[test]
fn events_follow_a_committed_check_in() {
    let s = services();
    let mut rx = s.events.subscribe();
    let u = user(&s, "listener");
    let p = place(&s, "Solo", "museum");
    let r = route(&s, &[p]);
    s.feedback.like(LikeTarget::Route, u, r).unwrap();

    check_in(&s, u, p);

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    use wayfarer::services::TripEvent;
    assert!(seen.contains(&TripEvent::CheckedIn { user_id: u, place_id: p }));
    assert!(seen.contains(&TripEvent::RouteStarted { user_id: u, route_id: r }));
    assert!(seen.contains(&TripEvent::RouteCompleted { user_id: u, route_id: r }));
}
