//! Check-in coordination
//!
//! Flow of a check-in:
//!
//! ```text
//! ciphertext ──decode──> (place_id, nonce)
//!                 │
//!   ┌─────────────┴── one transaction ─────────────┐
//!   │ insert check-in (duplicate -> Conflict)      │
//!   │ skip-ahead auto check-ins on open routes     │
//!   │ open/close route logs                        │
//!   └─────────────┬────────────────────────────────┘
//!                 │ commit
//!                 v
//!   issue receipt sha256(place_id + key), emit events
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cipher::CipherCodec;
use crate::db::{check_ins, places, route_logs, routes, users, TripDb};
use crate::error::TripError;
use crate::tokens::{receipt_hash, OneTimeTokenStore};

use super::events::{EventBus, TripEvent};
use super::progress::{apply_check_in, ProgressChange};

/// Place varieties that are passed on the way rather than visited
pub const NON_CHECKINABLE_VARIETIES: &[&str] = &[
    "square",
    "architecture",
    "monument",
    "embankment",
    "street",
    "nature",
    "rare_event",
];

/// True for decorative waypoints that skip-ahead may check in automatically
pub fn is_non_checkinable(variety: &str) -> bool {
    let normalized = variety.trim().to_lowercase().replace([' ', '-'], "_");
    let singular = normalized.strip_suffix('s').unwrap_or(&normalized);
    NON_CHECKINABLE_VARIETIES
        .iter()
        .any(|v| *v == normalized || *v == singular)
}

/// Place auto checked in while walking back along a route
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoCheckIn {
    pub route_id: i64,
    pub place_id: i64,
}

/// Result of a successful check-in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckInReceipt {
    /// One-time token the client presents to `validate`
    pub receipt: String,
    pub place_id: i64,
    pub auto_checked_in: Vec<AutoCheckIn>,
    pub route_changes: Vec<ProgressChange>,
}

/// Walk back from `place_id` on every open route of the user, auto checking
/// in decorative waypoints until the first checkpoint.
pub fn skip_ahead(
    conn: &Connection,
    user_id: i64,
    place_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<AutoCheckIn>, TripError> {
    let mut auto = Vec::new();

    for log in route_logs::get_open_route_logs(conn, user_id)? {
        let route = routes::get_route(conn, log.route_id)?;
        let Some(position) = route.position_of(place_id) else {
            continue;
        };

        let earlier = route
            .places
            .iter()
            .rev()
            .filter(|p| p.position < position && p.position >= 1);

        for waypoint in earlier {
            let place = places::get_place(conn, waypoint.place_id)?;
            if !is_non_checkinable(&place.variety) {
                break;
            }

            if check_ins::insert_auto_check_in(conn, user_id, place.id, now)? {
                debug!(user_id, route_id = route.id, place_id = place.id, "Auto check-in");
                auto.push(AutoCheckIn {
                    route_id: route.id,
                    place_id: place.id,
                });
            }
        }
    }

    Ok(auto)
}

/// Turns check-in tokens into persisted check-ins and receipts
pub struct CheckInCoordinator {
    db: Arc<TripDb>,
    cipher: CipherCodec,
    receipts: Arc<OneTimeTokenStore>,
    receipt_secret: String,
    events: Arc<EventBus>,
}

impl CheckInCoordinator {
    pub fn new(
        db: Arc<TripDb>,
        cipher: CipherCodec,
        receipts: Arc<OneTimeTokenStore>,
        receipt_secret: impl Into<String>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            cipher,
            receipts,
            receipt_secret: receipt_secret.into(),
            events,
        }
    }

    /// Check a user in with an encrypted place payload
    pub fn check_in(&self, ciphertext: &[u8], user_id: i64) -> Result<CheckInReceipt, TripError> {
        let payload = self.cipher.decode_payload(ciphertext).map_err(|e| {
            warn!(user_id, error = %e, "Rejected check-in payload");
            e
        })?;
        let place_id = payload.place_id;
        let now = Utc::now();

        let (auto_checked_in, route_changes) = self.db.in_transaction(|conn| {
            if !users::user_exists(conn, user_id)? {
                return Err(TripError::NotFound(format!("user {}", user_id)));
            }
            places::get_place(conn, place_id)?;

            check_ins::insert_check_in(conn, user_id, place_id, now)?;
            let auto = skip_ahead(conn, user_id, place_id, now)?;
            let changes = apply_check_in(conn, user_id, place_id, now)?;
            Ok((auto, changes))
        })?;

        info!(
            user_id,
            place_id,
            auto = auto_checked_in.len(),
            route_changes = route_changes.len(),
            "Check-in recorded"
        );

        self.events.emit(TripEvent::CheckedIn { user_id, place_id });
        for auto in &auto_checked_in {
            self.events.emit(TripEvent::AutoCheckedIn {
                user_id,
                place_id: auto.place_id,
                route_id: auto.route_id,
            });
        }
        for change in &route_changes {
            self.events.emit(change.event(user_id));
        }

        let receipt = receipt_hash(place_id, &self.receipt_secret);
        self.receipts.issue(&receipt);

        Ok(CheckInReceipt {
            receipt,
            place_id,
            auto_checked_in,
            route_changes,
        })
    }

    /// Consume a receipt; true exactly once per issue
    pub fn validate_hash(&self, receipt: &str) -> bool {
        let valid = self.receipts.consume(receipt);
        debug!(valid, "Receipt validation");
        valid
    }

    pub fn encode_payload(&self, place_id: i64, nonce: &str) -> Result<Vec<u8>, TripError> {
        self.cipher
            .encode(format!("{} {}", place_id, nonce).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_checkinable_varieties() {
        for v in ["square", "Street", "streets", "rare event", "Rare_Events", "nature", "monuments"] {
            assert!(is_non_checkinable(v), "{} should be a waypoint", v);
        }
        for v in ["museum", "restik", "park", "", "s"] {
            assert!(!is_non_checkinable(v), "{} should be a checkpoint", v);
        }
    }
}
