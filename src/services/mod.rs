//! Service layer for wayfarer
//!
//! Services hold the business rules between HTTP handlers and repositories:
//! validation, cross-entity orchestration, transaction boundaries and event
//! emission.
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod check_in;
pub mod progress;
pub mod chronology;
pub mod user_service;
pub mod planning_service;
pub mod feedback_service;

pub use check_in::{CheckInCoordinator, CheckInReceipt};
pub use chronology::{Chrono, ChronoEntity, ChronologyAggregator};
pub use events::{EventBus, EventListener, TripEvent};
pub use feedback_service::FeedbackService;
pub use planning_service::{Paging, PlanningService};
pub use progress::{CurrentRoute, ProgressChange, RouteProgressTracker};
pub use user_service::{UserProperties, UserService};

use std::sync::Arc;
use std::time::Duration;

use crate::cipher::CipherCodec;
use crate::config::Config;
use crate::db::TripDb;
use crate::tokens::OneTimeTokenStore;

/// Service container for dependency injection
///
/// Holds all services over one shared database and event bus.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub db: Arc<TripDb>,
    pub check_in: Arc<CheckInCoordinator>,
    pub progress: Arc<RouteProgressTracker>,
    pub chronology: Arc<ChronologyAggregator>,
    pub users: Arc<UserService>,
    pub planning: Arc<PlanningService>,
    pub feedback: Arc<FeedbackService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services from configuration
    pub fn new(db: Arc<TripDb>, config: &Config) -> Self {
        let receipts = Arc::new(OneTimeTokenStore::new(
            Duration::from_secs(config.receipt_ttl_secs),
            config.max_receipts,
        ));
        let paging = Paging {
            places_on_page: config.places_on_page,
            routes_on_page: config.routes_on_page,
        };
        Self::with_parts(db, &config.cipher_key, receipts, paging)
    }

    /// Create services with an explicit key and receipt store
    pub fn with_parts(
        db: Arc<TripDb>,
        cipher_key: &str,
        receipts: Arc<OneTimeTokenStore>,
        paging: Paging,
    ) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            check_in: Arc::new(CheckInCoordinator::new(
                db.clone(),
                CipherCodec::new(cipher_key),
                receipts,
                cipher_key,
                events.clone(),
            )),
            progress: Arc::new(RouteProgressTracker::new(db.clone(), events.clone())),
            chronology: Arc::new(ChronologyAggregator::new(db.clone())),
            users: Arc::new(UserService::new(db.clone(), events.clone())),
            planning: Arc::new(PlanningService::new(db.clone(), events.clone(), paging)),
            feedback: Arc::new(FeedbackService::new(db.clone(), events.clone())),
            events,
            db,
        }
    }
}
