//! Event system for trip activity
//!
//! Services publish what happened after the corresponding write commits.
//! Listeners are used for audit logging today.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum TripEvent {
    // Check-in events
    CheckedIn {
        user_id: i64,
        place_id: i64,
    },
    AutoCheckedIn {
        user_id: i64,
        place_id: i64,
        route_id: i64,
    },

    // Route progress events
    RouteStarted {
        user_id: i64,
        route_id: i64,
    },
    RouteCompleted {
        user_id: i64,
        route_id: i64,
    },

    // Account events
    UserRegistered {
        user_id: i64,
        login: String,
    },

    // Planning events
    PlaceCreated {
        id: i64,
    },
    RouteCreated {
        id: i64,
        place_count: usize,
    },
    TripCreated {
        id: i64,
        user_id: i64,
    },
    TripUpdated {
        id: i64,
    },
    Liked {
        user_id: i64,
        entity: &'static str,
        entity_id: i64,
    },
    Unliked {
        user_id: i64,
        entity: &'static str,
        entity_id: i64,
    },
    ReviewCreated {
        id: i64,
        author_id: i64,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &TripEvent);
}

/// Event bus for broadcasting trip events
pub struct EventBus {
    sender: broadcast::Sender<TripEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: TripEvent) {
        trace!(event = ?event, "Emitting trip event");
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TripEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes every trip event to the tracing log
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &TripEvent) {
        match event {
            TripEvent::CheckedIn { user_id, place_id } => {
                info!(user_id, place_id, "User checked in");
            }
            TripEvent::AutoCheckedIn {
                user_id,
                place_id,
                route_id,
            } => {
                info!(user_id, place_id, route_id, "Waypoint auto checked in");
            }
            TripEvent::RouteStarted { user_id, route_id } => {
                info!(user_id, route_id, "Route started");
            }
            TripEvent::RouteCompleted { user_id, route_id } => {
                info!(user_id, route_id, "Route completed");
            }
            TripEvent::UserRegistered { user_id, login } => {
                debug!(user_id, login = %login, "User registered");
            }
            _ => {
                trace!(event = ?event, "Trip event");
            }
        }
    }
}

/// Drain the bus into [`LoggingEventListener`] until it closes
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event log listener fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_subscriber_sees_route_start() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(TripEvent::RouteStarted { user_id: 1, route_id: 2 });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        assert_eq!(event, TripEvent::RouteStarted { user_id: 1, route_id: 2 });
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(TripEvent::TripUpdated { id: 3 });
    }
}
