//! Wayfarer - trip planning backend with check-in tracking
//!
//! Travellers plan multi-day trips out of places and routes, then prove
//! presence at places by scanning an encrypted QR payload. Each check-in can
//! auto check in decorative waypoints passed on the way and opens or closes
//! route traversals. A chronology view attributes every timestamped action to
//! the trip it happened on.
//!
//! ## Layout
//!
//! ```text
//! http.rs          hyper API
//!   └─ services/   check-in coordination, route progress, chronology, CRUD rules
//!        └─ db/    SQLite repositories
//! cipher.rs        XOR payload codec
//! tokens.rs        one-time receipt store
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/wayfarer/
//! ├── wayfarer.db     # SQLite database (WAL mode)
//! └── config.toml     # Configuration
//! ```

pub mod cipher;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;
pub mod tokens;

// Re-exports
pub use cipher::{CheckInPayload, CipherCodec};
pub use config::Config;
pub use db::TripDb;
pub use error::{ErrorKind, TripError};
pub use http::HttpServer;
pub use services::Services;
pub use tokens::OneTimeTokenStore;
