//! HTTP API for trip planning and check-ins
//!
//! Scalars travel as query parameters, create/update payloads as JSON bodies.
//! Errors are returned as `{"error": "..."}` with a status chosen from the
//! error kind.
//!
//! ## User API
//! - `POST /user/check_in?cipher=..&user_id=..` - check in (cipher is base64url)
//! - `POST /user/validate?hash=..` - consume a receipt (200 valid, 418 invalid)
//! - `PUT /user/register`, `PUT /user/login`
//! - `GET /user/properties?id=..`, `PUT /user/update_properties`
//! - `GET /user/checked_in?id=..`, `GET /user/chrono?id=..`, `GET /user/current_route?id=..`
//! - `GET /user/place_check_in_flag?user_id=..&place_id=..`
//! - `GET /user/route_check_in_flag?user_id=..&route_id=..`
//!
//! ## Catalogue API
//! - `POST /place/create`, `GET /place/by_id?id=..`, `GET /place/list?page=..&variety=..&name=..`
//! - `POST /route/create`, `GET /route/by_id?id=..`, `GET /route/by_page?page=..`
//!
//! ## Trip API
//! - `POST /trip/create`, `GET /trip/by_id?id=..`, `GET /trip/by_user_id?id=..`
//! - `PUT /trip/{place,route}/add`, `PUT /trip/{place,route}/change/day`,
//!   `PUT /trip/{place,route}/change/position`, `DELETE /trip/{place,route}?trip_id=..&id=..`
//!
//! ## Feedback API
//! - `POST /favourite/like_place`, `POST /favourite/like_route`
//! - `DELETE /favourite/place?user_id=..&id=..`, `DELETE /favourite/route?user_id=..&id=..`
//! - `GET /favourite/by_user_id?id=..`
//! - `POST /review/create_on_place`, `POST /review/create_on_route`
//! - `GET /review/author?id=..`, `GET /review/place?id=..`, `GET /review/route?id=..`
//! - `PUT /review/update_on_place`, `PUT /review/update_on_route`
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X PUT -d '{"login":"anna","password":"pw"}' http://localhost:8080/user/register
//! curl -X POST "http://localhost:8080/user/check_in?user_id=1&cipher=UVFS..."
//! curl -X POST "http://localhost:8080/user/validate?hash=3f2a..."
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::db::favourites::LikeTarget;
use crate::db::places::{CreatePlaceInput, PlaceFilter};
use crate::db::reviews::{CreateReviewInput, ReviewTarget, UpdateReviewInput};
use crate::db::routes::CreateRouteInput;
use crate::db::trips::{CreateTripInput, ScheduledEntity, TripEntry};
use crate::db::users::CreateUserInput;
use crate::error::TripError;
use crate::services::response::{
    created, error_response, from_create_result, from_result, from_unit_result, json_response,
    method_not_allowed, not_found, ok, HandlerResult,
};
use crate::services::Services;

#[derive(Debug, Deserialize)]
struct LoginBody {
    login: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PropertiesBody {
    id: i64,
    #[serde(default)]
    properties: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AddEntryBody {
    trip_id: i64,
    #[serde(flatten)]
    entry: ScheduledEntity,
}

#[derive(Debug, Deserialize)]
struct ChangeDayBody {
    trip_id: i64,
    id: i64,
    day: i64,
}

#[derive(Debug, Deserialize)]
struct ChangePositionBody {
    trip_id: i64,
    id: i64,
    position: i64,
}

#[derive(Debug, Deserialize)]
struct LikeBody {
    user_id: i64,
    id: i64,
}

/// Parsed query string
struct Query(HashMap<String, String>);

impl Query {
    fn parse(raw: Option<&str>) -> Self {
        Query(
            url::form_urlencoded::parse(raw.unwrap_or("").as_bytes())
                .into_owned()
                .collect(),
        )
    }

    fn str(&self, name: &str) -> Result<&str, TripError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TripError::BadInput(format!("missing query parameter {}", name)))
    }

    fn opt_str(&self, name: &str) -> Option<String> {
        self.0.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn i64(&self, name: &str) -> Result<i64, TripError> {
        let raw = self.str(name)?;
        raw.parse()
            .map_err(|_| TripError::BadInput(format!("{} must be an integer, got {:?}", name, raw)))
    }

    /// 1-based page number, defaulting to the first page
    fn page(&self) -> Result<u32, TripError> {
        match self.0.get("page") {
            None => Ok(1),
            Some(raw) => raw
                .parse()
                .map_err(|_| TripError::BadInput(format!("page must be a positive integer, got {:?}", raw))),
        }
    }
}

/// Decode the base64url `cipher` parameter, padded or not
pub fn decode_cipher_param(raw: &str) -> Result<Vec<u8>, TripError> {
    URL_SAFE_NO_PAD
        .decode(raw)
        .or_else(|_| URL_SAFE.decode(raw))
        .map_err(|e| TripError::BadInput(format!("cipher is not base64url: {}", e)))
}

/// Encode a ciphertext for the `cipher` parameter
pub fn encode_cipher_param(ciphertext: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(ciphertext)
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, TripError> {
    serde_json::from_slice(body).map_err(|e| TripError::BadInput(format!("invalid JSON body: {}", e)))
}

fn entry_kind(segment: &str) -> Option<TripEntry> {
    match segment {
        "place" => Some(TripEntry::Place),
        "route" => Some(TripEntry::Route),
        _ => None,
    }
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self { services, bind_addr }
    }

    /// Bind and run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), TripError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), TripError> {
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(self.dispatch(&parts.method, parts.uri.path(), parts.uri.query(), body))
    }

    /// Route a request with an already collected body
    pub fn dispatch(&self, method: &Method, path: &str, query: Option<&str>, body: Bytes) -> Response<Full<Bytes>> {
        debug!(method = %method, path = %path, "Incoming request");
        let query = Query::parse(query);

        match self.route(method, path, &query, &body) {
            Ok(response) => response,
            Err(e) => error_response(e),
        }
    }

    fn route(&self, method: &Method, path: &str, q: &Query, body: &Bytes) -> HandlerResult {
        let s = &self.services;

        let response = match (method.clone(), path) {
            (Method::GET, "/health") => ok(&serde_json::json!({
                "status": "ok",
                "stats": s.db.stats()?,
            })),

            // User
            (Method::POST, "/user/check_in") => {
                let ciphertext = decode_cipher_param(q.str("cipher")?)?;
                let user_id = q.i64("user_id")?;
                from_result(s.check_in.check_in(&ciphertext, user_id))
            }
            (Method::POST, "/user/validate") => {
                if s.check_in.validate_hash(q.str("hash")?) {
                    ok(&serde_json::json!({ "valid": true }))
                } else {
                    json_response(StatusCode::IM_A_TEAPOT, &serde_json::json!({ "valid": false }))
                }
            }
            (Method::PUT, "/user/register") => {
                let input: CreateUserInput = parse_json(body)?;
                created(&serde_json::json!({ "id": s.users.register(input)? }))
            }
            (Method::PUT, "/user/login") => {
                let input: LoginBody = parse_json(body)?;
                ok(&serde_json::json!({ "id": s.users.login(&input.login, &input.password)? }))
            }
            (Method::GET, "/user/properties") => from_result(s.users.get_properties(q.i64("id")?)),
            (Method::PUT, "/user/update_properties") => {
                let input: PropertiesBody = parse_json(body)?;
                from_unit_result(s.users.update_properties(input.id, &input.properties))
            }
            (Method::GET, "/user/checked_in") => from_result(s.users.checked_in_places(q.i64("id")?)),
            (Method::GET, "/user/chrono") => from_result(s.chronology.get_chrono(q.i64("id")?)),
            (Method::GET, "/user/current_route") => from_result(s.progress.current_route(q.i64("id")?)),
            (Method::GET, "/user/place_check_in_flag") => {
                let flag = s.users.place_check_in_flag(q.i64("user_id")?, q.i64("place_id")?)?;
                ok(&serde_json::json!({ "checked_in": flag }))
            }
            (Method::GET, "/user/route_check_in_flag") => {
                from_result(s.progress.route_progress(q.i64("user_id")?, q.i64("route_id")?))
            }

            // Places
            (Method::POST, "/place/create") => {
                let input: CreatePlaceInput = parse_json(body)?;
                from_create_result(s.planning.create_place(input).map(|id| serde_json::json!({ "id": id })))
            }
            (Method::GET, "/place/by_id") => from_result(s.planning.get_place(q.i64("id")?)),
            (Method::GET, "/place/list") => {
                let filter = PlaceFilter {
                    variety: q.opt_str("variety"),
                    name: q.opt_str("name"),
                };
                from_result(s.planning.list_places(&filter, q.page()?))
            }

            // Routes
            (Method::POST, "/route/create") => {
                let input: CreateRouteInput = parse_json(body)?;
                from_create_result(s.planning.create_route(input).map(|id| serde_json::json!({ "id": id })))
            }
            (Method::GET, "/route/by_id") => from_result(s.planning.get_route(q.i64("id")?)),
            (Method::GET, "/route/by_page") => from_result(s.planning.list_routes(q.page()?)),

            // Trips
            (Method::POST, "/trip/create") => {
                let input: CreateTripInput = parse_json(body)?;
                from_create_result(s.planning.create_trip(input).map(|id| serde_json::json!({ "id": id })))
            }
            (Method::GET, "/trip/by_id") => from_result(s.planning.get_trip(q.i64("id")?)),
            (Method::GET, "/trip/by_user_id") => from_result(s.planning.trips_by_user(q.i64("id")?)),
            (Method::PUT, p) if p.starts_with("/trip/") => self.update_trip_entry(p, body)?,
            (Method::DELETE, p) if p.starts_with("/trip/") => {
                let kind = p
                    .strip_prefix("/trip/")
                    .and_then(entry_kind)
                    .ok_or_else(|| TripError::NotFound(format!("no route {}", p)))?;
                from_unit_result(s.planning.remove_entry(kind, q.i64("trip_id")?, q.i64("id")?))
            }

            // Favourites
            (Method::POST, "/favourite/like_place") => {
                let input: LikeBody = parse_json(body)?;
                from_unit_result(s.feedback.like(LikeTarget::Place, input.user_id, input.id))
            }
            (Method::POST, "/favourite/like_route") => {
                let input: LikeBody = parse_json(body)?;
                from_unit_result(s.feedback.like(LikeTarget::Route, input.user_id, input.id))
            }
            (Method::DELETE, "/favourite/place") => {
                from_unit_result(s.feedback.unlike(LikeTarget::Place, q.i64("user_id")?, q.i64("id")?))
            }
            (Method::DELETE, "/favourite/route") => {
                from_unit_result(s.feedback.unlike(LikeTarget::Route, q.i64("user_id")?, q.i64("id")?))
            }
            (Method::GET, "/favourite/by_user_id") => {
                let liked = s.feedback.liked_by_user(q.i64("id")?)?;
                ok(&serde_json::json!({
                    "place_ids": liked.place_ids(),
                    "route_ids": liked.route_ids(),
                }))
            }

            // Reviews
            (Method::POST, "/review/create_on_place") => {
                let input: CreateReviewInput = parse_json(body)?;
                from_create_result(
                    s.feedback
                        .create_review(ReviewTarget::Place, input)
                        .map(|id| serde_json::json!({ "id": id })),
                )
            }
            (Method::POST, "/review/create_on_route") => {
                let input: CreateReviewInput = parse_json(body)?;
                from_create_result(
                    s.feedback
                        .create_review(ReviewTarget::Route, input)
                        .map(|id| serde_json::json!({ "id": id })),
                )
            }
            (Method::GET, "/review/author") => from_result(s.feedback.reviews_by_author(q.i64("id")?)),
            (Method::GET, "/review/place") => {
                from_result(s.feedback.reviews_by_entity(ReviewTarget::Place, q.i64("id")?))
            }
            (Method::GET, "/review/route") => {
                from_result(s.feedback.reviews_by_entity(ReviewTarget::Route, q.i64("id")?))
            }
            (Method::PUT, "/review/update_on_place") => {
                let input: UpdateReviewInput = parse_json(body)?;
                from_unit_result(s.feedback.update_review(ReviewTarget::Place, input))
            }
            (Method::PUT, "/review/update_on_route") => {
                let input: UpdateReviewInput = parse_json(body)?;
                from_unit_result(s.feedback.update_review(ReviewTarget::Route, input))
            }

            (_, p) if is_known_path(p) => method_not_allowed(),
            _ => not_found("Not Found"),
        };

        Ok(response)
    }

    /// PUT /trip/{place,route}/{add,change/day,change/position}
    fn update_trip_entry(&self, path: &str, body: &Bytes) -> HandlerResult {
        let rest = path.strip_prefix("/trip/").unwrap_or("");
        let (segment, action) = rest.split_once('/').unwrap_or((rest, ""));
        let kind = entry_kind(segment).ok_or_else(|| TripError::NotFound(format!("no route {}", path)))?;
        let planning = &self.services.planning;

        let result = match action {
            "add" => {
                let input: AddEntryBody = parse_json(body)?;
                planning.add_entry(kind, input.trip_id, input.entry)
            }
            "change/day" => {
                let input: ChangeDayBody = parse_json(body)?;
                planning.change_day(kind, input.trip_id, input.id, input.day)
            }
            "change/position" => {
                let input: ChangePositionBody = parse_json(body)?;
                planning.change_position(kind, input.trip_id, input.id, input.position)
            }
            _ => return Err(TripError::NotFound(format!("no route {}", path))),
        };

        Ok(from_unit_result(result))
    }
}

/// Every fixed path the router serves under some method
const KNOWN_PATHS: &[&str] = &[
    "/health",
    "/user/check_in",
    "/user/validate",
    "/user/register",
    "/user/login",
    "/user/properties",
    "/user/update_properties",
    "/user/checked_in",
    "/user/chrono",
    "/user/current_route",
    "/user/place_check_in_flag",
    "/user/route_check_in_flag",
    "/place/create",
    "/place/by_id",
    "/place/list",
    "/route/create",
    "/route/by_id",
    "/route/by_page",
    "/trip/create",
    "/trip/by_id",
    "/trip/by_user_id",
    "/favourite/like_place",
    "/favourite/like_route",
    "/favourite/place",
    "/favourite/route",
    "/favourite/by_user_id",
    "/review/create_on_place",
    "/review/create_on_route",
    "/review/author",
    "/review/place",
    "/review/route",
    "/review/update_on_place",
    "/review/update_on_route",
];

/// `/trip/{place,route}` and `/trip/{place,route}/{add,change/day,change/position}`
fn is_trip_entry_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix("/trip/") else {
        return false;
    };
    let (segment, action) = rest.split_once('/').unwrap_or((rest, ""));
    entry_kind(segment).is_some() && matches!(action, "" | "add" | "change/day" | "change/position")
}

/// Paths that exist under some method; anything else is 404
fn is_known_path(path: &str) -> bool {
    KNOWN_PATHS.contains(&path) || is_trip_entry_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_param_accepts_padded_and_unpadded() {
        let bytes = vec![0xff, 0x00, 0x10, 0x3e];
        let unpadded = encode_cipher_param(&bytes);
        assert!(!unpadded.contains('='));
        assert_eq!(decode_cipher_param(&unpadded).unwrap(), bytes);
        assert_eq!(decode_cipher_param(&URL_SAFE.encode(&bytes)).unwrap(), bytes);
        assert!(matches!(decode_cipher_param("not base64!"), Err(TripError::BadInput(_))));
    }

    #[test]
    fn test_query_parsing() {
        let q = Query::parse(Some("id=7&name=Palace%20Square&page=x"));
        assert_eq!(q.i64("id").unwrap(), 7);
        assert_eq!(q.opt_str("name").as_deref(), Some("Palace Square"));
        assert!(matches!(q.i64("user_id"), Err(TripError::BadInput(_))));
        assert!(q.page().is_err());
        assert_eq!(Query::parse(None).page().unwrap(), 1);
    }

    #[test]
    fn test_known_paths_are_exact() {
        assert!(is_known_path("/user/check_in"));
        assert!(is_known_path("/trip/route"));
        assert!(is_known_path("/trip/place/change/day"));
        assert!(!is_known_path("/user/no_such_endpoint"));
        assert!(!is_known_path("/trip/hotel/add"));
        assert!(!is_known_path("/trip/place/rename"));
        assert!(!is_known_path("/user/"));
    }

    #[test]
    fn test_add_entry_body_flattens_schedule() {
        let body: AddEntryBody =
            serde_json::from_str(r#"{"trip_id": 1, "id": 5, "day": 2, "position": 3}"#).unwrap();
        assert_eq!(body.entry, ScheduledEntity { entity_id: 5, day: 2, position: 3 });
    }
}
