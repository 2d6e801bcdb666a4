//! JSON responses for the HTTP router
//!
//! Status codes are chosen from [`ErrorKind`], never from message text.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use crate::error::{ErrorKind, TripError};

fn respond(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp
}

fn error_body(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Serialize `body` as JSON under `status`
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut resp = respond(status, Bytes::from(json));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    resp
}

pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// 204 with an empty body, for writes that return nothing
pub fn no_content() -> Response<Full<Bytes>> {
    respond(StatusCode::NO_CONTENT, Bytes::new())
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &error_body(message))
}

/// Known path, wrong method
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(StatusCode::METHOD_NOT_ALLOWED, &error_body("Method not allowed"))
}

/// Status code for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"error": ...}` with the status of the error's kind; 5xx are logged
pub fn error_response(error: TripError) -> Response<Full<Bytes>> {
    let status = status_for(error.kind());
    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    }
    json_response(status, &error_body(&error.to_string()))
}

/// Router return type; `Err` is rendered with [`error_response`]
pub type HandlerResult = Result<Response<Full<Bytes>>, TripError>;

/// 200 with the value, or the error response
pub fn from_result<T: Serialize>(result: Result<T, TripError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// 201 with the value, or the error response
pub fn from_create_result<T: Serialize>(result: Result<T, TripError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// 204, or the error response
pub fn from_unit_result(result: Result<(), TripError>) -> Response<Full<Bytes>> {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}
