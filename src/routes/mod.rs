//! HTTP routes for tally
//!
//! Every response body is JSON. Successful report calls answer
//! `{"success": true, "data": ...}`; failures answer with a non-2xx status
//! and `{"success": false, "code": ..., "message": ...}`.

pub mod cache;
pub mod health;
pub mod params;
pub mod reports;
pub mod settings;

pub use cache::clear_cache;
pub use health::health_check;
pub use params::QueryParams;
pub use reports::{handle_report, ReportRoute};
pub use settings::{get_settings, update_settings};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::types::StatsError;

/// Namespace all endpoints live under
pub const API_PREFIX: &str = "/stats/v1";

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct ApiError<'a> {
    success: bool,
    code: &'static str,
    message: &'a str,
}

/// Build a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Cache-Control", "no-cache")
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(bytes)))
            .unwrap_or_else(|_| internal_error_response()),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            internal_error_response()
        }
    }
}

/// `{"success": true, "data": ...}`
pub fn success_response<T: Serialize>(data: T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &Envelope { success: true, data })
}

/// Error body with the status mapped from the error
pub fn error_response(err: &StatsError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), "Request failed: {}", err);
    } else {
        warn!(code = err.code(), "Request rejected: {}", err);
    }

    let message = err.to_string();
    json_response(
        status,
        &ApiError {
            success: false,
            code: err.code(),
            message: &message,
        },
    )
}

fn internal_error_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(
        br#"{"success":false,"code":"INTERNAL_ERROR","message":"Internal error"}"#,
    )));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
