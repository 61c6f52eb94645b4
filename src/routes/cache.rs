//! Cache maintenance endpoint

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::info;

use super::json_response;
use crate::engine::ReportQueryEngine;

#[derive(Serialize)]
struct ClearResponse {
    success: bool,
    message: &'static str,
    /// Entries dropped by this clear
    removed: usize,
}

/// Drop every cached report result
pub fn clear_cache(engine: &ReportQueryEngine) -> Response<Full<Bytes>> {
    let removed = engine.clear_cache();
    info!(removed, "Report cache cleared on request");

    json_response(
        StatusCode::OK,
        &ClearResponse {
            success: true,
            message: "Cache cleared successfully!",
            removed,
        },
    )
}
