//! Admin settings endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;

use super::{error_response, success_response};
use crate::settings::{AdminSettings, SettingsUpdate};
use crate::types::StatsError;

pub fn get_settings(settings: &AdminSettings) -> Response<Full<Bytes>> {
    success_response(settings.view())
}

/// Apply a JSON update. An empty body changes nothing.
pub fn update_settings(settings: &AdminSettings, body: &[u8]) -> Response<Full<Bytes>> {
    let update = if body.iter().all(u8::is_ascii_whitespace) {
        SettingsUpdate::default()
    } else {
        match serde_json::from_slice::<SettingsUpdate>(body) {
            Ok(update) => update,
            Err(e) => {
                return error_response(&StatsError::BadRequest(format!(
                    "Invalid settings body: {}",
                    e
                )))
            }
        }
    };

    success_response(settings.apply(update))
}
