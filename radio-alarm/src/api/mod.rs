//! HTTP API handlers for radio-alarm
//!
//! Every documented route answers `200` with `{"status": "<message>"}`.
//! Store and player failures are not handled here; they surface as `500`.

pub mod alarm;
pub mod health;
pub mod radio;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Error;

pub use alarm::{alarm_action, set_alarm_time};
pub use health::health_routes;
pub use radio::radio_action;

/// Reply for actions the service does not know
pub const UNKNOWN_ACTION: &str = "not sure what to do with this";

/// Body of every control response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: status.into(),
        })
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusResponse::new(format!("error: {}", self)),
        )
            .into_response()
    }
}
