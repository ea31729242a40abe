//! # radio-alarm
//!
//! Home-automation control service: an HTTP API to start/stop an internet
//! radio stream and to arm/disarm a wake alarm, with state persisted across
//! restarts.
//!
//! **Architecture:** one `ConfigStore` and one `PlayerController` are built
//! at startup and shared through `AppState` by the HTTP handlers and the
//! `AlarmScheduler` background task.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod player;
pub mod scheduler;
pub mod store;

pub use error::{Error, Result};
pub use player::PlayerController;
pub use store::ConfigStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Persisted alarm/radio document
    pub store: Arc<ConfigStore>,
    /// The single player process owner
    pub player: Arc<PlayerController>,
}

impl AppState {
    pub fn new(store: Arc<ConfigStore>, player: Arc<PlayerController>) -> Self {
        Self { store, player }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/radio/:action", get(api::radio_action))
        .route("/alarm/time/:time", get(api::set_alarm_time))
        .route("/alarm/:action", get(api::alarm_action))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
