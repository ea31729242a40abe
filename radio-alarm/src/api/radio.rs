//! Radio endpoint
//!
//! `radio/playing` records the last requested state so playback resumes
//! after a restart; it is written even when the action was a no-op.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use super::{StatusResponse, UNKNOWN_ACTION};
use crate::{AppState, Result};

/// GET /radio/:action
///
/// `start`, `stop` or `status`; anything else gets a soft reply.
pub async fn radio_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<StatusResponse>> {
    let status = match action.as_str() {
        "start" => {
            let started = state.player.start().await?;
            state.store.set("radio/playing", true)?;
            if started {
                info!("Radio started on request");
                "ok let's start this"
            } else {
                "already started"
            }
        }
        "stop" => {
            let stopped = state.player.stop().await?;
            state.store.set("radio/playing", false)?;
            if stopped {
                info!("Radio stopped on request");
                "ok let's stop this"
            } else {
                "already stopped"
            }
        }
        "status" => {
            if state.player.is_playing().await {
                "started"
            } else {
                "stopped"
            }
        }
        _ => UNKNOWN_ACTION,
    };

    Ok(StatusResponse::new(status))
}
