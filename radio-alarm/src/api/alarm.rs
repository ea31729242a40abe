//! Alarm endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use super::{StatusResponse, UNKNOWN_ACTION};
use crate::{AppState, Result};

/// GET /alarm/:action
///
/// `on`, `off` or `status`; anything else gets a soft reply.
pub async fn alarm_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<StatusResponse>> {
    let status = match action.as_str() {
        "on" => {
            let was_on = state.store.replace("alarm/on", true)?.as_bool() == Some(true);
            if was_on {
                "alarm already on".to_string()
            } else {
                info!("Alarm armed");
                "ok, set alarm on".to_string()
            }
        }
        "off" => {
            let was_on = state.store.replace("alarm/on", false)?.as_bool() == Some(true);
            if was_on {
                info!("Alarm disarmed");
                "ok, set alarm off".to_string()
            } else {
                "alarm already off".to_string()
            }
        }
        "status" => {
            let alarm = state.store.alarm()?;
            if alarm.on {
                format!("on at {:02}:{:02}", alarm.hour, alarm.min)
            } else {
                "off".to_string()
            }
        }
        _ => UNKNOWN_ACTION.to_string(),
    };

    Ok(StatusResponse::new(status))
}

/// GET /alarm/time/:time
///
/// `time` is `HH:MM`. Out-of-range values are refused with a message, not
/// an error status.
pub async fn set_alarm_time(
    State(state): State<AppState>,
    Path(time): Path<String>,
) -> Result<Json<StatusResponse>> {
    let Some((hour, min)) = parse_time(&time) else {
        return Ok(StatusResponse::new(UNKNOWN_ACTION));
    };

    let status = match (u32::try_from(hour), u32::try_from(min)) {
        (Ok(hour), Ok(min)) if hour <= 23 && min <= 59 => {
            state.store.set_alarm_time(hour, min)?;
            info!("Alarm time set to {:02}:{:02}", hour, min);
            format!("time set to {:02}:{:02}", hour, min)
        }
        _ => "time not valid".to_string(),
    };

    Ok(StatusResponse::new(status))
}

/// Split `HH:MM` into two integers, signs allowed
fn parse_time(time: &str) -> Option<(i64, i64)> {
    let (hour, min) = time.split_once(':')?;
    Some((hour.trim().parse().ok()?, min.trim().parse().ok()?))
}
