//! Runtime schedule control

use axum::{extract::State, response::Response, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::errors::AppError;
use crate::web::{
    responses::{handle_error, ok},
    AppState,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleUpdate {
    pub enabled: Option<bool>,
    /// Human readable interval such as `12h` or `90m`
    pub interval: Option<String>,
}

pub async fn get_schedule(State(state): State<AppState>) -> Response {
    ok(state.scheduler.status(Utc::now()).await)
}

/// Apply an enable flag and/or interval change, answering with the new status
pub async fn update_schedule(
    State(state): State<AppState>,
    Json(update): Json<ScheduleUpdate>,
) -> Response {
    if let Some(interval) = update.interval.as_deref() {
        let parsed = match humantime::parse_duration(interval.trim()) {
            Ok(parsed) => parsed,
            Err(e) => {
                return handle_error(AppError::configuration(format!(
                    "Invalid interval '{interval}': {e}"
                )))
            }
        };
        if let Err(e) = state.scheduler.set_interval(parsed).await {
            return handle_error(e);
        }
    }

    if let Some(enabled) = update.enabled {
        state.scheduler.set_enabled(enabled).await;
    }

    ok(state.scheduler.status(Utc::now()).await)
}
