//! Manual refresh trigger

use axum::extract::State;
use tracing::info;

use crate::web::{responses::RefreshResponse, AppState};

/// Ask the scheduler for a refresh and answer without waiting for it
pub async fn trigger_refresh(State(state): State<AppState>) -> RefreshResponse {
    let acceptance = state.scheduler.refresh_now().await;
    info!("Refresh requested over HTTP: {:?}", acceptance);
    RefreshResponse::from_acceptance(acceptance)
}
