//! Liveness endpoint

use axum::Json;

use crate::web::responses::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
