//! HTTP response types and utilities

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::ingestor::RefreshAcceptance;
use crate::models::{RefreshRecord, SchedulerStatus};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, Json(self)).into_response()
    }
}

/// Convert AppError to appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let status = match &error {
        AppError::Configuration { .. } => StatusCode::BAD_REQUEST,
        AppError::OperationInProgress { .. } => StatusCode::CONFLICT,
        AppError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        AppError::NoData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Publish { .. }
        | AppError::Io(_)
        | AppError::Serialization(_)
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ApiResponse::<()>::error(error.to_string()))).into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// A published document in the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub sources: Vec<String>,
    pub output_dir: String,
    pub merge_sources: bool,
}

/// Body of `GET /` and `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub server: &'static str,
    pub version: &'static str,
    pub time: DateTime<Utc>,
    pub config: ConfigSummary,
    pub scheduler: SchedulerStatus,
    pub last_refresh_record: Option<RefreshRecord>,
    pub files: Vec<FileInfo>,
}

/// Body of `/api/refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub status: String,
    pub message: String,
}

impl RefreshResponse {
    pub fn from_acceptance(acceptance: RefreshAcceptance) -> Self {
        match acceptance {
            RefreshAcceptance::Started => Self {
                status: "refresh_started".to_string(),
                message: "EPG refresh triggered".to_string(),
            },
            RefreshAcceptance::AlreadyRunning => Self {
                status: "already_running".to_string(),
                message: "An EPG refresh is already in progress".to_string(),
            },
        }
    }
}

impl IntoResponse for RefreshResponse {
    fn into_response(self) -> Response {
        let status = if self.status == "refresh_started" {
            StatusCode::ACCEPTED
        } else {
            StatusCode::OK
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_response_codes() {
        let body = RefreshResponse::from_acceptance(RefreshAcceptance::Started);
        assert_eq!(body.status, "refresh_started");
        assert_eq!(body.into_response().status(), StatusCode::ACCEPTED);

        let body = RefreshResponse::from_acceptance(RefreshAcceptance::AlreadyRunning);
        assert_eq!(body.status, "already_running");
        assert_eq!(body.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            handle_error(AppError::configuration("bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            handle_error(AppError::operation_in_progress("refresh", "guide")).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            handle_error(AppError::internal("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
