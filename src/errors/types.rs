//! Error type definitions for the EPG harvester

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A guide source failed to produce data
    #[error("Source '{source_name}' failed: {error}")]
    Fetch {
        source_name: String,
        #[source]
        error: FetchError,
    },

    /// No source produced a single fragment
    #[error("No guide data was produced: {message}")]
    NoData { message: String },

    /// Writing or replacing a published document failed
    #[error("Publish failed for {path}: {message}")]
    Publish { path: String, message: String },

    /// Operation already in progress errors
    #[error("Operation already in progress: {operation_type} on {resource}")]
    OperationInProgress {
        operation_type: String,
        resource: String,
    },

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors reported by a single guide source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Missing or invalid source configuration, detected before any request
    #[error("Invalid configuration: {field} - {message}")]
    Configuration { field: String, message: String },

    /// Connection failures and timeouts
    #[error("Network error: {message}")]
    Network { message: String },

    /// Upstream answered 429
    #[error("Rate limited by upstream (HTTP 429)")]
    RateLimited,

    /// Upstream answered with a 5xx status
    #[error("Upstream server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Upstream answered with a non-retryable status
    #[error("Upstream rejected request: HTTP {status}")]
    ClientError { status: u16 },

    /// The body could not be parsed into guide data
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Every window succeeded but no channels were found
    #[error("No channels found")]
    NoData,
}

/// Coarse classification used in logs and refresh records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorCategory {
    Configuration,
    TransientUpstream,
    PermanentUpstream,
    NoData,
}

impl FetchErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorCategory::Configuration => "configuration",
            FetchErrorCategory::TransientUpstream => "transient_upstream",
            FetchErrorCategory::PermanentUpstream => "permanent_upstream",
            FetchErrorCategory::NoData => "no_data",
        }
    }
}

impl FetchError {
    pub fn configuration<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Map an HTTP status to the matching upstream error
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::ServerError { status },
            _ => Self::ClientError { status },
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::RateLimited | Self::ServerError { .. }
        )
    }

    pub fn category(&self) -> FetchErrorCategory {
        match self {
            Self::Configuration { .. } => FetchErrorCategory::Configuration,
            Self::Network { .. } | Self::RateLimited | Self::ServerError { .. } => {
                FetchErrorCategory::TransientUpstream
            }
            Self::ClientError { .. } | Self::InvalidResponse { .. } => {
                FetchErrorCategory::PermanentUpstream
            }
            Self::NoData => FetchErrorCategory::NoData,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16());
        }
        if err.is_decode() {
            return Self::invalid_response(err.to_string());
        }
        Self::network(err.to_string())
    }
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn fetch<S: Into<String>>(source_name: S, error: FetchError) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            error,
        }
    }

    pub fn no_data<S: Into<String>>(message: S) -> Self {
        Self::NoData {
            message: message.into(),
        }
    }

    pub fn publish<P: Into<String>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Publish {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an operation in progress error
    pub fn operation_in_progress<T: Into<String>, R: Into<String>>(
        operation_type: T,
        resource: R,
    ) -> Self {
        Self::OperationInProgress {
            operation_type: operation_type.into(),
            resource: resource.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(FetchError::from_status(429), FetchError::RateLimited);
        assert_eq!(
            FetchError::from_status(503),
            FetchError::ServerError { status: 503 }
        );
        assert_eq!(
            FetchError::from_status(404),
            FetchError::ClientError { status: 404 }
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(FetchError::RateLimited.is_transient());
        assert!(FetchError::ServerError { status: 500 }.is_transient());
        assert!(FetchError::network("reset").is_transient());

        assert!(!FetchError::ClientError { status: 403 }.is_transient());
        assert!(!FetchError::invalid_response("bad json").is_transient());
        assert!(!FetchError::configuration("postal_code", "missing").is_transient());
        assert!(!FetchError::NoData.is_transient());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            FetchError::configuration("lineup_id", "empty").category().as_str(),
            "configuration"
        );
        assert_eq!(
            FetchError::RateLimited.category(),
            FetchErrorCategory::TransientUpstream
        );
        assert_eq!(
            FetchError::ClientError { status: 400 }.category(),
            FetchErrorCategory::PermanentUpstream
        );
        assert_eq!(FetchError::NoData.category().as_str(), "no_data");
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::fetch("zap2it", FetchError::RateLimited);
        assert_eq!(
            err.to_string(),
            "Source 'zap2it' failed: Rate limited by upstream (HTTP 429)"
        );
        let err = AppError::operation_in_progress("refresh", "guide");
        assert!(err.to_string().contains("already in progress"));
    }
}
