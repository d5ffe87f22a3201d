//! Centralized error handling for the EPG harvester
//!
//! Errors are split in two layers:
//!
//! - **Fetch Errors**: everything a single guide source can report while
//!   validating its configuration or downloading one time window. These
//!   carry the retry taxonomy used by the chunked fetcher.
//! - **Application Errors**: refresh-level failures (no data, publish
//!   failures, a refresh already in progress) plus configuration and I/O.
//!
//! # Usage
//!
//! ```rust
//! use epg_harvester::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("no sources configured"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for source fetch Results
pub type FetchResult<T> = Result<T, FetchError>;
