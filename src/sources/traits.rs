//! Guide source trait definitions
//!
//! A guide source knows how to turn one time window into a [`GuideFragment`].
//! Retrying, windowing and pacing are the chunked fetcher's job; a source
//! only performs a single attempt and classifies what went wrong.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;

use crate::errors::FetchResult;
use crate::models::GuideFragment;

/// One contiguous time window requested from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Zero-based position in the run
    pub index: usize,
    /// Number of windows in the run
    pub total: usize,
    pub start: DateTime<Utc>,
    pub hours: u32,
}

impl FetchWindow {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + ChronoDuration::hours(i64::from(self.hours))
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index + 1, self.total)
    }
}

#[async_trait]
pub trait GuideSource: Send + Sync {
    /// Unique name used in logs, records and per-source output files
    fn name(&self) -> &str;

    /// Fail fast on configuration problems before any request is made
    fn validate(&self) -> FetchResult<()> {
        Ok(())
    }

    /// Window size for windowed upstreams; `None` fetches the whole span at once
    fn chunk_hours(&self) -> Option<u32> {
        None
    }

    /// Called once per fetch run after validation, before the first window
    async fn prepare(&self) -> FetchResult<()> {
        Ok(())
    }

    /// Perform one request for one window
    async fn fetch_window(&self, window: &FetchWindow) -> FetchResult<GuideFragment>;
}
