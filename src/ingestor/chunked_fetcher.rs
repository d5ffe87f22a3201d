//! Windowed, retrying fetch over a guide source
//!
//! The requested span is cut into `ceil(total / chunk)` consecutive windows
//! anchored at the fetch start. Windows are requested one after another;
//! transient failures (network, 429, 5xx) are retried with capped
//! exponential backoff plus jitter, anything else aborts the whole fetch and
//! no later window is requested. Successful windows fold into one fragment
//! where the first channel record per id wins.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::errors::{FetchError, FetchResult};
use crate::models::GuideFragment;
use crate::observability::{GuideEvent, SharedEventSink};
use crate::sources::traits::{FetchWindow, GuideSource};
use crate::utils::jitter::generate_jitter;

const COMPONENT: &str = "fetcher";

/// Backoff settings for retrying one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Cap applied before jitter
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// `min(max_delay, base_delay * 2^(retry - 1))` for a 1-based retry number
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus uniform jitter in `[0, max_jitter]`
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff(retry) + generate_jitter(self.max_jitter)
    }

    /// Jittered delay for `retry`, never shorter than the `previous` delay of the same window
    pub fn next_delay(&self, retry: u32, previous: Duration) -> Duration {
        self.delay_for(retry).max(previous)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub total_hours: u32,
    /// Pause between consecutive windows (not after the last)
    pub inter_chunk_delay: Duration,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            total_hours: config.timespan_hours,
            inter_chunk_delay: config.inter_chunk_delay,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_base_delay,
                max_delay: config.retry_max_delay,
                max_jitter: config.retry_max_jitter,
            },
        }
    }
}

/// Counters for one fetch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub windows: usize,
    pub attempts: usize,
    pub retries: usize,
}

/// Split `total_hours` into consecutive windows of `chunk_hours` starting at `anchor`
pub fn plan_windows(anchor: DateTime<Utc>, total_hours: u32, chunk_hours: Option<u32>) -> Vec<FetchWindow> {
    if total_hours == 0 {
        return Vec::new();
    }
    let chunk = chunk_hours.filter(|c| *c > 0).unwrap_or(total_hours);
    let total = total_hours.div_ceil(chunk) as usize;

    (0..total)
        .map(|index| FetchWindow {
            index,
            total,
            start: anchor + ChronoDuration::hours(i64::from(chunk) * index as i64),
            hours: chunk,
        })
        .collect()
}

pub struct ChunkedFetcher {
    sink: SharedEventSink,
}

impl ChunkedFetcher {
    pub fn new(sink: SharedEventSink) -> Self {
        Self { sink }
    }

    pub async fn fetch(&self, source: &dyn GuideSource, options: &FetchOptions) -> FetchResult<GuideFragment> {
        self.fetch_at(source, options, Utc::now())
            .await
            .map(|(fragment, _)| fragment)
    }

    /// Fetch with an explicit anchor, returning run counters alongside the fragment
    pub async fn fetch_at(
        &self,
        source: &dyn GuideSource,
        options: &FetchOptions,
        anchor: DateTime<Utc>,
    ) -> FetchResult<(GuideFragment, FetchReport)> {
        let name = source.name().to_string();

        if let Err(e) = source.validate() {
            self.sink.emit(
                GuideEvent::error(COMPONENT, "Source configuration rejected")
                    .with("source", &name)
                    .with("error", &e),
            );
            return Err(e);
        }

        let windows = plan_windows(anchor, options.total_hours, source.chunk_hours());
        if windows.is_empty() {
            return Err(FetchError::configuration("timespan_hours", "must be greater than zero"));
        }

        source.prepare().await?;

        self.sink.emit(
            GuideEvent::info(COMPONENT, "Starting fetch")
                .with("source", &name)
                .with("windows", windows.len())
                .with("total_hours", options.total_hours),
        );

        let mut fragment = GuideFragment::new();
        let mut report = FetchReport::default();
        let max_attempts = options.retry.max_retries + 1;

        for window in &windows {
            let mut attempt = 0u32;
            let mut last_delay = Duration::ZERO;
            loop {
                attempt += 1;
                report.attempts += 1;
                self.sink.emit(
                    GuideEvent::debug(COMPONENT, "Requesting window")
                        .with("source", &name)
                        .with("window", window)
                        .with("attempt", format!("{attempt}/{max_attempts}")),
                );

                match source.fetch_window(window).await {
                    Ok(part) => {
                        self.sink.emit(
                            GuideEvent::debug(COMPONENT, "Window complete")
                                .with("source", &name)
                                .with("window", window)
                                .with("channels", part.channel_count())
                                .with("programs", part.program_count()),
                        );
                        fragment.absorb(part);
                        report.windows += 1;
                        break;
                    }
                    Err(e) if e.is_transient() && attempt <= options.retry.max_retries => {
                        let delay = options.retry.next_delay(attempt, last_delay);
                        last_delay = delay;
                        report.retries += 1;
                        self.sink.emit(
                            GuideEvent::warn(COMPONENT, "Retrying window")
                                .with("source", &name)
                                .with("window", window)
                                .with("attempt", attempt)
                                .with("delay_ms", delay.as_millis())
                                .with("error", &e),
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        self.sink.emit(
                            GuideEvent::error(COMPONENT, "Window failed")
                                .with("source", &name)
                                .with("window", window)
                                .with("attempt", attempt)
                                .with("category", e.category().as_str())
                                .with("error", &e),
                        );
                        return Err(e);
                    }
                }
            }

            if !window.is_last() && !options.inter_chunk_delay.is_zero() {
                tokio::time::sleep(options.inter_chunk_delay).await;
            }
        }

        if fragment.is_empty() {
            self.sink.emit(GuideEvent::warn(COMPONENT, "No channels found").with("source", &name));
            return Err(FetchError::NoData);
        }

        self.sink.emit(
            GuideEvent::info(COMPONENT, "Fetch complete")
                .with("source", &name)
                .with("channels", fragment.channel_count())
                .with("programs", fragment.program_count())
                .with("attempts", report.attempts)
                .with("retries", report.retries),
        );
        Ok((fragment, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, ProgramEntry};
    use crate::observability::CollectingSink;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays scripted results and records which windows were requested
    struct ScriptedSource {
        chunk: Option<u32>,
        script: Mutex<VecDeque<FetchResult<()>>>,
        requested: Mutex<Vec<usize>>,
        invalid: bool,
    }

    impl ScriptedSource {
        fn new(chunk: Option<u32>, script: Vec<FetchResult<()>>) -> Self {
            Self {
                chunk,
                script: Mutex::new(script.into()),
                requested: Mutex::new(Vec::new()),
                invalid: false,
            }
        }

        fn requested(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GuideSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn validate(&self) -> FetchResult<()> {
            if self.invalid {
                Err(FetchError::configuration("postal_code", "missing"))
            } else {
                Ok(())
            }
        }

        fn chunk_hours(&self) -> Option<u32> {
            self.chunk
        }

        async fn fetch_window(&self, window: &FetchWindow) -> FetchResult<GuideFragment> {
            self.requested.lock().unwrap().push(window.index);
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
            next?;

            let mut fragment = GuideFragment::new();
            let id = format!("ch{}", window.index % 2);
            fragment.insert_channel(Channel::new(id.clone()).with_display_name(format!("W{}", window.index)));
            fragment.push_program(ProgramEntry::new(id, window.start, window.end(), "Show"));
            Ok(fragment)
        }
    }

    fn fast_options(total_hours: u32) -> FetchOptions {
        FetchOptions {
            total_hours,
            inter_chunk_delay: Duration::ZERO,
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                max_jitter: Duration::ZERO,
            },
        }
    }

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_plan_windows_counts() {
        assert_eq!(plan_windows(anchor(), 72, Some(6)).len(), 12);
        assert_eq!(plan_windows(anchor(), 7, Some(6)).len(), 2);
        assert_eq!(plan_windows(anchor(), 3, Some(6)).len(), 1);
        assert_eq!(plan_windows(anchor(), 72, None).len(), 1);
        assert!(plan_windows(anchor(), 0, Some(6)).is_empty());

        let windows = plan_windows(anchor(), 12, Some(6));
        assert_eq!(windows[1].start, anchor() + ChronoDuration::hours(6));
        assert_eq!(windows[1].hours, 6);
        assert!(windows[1].is_last());
    }

    #[test]
    fn test_backoff_is_capped_exponential() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::ZERO,
        };
        let delays: Vec<u64> = (1..=7).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(200), Duration::from_secs(30));
    }

    #[test]
    fn test_jittered_delays_never_shrink() {
        // jitter wider than the base delay and enough retries to sit at the cap
        let policy = RetryPolicy {
            max_retries: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_secs(2),
        };
        for _ in 0..200 {
            let mut previous = Duration::ZERO;
            for retry in 1..=policy.max_retries {
                let delay = policy.next_delay(retry, previous);
                assert!(delay >= previous, "retry {retry}: {delay:?} < {previous:?}");
                assert!(delay >= policy.backoff(retry));
                assert!(delay <= policy.max_delay + policy.max_jitter);
                previous = delay;
            }
        }
    }

    #[tokio::test]
    async fn test_requests_one_call_per_window() {
        let sink = CollectingSink::new();
        let fetcher = ChunkedFetcher::new(sink.clone());
        let source = ScriptedSource::new(Some(6), vec![]);

        let (fragment, report) = fetcher.fetch_at(&source, &fast_options(24), anchor()).await.unwrap();

        assert_eq!(source.requested(), vec![0, 1, 2, 3]);
        assert_eq!(report.windows, 4);
        assert_eq!(report.retries, 0);
        assert_eq!(fragment.channel_count(), 2);
        assert_eq!(fragment.program_count(), 4);
        // first record per channel id wins
        assert_eq!(fragment.channel("ch1").unwrap().preferred_name(), "W1");
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let sink = CollectingSink::new();
        let fetcher = ChunkedFetcher::new(sink.clone());
        let source = ScriptedSource::new(
            None,
            vec![
                Err(FetchError::ServerError { status: 500 }),
                Err(FetchError::ServerError { status: 500 }),
                Ok(()),
            ],
        );

        let (_, report) = fetcher.fetch_at(&source, &fast_options(72), anchor()).await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.retries, 2);
        assert_eq!(source.requested(), vec![0, 0, 0]);

        let delays: Vec<u64> = sink
            .events_for(COMPONENT)
            .iter()
            .filter(|e| e.message == "Retrying window")
            .filter_map(|e| e.get("delay_ms").and_then(|d| d.parse().ok()))
            .collect();
        assert_eq!(delays.len(), 2);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_retry_delays_with_jitter_are_non_decreasing() {
        let sink = CollectingSink::new();
        let fetcher = ChunkedFetcher::new(sink.clone());
        let failures = (0..6)
            .map(|_| Err(FetchError::ServerError { status: 503 }))
            .collect();
        let source = ScriptedSource::new(None, failures);

        let mut options = fast_options(72);
        options.retry.max_retries = 6;
        options.retry.max_jitter = Duration::from_millis(5);

        let (_, report) = fetcher.fetch_at(&source, &options, anchor()).await.unwrap();
        assert_eq!(report.retries, 6);

        let delays: Vec<u64> = sink
            .events_for(COMPONENT)
            .iter()
            .filter(|e| e.message == "Retrying window")
            .filter_map(|e| e.get("delay_ms").and_then(|d| d.parse().ok()))
            .collect();
        assert_eq!(delays.len(), 6);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_stops_fetch() {
        let sink = CollectingSink::new();
        let fetcher = ChunkedFetcher::new(sink.clone());
        let source = ScriptedSource::new(
            Some(6),
            vec![
                Ok(()),
                Err(FetchError::RateLimited),
                Err(FetchError::RateLimited),
                Err(FetchError::RateLimited),
                Err(FetchError::RateLimited),
            ],
        );

        let err = fetcher.fetch_at(&source, &fast_options(18), anchor()).await.unwrap_err();
        assert_eq!(err, FetchError::RateLimited);
        assert!(err.is_transient());
        // window 0 once, window 1 four times, window 2 never
        assert_eq!(source.requested(), vec![0, 1, 1, 1, 1]);
        assert_eq!(sink.count_matching(COMPONENT, "Window failed"), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let fetcher = ChunkedFetcher::new(CollectingSink::new());
        let source = ScriptedSource::new(Some(6), vec![Err(FetchError::ClientError { status: 403 })]);

        let err = fetcher.fetch_at(&source, &fast_options(12), anchor()).await.unwrap_err();
        assert_eq!(err, FetchError::ClientError { status: 403 });
        assert_eq!(source.requested(), vec![0]);
    }

    #[tokio::test]
    async fn test_configuration_error_before_any_request() {
        let fetcher = ChunkedFetcher::new(CollectingSink::new());
        let mut source = ScriptedSource::new(Some(6), vec![]);
        source.invalid = true;

        let err = fetcher.fetch(&source, &fast_options(12)).await.unwrap_err();
        assert!(matches!(err, FetchError::Configuration { .. }));
        assert!(source.requested().is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_is_no_data() {
        struct Empty;

        #[async_trait]
        impl GuideSource for Empty {
            fn name(&self) -> &str {
                "empty"
            }

            async fn fetch_window(&self, _window: &FetchWindow) -> FetchResult<GuideFragment> {
                Ok(GuideFragment::new())
            }
        }

        let fetcher = ChunkedFetcher::new(Arc::new(crate::observability::TracingSink));
        let err = fetcher.fetch(&Empty, &fast_options(6)).await.unwrap_err();
        assert_eq!(err, FetchError::NoData);
    }

    #[tokio::test]
    async fn test_inter_chunk_delay_only_between_windows() {
        let fetcher = ChunkedFetcher::new(CollectingSink::new());
        let source = ScriptedSource::new(Some(6), vec![]);
        let mut options = fast_options(12);
        options.inter_chunk_delay = Duration::from_millis(30);

        let started = std::time::Instant::now();
        fetcher.fetch_at(&source, &options, anchor()).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(60 + 500));
    }
}
