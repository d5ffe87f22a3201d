use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ScheduleConfig;
use crate::errors::{AppError, AppResult};
use crate::ingestor::state_manager::RefreshStateManager;
use crate::models::{RefreshTrigger, SchedulerStatus};
use crate::pipeline::orchestrator::{RefreshGuard, RefreshOrchestrator};

/// Answer to a manual refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshAcceptance {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone)]
struct ScheduleSettings {
    enabled: bool,
    interval: Duration,
    tick: Duration,
    failure_backoff: Duration,
    stop_timeout: Duration,
}

impl From<&ScheduleConfig> for ScheduleSettings {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: config.interval,
            tick: config.tick,
            failure_backoff: config.failure_backoff,
            stop_timeout: config.stop_timeout,
        }
    }
}

/// Shared between the scheduler handle and its background task
struct SchedulerCore {
    orchestrator: Arc<RefreshOrchestrator>,
    settings: RwLock<ScheduleSettings>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic refresh driver
///
/// A single background task wakes every `tick`, and when a refresh is due
/// and none is in flight, spawns one. Manual refreshes go through
/// [`RefreshScheduler::refresh_now`] and share the same refresh lock.
pub struct RefreshScheduler {
    core: Arc<SchedulerCore>,
    task: Mutex<Option<RunningTask>>,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, config: &ScheduleConfig) -> Self {
        Self {
            core: Arc::new(SchedulerCore {
                orchestrator,
                settings: RwLock::new(ScheduleSettings::from(config)),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> &Arc<RefreshOrchestrator> {
        &self.core.orchestrator
    }

    pub fn state(&self) -> &RefreshStateManager {
        self.core.orchestrator.state()
    }

    /// Start the background task. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                warn!("Scheduler already running");
                return false;
            }
        }

        let tick = self.core.settings.read().await.tick;
        let cancel = CancellationToken::new();
        let core = self.core.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { core.run(tick, token).await });

        *task = Some(RunningTask { cancel, handle });
        info!("Scheduler started (tick {:?})", tick);
        true
    }

    /// Stop the background task, waiting at most `stop_timeout` for it to exit.
    ///
    /// A refresh already in flight keeps running to completion.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.task.lock().await.take() else {
            debug!("Scheduler not running");
            return false;
        };

        running.cancel.cancel();
        let timeout = self.core.settings.read().await.stop_timeout;
        match tokio::time::timeout(timeout, running.handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => error!("Scheduler task ended abnormally: {}", e),
            Err(_) => warn!("Scheduler task did not stop within {:?}", timeout),
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Trigger a refresh without waiting for it to finish
    pub async fn refresh_now(&self) -> RefreshAcceptance {
        self.trigger(RefreshTrigger::Manual).await
    }

    pub async fn trigger(&self, trigger: RefreshTrigger) -> RefreshAcceptance {
        match self.core.orchestrator.try_begin() {
            Some(guard) => {
                self.core.spawn_refresh(guard, trigger).await;
                RefreshAcceptance::Started
            }
            None => {
                info!("Refresh requested ({}) while another is in flight", trigger);
                RefreshAcceptance::AlreadyRunning
            }
        }
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.core.settings.write().await.enabled = enabled;
        info!("Automatic refresh {}", if enabled { "enabled" } else { "disabled" });
    }

    pub async fn set_interval(&self, interval: Duration) -> AppResult<()> {
        if interval.is_zero() {
            return Err(AppError::configuration("Refresh interval must be greater than zero"));
        }
        self.core.settings.write().await.interval = interval;
        info!("Refresh interval set to {}", humantime::format_duration(interval));
        Ok(())
    }

    pub async fn should_refresh(&self, now: DateTime<Utc>) -> bool {
        self.core.should_refresh(now).await
    }

    pub async fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.core.is_due(now).await
    }

    pub async fn next_refresh_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.core.next_refresh_time(now).await
    }

    /// Snapshot for the status endpoint; never touches the refresh lock
    pub async fn status(&self, now: DateTime<Utc>) -> SchedulerStatus {
        let settings = self.core.settings.read().await.clone();
        let state = self.state().snapshot().await;
        SchedulerStatus {
            running: self.is_running().await,
            enabled: settings.enabled,
            interval: settings.interval,
            interval_hours: settings.interval.as_secs_f64() / 3600.0,
            refreshing: state.refreshing,
            last_refresh: state.last_refresh,
            last_attempt: state.last_attempt,
            next_refresh: self.core.next_refresh_time(now).await,
        }
    }
}

impl SchedulerCore {
    async fn run(self: Arc<Self>, tick: Duration, cancel: CancellationToken) {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Scheduler loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    trace!("Scheduler tick");
                    self.on_tick(Utc::now()).await;
                }
            }
        }
    }

    async fn on_tick(&self, now: DateTime<Utc>) {
        if !self.is_due(now).await {
            return;
        }
        match self.orchestrator.try_begin() {
            Some(guard) => {
                info!("Scheduled refresh is due");
                self.spawn_refresh(guard, RefreshTrigger::Scheduled).await;
            }
            None => trace!("Refresh due but one is already in flight, skipping tick"),
        }
    }

    /// Mark the attempt before spawning so status reflects it immediately
    async fn spawn_refresh(&self, guard: RefreshGuard, trigger: RefreshTrigger) {
        self.orchestrator.state().begin_attempt(Utc::now()).await;
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let record = orchestrator.run_with_guard(guard, trigger).await;
            if !record.success {
                warn!("{} refresh failed: {}", trigger, record.message);
            }
        });
    }

    async fn should_refresh(&self, now: DateTime<Utc>) -> bool {
        let settings = self.settings.read().await;
        if !settings.enabled {
            return false;
        }
        match self.orchestrator.state().last_refresh().await {
            None => true,
            Some(last) => now >= last + to_chrono(settings.interval),
        }
    }

    async fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.should_refresh(now).await {
            return false;
        }
        let backoff = self.settings.read().await.failure_backoff;
        let state = self.orchestrator.state().snapshot().await;
        if state.refreshing {
            return false;
        }
        match (state.last_attempt_failed, state.last_attempt) {
            (true, Some(attempt)) => now >= attempt + to_chrono(backoff),
            _ => true,
        }
    }

    async fn next_refresh_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            return None;
        }
        let state = self.orchestrator.state().snapshot().await;
        let mut next = match state.last_refresh {
            None => now,
            Some(last) => last + to_chrono(settings.interval),
        };
        if let (true, Some(attempt)) = (state.last_attempt_failed, state.last_attempt) {
            next = next.max(attempt + to_chrono(settings.failure_backoff));
        }
        Some(next.max(now))
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(36_500))
}
