//! Refresh orchestration
//!
//! One refresh fetches every configured source in order, merges the
//! fragments, publishes the XMLTV document(s) and records the outcome. At
//! most one refresh runs at a time: the orchestrator owns the refresh lock
//! and hands out owned guards so a refresh can continue on a spawned task.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::{Config, MergeConfig, OutputConfig};
use crate::errors::{AppError, AppResult};
use crate::ingestor::chunked_fetcher::{ChunkedFetcher, FetchOptions};
use crate::ingestor::state_manager::RefreshStateManager;
use crate::models::{GuideFragment, MergeStats, RefreshRecord, RefreshTrigger, SourceOutcome};
use crate::observability::{GuideEvent, SharedEventSink};
use crate::pipeline::generation::generate_xmltv;
use crate::pipeline::merge::merge;
use crate::pipeline::publish::publish_document;
use crate::sources::{ConfiguredSource, SourceFactory};

const COMPONENT: &str = "orchestrator";

/// Proof that the holder is the only refresh in flight
pub type RefreshGuard = OwnedMutexGuard<()>;

pub struct RefreshOrchestrator {
    output: OutputConfig,
    merge: MergeConfig,
    sources: Vec<ConfiguredSource>,
    fetcher: ChunkedFetcher,
    options: FetchOptions,
    lock: Arc<Mutex<()>>,
    state: RefreshStateManager,
    sink: SharedEventSink,
}

impl RefreshOrchestrator {
    pub fn new(
        config: &Config,
        sources: Vec<ConfiguredSource>,
        state: RefreshStateManager,
        sink: SharedEventSink,
    ) -> Self {
        Self {
            output: config.output.clone(),
            merge: config.merge.clone(),
            sources,
            fetcher: ChunkedFetcher::new(sink.clone()),
            options: FetchOptions::from_config(&config.fetch),
            lock: Arc::new(Mutex::new(())),
            state,
            sink,
        }
    }

    /// Build the orchestrator and every configured source
    pub fn from_config(config: &Config, state: RefreshStateManager, sink: SharedEventSink) -> AppResult<Self> {
        let sources = SourceFactory::create_all(&config.sources, &config.fetch)?;
        Ok(Self::new(config, sources, state, sink))
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &RefreshStateManager {
        &self.state
    }

    /// Take the refresh guard without waiting; `None` when a refresh is in flight
    pub fn try_begin(&self) -> Option<RefreshGuard> {
        self.lock.clone().try_lock_owned().ok()
    }

    /// Run a refresh, waiting for any refresh in flight to finish first
    pub async fn run_refresh(&self, trigger: RefreshTrigger) -> RefreshRecord {
        let guard = self.lock.clone().lock_owned().await;
        self.run_with_guard(guard, trigger).await
    }

    /// Run a refresh only if none is in flight
    pub async fn try_run_refresh(&self, trigger: RefreshTrigger) -> AppResult<RefreshRecord> {
        let guard = self
            .try_begin()
            .ok_or_else(|| AppError::operation_in_progress("refresh", "guide"))?;
        Ok(self.run_with_guard(guard, trigger).await)
    }

    pub async fn run_with_guard(&self, guard: RefreshGuard, trigger: RefreshTrigger) -> RefreshRecord {
        let _guard = guard;
        let started_at = Utc::now();
        self.state.begin_attempt(started_at).await;
        self.sink.emit(
            GuideEvent::info(COMPONENT, "Refresh started")
                .with("trigger", trigger)
                .with("sources", self.sources.len()),
        );

        let mut outcomes = Vec::with_capacity(self.sources.len());
        let mut published = Vec::new();
        let result = self.execute(&mut outcomes, &mut published).await;
        let finished_at = Utc::now();

        match result {
            Ok(stats) => {
                let message = format!(
                    "Published {} document(s) from {} source(s)",
                    published.len(),
                    outcomes.iter().filter(|o| o.success).count()
                );
                self.sink.emit(
                    GuideEvent::info(COMPONENT, "Refresh complete")
                        .with("trigger", trigger)
                        .with("documents", published.len())
                        .with("channels", stats.channels)
                        .with("programs", stats.programs)
                        .with("elapsed_ms", (finished_at - started_at).num_milliseconds()),
                );
                let record = RefreshRecord {
                    trigger,
                    started_at,
                    finished_at,
                    success: true,
                    message,
                    sources: outcomes,
                    published,
                    merge: Some(stats),
                };
                self.state.record_success(record.clone()).await;
                record
            }
            Err(e) => {
                self.sink.emit(
                    GuideEvent::error(COMPONENT, "Refresh failed")
                        .with("trigger", trigger)
                        .with("error", &e),
                );
                let record = RefreshRecord {
                    trigger,
                    started_at,
                    finished_at,
                    success: false,
                    message: e.to_string(),
                    sources: outcomes,
                    // documents already replaced before the failure
                    published,
                    merge: None,
                };
                self.state.record_failure(record.clone()).await;
                record
            }
        }
    }

    /// Fetch, merge and publish, pushing each written path into `published` as it lands
    async fn execute(
        &self,
        outcomes: &mut Vec<SourceOutcome>,
        published: &mut Vec<PathBuf>,
    ) -> AppResult<MergeStats> {
        let fragments = self.collect_fragments(outcomes).await?;
        if fragments.is_empty() {
            return Err(AppError::no_data("no source produced guide data"));
        }

        if self.merge.merge_sources {
            let fragments: Vec<GuideFragment> = fragments.into_iter().map(|(_, f)| f).collect();
            let merged = merge(&fragments, self.merge.collision_policy);
            let path = self.output.merged_path();
            let document = publish_document(&path, generate_xmltv(&merged)).await?;
            self.emit_published(&document, &merged.stats());
            published.push(document);
            return Ok(merged.stats());
        }

        let mut totals = MergeStats::default();
        for (name, fragment) in fragments {
            let merged = merge(std::slice::from_ref(&fragment), self.merge.collision_policy);
            let path = self.output.source_path(&name);
            let document = publish_document(&path, generate_xmltv(&merged)).await?;
            let stats = merged.stats();
            self.emit_published(&document, &stats);

            totals.fragments += stats.fragments;
            totals.channels += stats.channels;
            totals.programs += stats.programs;
            totals.collisions += stats.collisions;
            published.push(document);
        }
        Ok(totals)
    }

    /// Fetch sources in order. A required failure aborts, optional failures are skipped.
    async fn collect_fragments(
        &self,
        outcomes: &mut Vec<SourceOutcome>,
    ) -> AppResult<Vec<(String, GuideFragment)>> {
        let mut fragments = Vec::with_capacity(self.sources.len());

        for configured in &self.sources {
            let name = configured.name().to_string();
            match self.fetcher.fetch(configured.source.as_ref(), &self.options).await {
                Ok(fragment) => {
                    outcomes.push(SourceOutcome {
                        name: name.clone(),
                        required: configured.required,
                        success: true,
                        channels: fragment.channel_count(),
                        programs: fragment.program_count(),
                        message: None,
                    });
                    fragments.push((name, fragment));
                }
                Err(e) => {
                    outcomes.push(SourceOutcome {
                        name: name.clone(),
                        required: configured.required,
                        success: false,
                        channels: 0,
                        programs: 0,
                        message: Some(e.to_string()),
                    });

                    if configured.required {
                        self.sink.emit(
                            GuideEvent::error(COMPONENT, "Required source failed")
                                .with("source", &name)
                                .with("category", e.category().as_str())
                                .with("error", &e),
                        );
                        return Err(AppError::fetch(name, e));
                    }

                    self.sink.emit(
                        GuideEvent::warn(COMPONENT, "Skipping optional source")
                            .with("source", &name)
                            .with("category", e.category().as_str())
                            .with("error", &e),
                    );
                }
            }
        }

        Ok(fragments)
    }

    fn emit_published(&self, path: &std::path::Path, stats: &MergeStats) {
        self.sink.emit(
            GuideEvent::info(COMPONENT, "Published guide")
                .with("path", path.display())
                .with("channels", stats.channels)
                .with("programs", stats.programs)
                .with("collisions", stats.collisions),
        );
    }
}
