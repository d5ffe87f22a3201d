use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::models::RefreshRecord;
use crate::pipeline::publish::publish_document;

/// Cached refresh bookkeeping read by the scheduler and the status endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshState {
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_attempt_failed: bool,
    pub refreshing: bool,
    pub last_record: Option<RefreshRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    last_refresh: Option<DateTime<Utc>>,
}

/// JSON file holding the last successful refresh time
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state yields `None`
    pub async fn load(&self) -> Option<DateTime<Utc>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No refresh state at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read refresh state {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<PersistedState>(&content) {
            Ok(state) => state.last_refresh,
            Err(e) => {
                warn!("Ignoring corrupt refresh state {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub async fn save(&self, last_refresh: DateTime<Utc>) -> AppResult<()> {
        let content = serde_json::to_string_pretty(&PersistedState {
            last_refresh: Some(last_refresh),
        })?;
        publish_document(&self.path, content).await?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RefreshStateManager {
    state: Arc<RwLock<RefreshState>>,
    store: Option<StateStore>,
}

impl RefreshStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: StateStore) -> Self {
        Self {
            state: Arc::new(RwLock::new(RefreshState::default())),
            store: Some(store),
        }
    }

    /// Build a manager seeded from the persisted state file
    pub async fn load(store: StateStore) -> Self {
        let last_refresh = store.load().await;
        if let Some(ts) = last_refresh {
            info!("Restored last successful refresh: {}", ts.to_rfc3339());
        }
        let manager = Self::with_store(store);
        manager.state.write().await.last_refresh = last_refresh;
        manager
    }

    pub async fn snapshot(&self) -> RefreshState {
        self.state.read().await.clone()
    }

    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refresh
    }

    pub async fn is_refreshing(&self) -> bool {
        self.state.read().await.refreshing
    }

    pub async fn last_record(&self) -> Option<RefreshRecord> {
        self.state.read().await.last_record.clone()
    }

    pub async fn begin_attempt(&self, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.refreshing = true;
        state.last_attempt = Some(now);
    }

    /// Record a successful refresh; callers invoke this only after publishing
    pub async fn record_success(&self, record: RefreshRecord) {
        let finished = record.finished_at;
        {
            let mut state = self.state.write().await;
            state.last_refresh = Some(finished);
            state.last_attempt_failed = false;
            state.refreshing = false;
            state.last_record = Some(record);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.save(finished).await {
                warn!("Failed to persist refresh state: {}", e);
            }
        }
    }

    pub async fn record_failure(&self, record: RefreshRecord) {
        let mut state = self.state.write().await;
        state.last_attempt_failed = true;
        state.refreshing = false;
        state.last_record = Some(record);
    }

    #[cfg(test)]
    pub(crate) async fn set_last_refresh(&self, value: Option<DateTime<Utc>>) {
        self.state.write().await.last_refresh = value;
    }
}
