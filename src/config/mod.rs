//! Application configuration loaded from a TOML file

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use crate::pipeline::merge::CollisionPolicy;
use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_output_filename")]
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Automatic refresh on/off
    #[serde(default = "default_auto_refresh")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval", with = "duration")]
    pub interval: Duration,
    #[serde(default = "default_tick", with = "duration")]
    pub tick: Duration,
    /// Minimum spacing between attempts after a failed refresh
    #[serde(default = "default_failure_backoff", with = "duration")]
    pub failure_backoff: Duration,
    /// Upper bound on waiting for the scheduler task during stop
    #[serde(default = "default_stop_timeout", with = "duration")]
    pub stop_timeout: Duration,
    #[serde(default = "default_refresh_on_startup")]
    pub refresh_on_startup: bool,
    /// Where the last successful refresh time is persisted
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timespan_hours")]
    pub timespan_hours: u32,
    #[serde(default = "default_chunk_hours")]
    pub chunk_hours: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_inter_chunk_delay", with = "duration")]
    pub inter_chunk_delay: Duration,
    #[serde(default = "default_retry_base_delay", with = "duration")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_retry_max_delay", with = "duration")]
    pub retry_max_delay: Duration,
    #[serde(default = "default_retry_max_jitter", with = "duration")]
    pub retry_max_jitter: Duration,
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    /// Fixed User-Agent; a browser agent is rotated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Merge all sources into one document instead of one document per source
    #[serde(default = "default_merge_sources")]
    pub merge_sources: bool,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

/// One configured guide source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Zap2it(Zap2itSourceConfig),
    Xmltv(XmltvSourceConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zap2itSourceConfig {
    #[serde(default = "default_zap2it_name")]
    pub name: String,
    /// A failing required source aborts the refresh
    #[serde(default = "default_true")]
    pub required: bool,
    pub lineup_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub prefer_affiliate_names: bool,
    /// Stable user id sent upstream; random per process when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default = "default_zap2it_grid_url")]
    pub grid_url: String,
    #[serde(default = "default_zap2it_landing_url")]
    pub landing_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XmltvSourceConfig {
    #[serde(default = "default_xmltv_name")]
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// http(s) URL or local file path
    pub location: String,
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Zap2it(c) => &c.name,
            SourceConfig::Xmltv(c) => &c.name,
        }
    }

    pub fn required(&self) -> bool {
        match self {
            SourceConfig::Zap2it(c) => c.required,
            SourceConfig::Xmltv(c) => c.required,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Zap2it(_) => "zap2it",
            SourceConfig::Xmltv(_) => "xmltv",
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_web_enabled() -> bool {
    DEFAULT_WEB_ENABLED
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_output_directory() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIRECTORY)
}
fn default_output_filename() -> String {
    DEFAULT_OUTPUT_FILENAME.to_string()
}
fn default_auto_refresh() -> bool {
    DEFAULT_AUTO_REFRESH
}
fn default_refresh_interval() -> Duration {
    Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)
}
fn default_tick() -> Duration {
    Duration::from_secs(DEFAULT_TICK_SECS)
}
fn default_failure_backoff() -> Duration {
    Duration::from_secs(DEFAULT_FAILURE_BACKOFF_SECS)
}
fn default_stop_timeout() -> Duration {
    Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS)
}
fn default_refresh_on_startup() -> bool {
    DEFAULT_REFRESH_ON_STARTUP
}
fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}
fn default_timespan_hours() -> u32 {
    DEFAULT_TIMESPAN_HOURS
}
fn default_chunk_hours() -> u32 {
    DEFAULT_CHUNK_HOURS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_inter_chunk_delay() -> Duration {
    Duration::from_secs(DEFAULT_INTER_CHUNK_DELAY_SECS)
}
fn default_retry_base_delay() -> Duration {
    Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS)
}
fn default_retry_max_delay() -> Duration {
    Duration::from_secs(DEFAULT_RETRY_MAX_DELAY_SECS)
}
fn default_retry_max_jitter() -> Duration {
    Duration::from_millis(DEFAULT_RETRY_MAX_JITTER_MS)
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
}
fn default_merge_sources() -> bool {
    DEFAULT_MERGE_SOURCES
}
fn default_zap2it_name() -> String {
    DEFAULT_ZAP2IT_SOURCE_NAME.to_string()
}
fn default_zap2it_grid_url() -> String {
    DEFAULT_ZAP2IT_GRID_URL.to_string()
}
fn default_zap2it_landing_url() -> String {
    DEFAULT_ZAP2IT_LANDING_URL.to_string()
}
fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}
fn default_xmltv_name() -> String {
    DEFAULT_XMLTV_SOURCE_NAME.to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            filename: default_output_filename(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_auto_refresh(),
            interval: default_refresh_interval(),
            tick: default_tick(),
            failure_backoff: default_failure_backoff(),
            stop_timeout: default_stop_timeout(),
            refresh_on_startup: default_refresh_on_startup(),
            state_file: default_state_file(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timespan_hours: default_timespan_hours(),
            chunk_hours: default_chunk_hours(),
            max_retries: default_max_retries(),
            inter_chunk_delay: default_inter_chunk_delay(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            retry_max_jitter: default_retry_max_jitter(),
            request_timeout: default_request_timeout(),
            user_agent: None,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            merge_sources: default_merge_sources(),
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl OutputConfig {
    /// Path of the merged document
    pub fn merged_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// Path of a per-source document when sources are not merged
    pub fn source_path(&self, source_name: &str) -> PathBuf {
        self.directory.join(format!("{source_name}.xml"))
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let config_file = config_file.as_ref();
        if config_file.exists() {
            let contents = std::fs::read_to_string(config_file)?;
            let config: Config = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = config_file.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.fetch.timespan_hours == 0 {
            return Err(AppError::configuration("fetch.timespan_hours must be > 0"));
        }
        if self.fetch.chunk_hours == 0 {
            return Err(AppError::configuration("fetch.chunk_hours must be > 0"));
        }
        if self.schedule.interval.is_zero() {
            return Err(AppError::configuration("schedule.interval must be > 0"));
        }
        if self.schedule.tick.is_zero() {
            return Err(AppError::configuration("schedule.tick must be > 0"));
        }
        if self.output.filename.trim().is_empty() {
            return Err(AppError::configuration("output.filename must not be empty"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let name = source.name().trim();
            if name.is_empty() {
                return Err(AppError::configuration(format!(
                    "{} source has an empty name",
                    source.kind()
                )));
            }
            if name.contains(['/', '\\']) {
                return Err(AppError::configuration(format!(
                    "source name '{name}' must not contain path separators"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(AppError::configuration(format!(
                    "duplicate source name '{name}'"
                )));
            }
        }
        Ok(())
    }
}
