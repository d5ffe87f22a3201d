/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9195;
pub const DEFAULT_WEB_ENABLED: bool = true;

// Output defaults
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "./data/epgs";
pub const DEFAULT_OUTPUT_FILENAME: &str = "zap2xml.xml";

// Schedule defaults
pub const DEFAULT_AUTO_REFRESH: bool = false;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_TICK_SECS: u64 = 1;
pub const DEFAULT_FAILURE_BACKOFF_SECS: u64 = 15 * 60;
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REFRESH_ON_STARTUP: bool = false;
pub const DEFAULT_STATE_FILE: &str = "./data/state.json";

// Fetch defaults
pub const DEFAULT_TIMESPAN_HOURS: u32 = 72;
pub const DEFAULT_CHUNK_HOURS: u32 = 6;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INTER_CHUNK_DELAY_SECS: u64 = 0;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 30;
pub const DEFAULT_RETRY_MAX_JITTER_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Merge defaults
pub const DEFAULT_MERGE_SOURCES: bool = true;

// Zap2it defaults
pub const DEFAULT_ZAP2IT_SOURCE_NAME: &str = "zap2it";
pub const DEFAULT_ZAP2IT_GRID_URL: &str = "https://tvlistings.gracenote.com/api/grid";
pub const DEFAULT_ZAP2IT_LANDING_URL: &str = "https://tvlistings.gracenote.com/";
pub const DEFAULT_COUNTRY: &str = "USA";

// XMLTV source defaults
pub const DEFAULT_XMLTV_SOURCE_NAME: &str = "xmltv";
