//! Zap2it / Gracenote grid source
//!
//! Talks to the public `tvlistings.gracenote.com` grid API. Each request
//! covers one window (`time` = window start in epoch seconds, `timespan` =
//! window hours) and returns a JSON document with `channels[].events[]`.
//! The payload is decoded into typed structs and normalized into a
//! [`GuideFragment`].
//!
//! Lineup ids drive the query:
//!
//! - OTA / local broadcast lineups (`OTA` or `LOCALBROADCAST` in the id) are
//!   requested as `<COUNTRY>-lineupId-DEFAULT` with headend `lineupId` and
//!   need a postal code.
//! - Streaming lineups (`XXX-<SERVICE>-...` for a known service) need a
//!   postal code and omit the `isOverride`/`pref` parameters.
//! - Everything else is a cable/satellite lineup whose headend is the second
//!   id segment and whose device is the trailing `-X` letter.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

use crate::config::{FetchConfig, Zap2itSourceConfig};
use crate::errors::{AppError, AppResult, FetchError, FetchResult};
use crate::models::{Channel, EpisodeNumber, GuideFragment, ProgramEntry, Rating};
use crate::sources::traits::{FetchWindow, GuideSource};
use crate::utils::time::{parse_upstream_time, xmltv_ns_from_date};

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edg/127.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Safari/605.1.15",
];

const STREAMING_SERVICES: [&str; 8] = [
    "HULUTV",
    "YTTV",
    "FUBOTV",
    "SLING",
    "DIRECTVSTR",
    "VIDGO",
    "FRNDLYTV",
    "PHILO",
];

const ASSET_BASE_URL: &str = "https://zap2it.tmsimg.com/assets/";
const OVERVIEW_URL: &str = "https://tvlistings.gracenote.com//overview.html";

fn lineup_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{3}-([^-]+)-").expect("valid lineup prefix regex"))
}

fn device_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-([A-Z])$").expect("valid device suffix regex"))
}

/// OTA / local broadcast lineup
pub fn is_ota(lineup_id: &str) -> bool {
    let upper = lineup_id.to_uppercase();
    upper.contains("OTA") || upper.contains("LOCALBROADCAST")
}

/// Lineup of a known streaming service
pub fn is_streaming(lineup_id: &str) -> bool {
    let upper = lineup_id.to_uppercase();
    lineup_prefix_regex()
        .captures(&upper)
        .and_then(|caps| caps.get(1))
        .is_some_and(|m| STREAMING_SERVICES.contains(&m.as_str()))
}

/// Whether the upstream needs a postal code for this lineup
pub fn needs_postal_code(lineup_id: &str) -> bool {
    is_ota(lineup_id) || is_streaming(lineup_id)
}

pub fn headend_for(lineup_id: &str) -> String {
    if is_ota(lineup_id) {
        return "lineupId".to_string();
    }
    lineup_prefix_regex()
        .captures(lineup_id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "lineup".to_string())
}

pub fn device_for(lineup_id: &str) -> String {
    let upper = lineup_id.trim().to_uppercase();
    if is_ota(&upper) || is_streaming(&upper) || upper.ends_with("-DEFAULT") {
        return "-".to_string();
    }
    device_suffix_regex()
        .captures(&upper)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Two-letter country codes the upstream expects in three-letter form
pub fn country_code3(country: &str) -> String {
    let upper = country.trim().to_uppercase();
    match upper.as_str() {
        "US" => "USA".to_string(),
        "CA" => "CAN".to_string(),
        _ => upper,
    }
}

/// Make artwork references absolute: drop the query, fix scheme-relative and
/// bare asset ids, default to `.jpg` when no extension is present.
pub fn ensure_asset_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let mut url = match raw.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => raw.to_string(),
    };
    if url.starts_with("//") {
        url = format!("https:{url}");
    }
    if !url.starts_with("http") {
        url = format!("{ASSET_BASE_URL}{}", url.trim_start_matches('/'));
    }
    let last_segment = url.rsplit('/').next().unwrap_or_default();
    if !last_segment.contains('.') {
        url.push_str(".jpg");
    }
    url
}

pub struct Zap2itSource {
    config: Zap2itSourceConfig,
    chunk_hours: u32,
    user_agent: Option<String>,
    user_id: String,
    client: reqwest::Client,
}

impl Zap2itSource {
    pub fn new(config: Zap2itSourceConfig, fetch: &FetchConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(fetch.request_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;

        let user_id = config
            .user_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{:08x}", rand::random::<u32>()));

        Ok(Self {
            config,
            chunk_hours: fetch.chunk_hours,
            user_agent: fetch.user_agent.clone().filter(|ua| !ua.trim().is_empty()),
            user_id,
            client,
        })
    }

    fn pick_user_agent(&self) -> String {
        match &self.user_agent {
            Some(ua) => ua.clone(),
            None => {
                let index = rand::random_range(0..USER_AGENTS.len());
                USER_AGENTS[index].to_string()
            }
        }
    }

    /// Lineup id and headend actually sent upstream
    fn api_lineup(&self) -> (String, String) {
        let lineup_id = self.config.lineup_id.trim();
        if is_ota(lineup_id) {
            (
                format!("{}-lineupId-DEFAULT", country_code3(&self.config.country)),
                "lineupId".to_string(),
            )
        } else {
            (lineup_id.to_string(), headend_for(lineup_id))
        }
    }

    pub fn grid_url(&self, window: &FetchWindow) -> FetchResult<Url> {
        let (api_lineup, headend) = self.api_lineup();
        let streaming = is_streaming(&api_lineup);
        let postal = self
            .config
            .postal_code
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("-");

        let mut params: Vec<(&str, String)> = vec![
            ("lineupId", api_lineup.clone()),
            ("timespan", window.hours.to_string()),
            ("headendId", headend),
            ("country", country_code3(&self.config.country)),
            ("device", device_for(&api_lineup)),
        ];
        if !streaming {
            params.push(("isOverride", "true".to_string()));
        }
        params.push(("postalCode", postal.to_string()));
        params.push(("time", window.start.timestamp().to_string()));
        if !streaming {
            params.push(("pref", "16,128".to_string()));
        }
        params.push(("userId", self.user_id.clone()));
        params.push(("aid", "chi".to_string()));
        params.push(("languagecode", "en-us".to_string()));

        Url::parse_with_params(&self.config.grid_url, &params)
            .map_err(|e| FetchError::configuration("grid_url", e.to_string()))
    }

    fn origin(&self) -> String {
        Url::parse(&self.config.landing_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| self.config.landing_url.trim_end_matches('/').to_string())
    }
}

#[async_trait]
impl GuideSource for Zap2itSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn validate(&self) -> FetchResult<()> {
        let lineup_id = self.config.lineup_id.trim();
        if lineup_id.is_empty() {
            return Err(FetchError::configuration("lineup_id", "Lineup ID is required"));
        }
        let has_postal = self
            .config
            .postal_code
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        if needs_postal_code(lineup_id) && !has_postal {
            let lineup_type = if is_ota(lineup_id) {
                "OTA/LocalBroadcast"
            } else {
                "streaming service"
            };
            return Err(FetchError::configuration(
                "postal_code",
                format!("Postal code required for {lineup_type} lineups"),
            ));
        }
        Url::parse(&self.config.grid_url)
            .map_err(|e| FetchError::configuration("grid_url", e.to_string()))?;
        Ok(())
    }

    fn chunk_hours(&self) -> Option<u32> {
        Some(self.chunk_hours)
    }

    async fn prepare(&self) -> FetchResult<()> {
        // Session cookies only; the landing page may legitimately fail.
        let result = self
            .client
            .get(&self.config.landing_url)
            .header(USER_AGENT, self.pick_user_agent())
            .send()
            .await;
        if let Err(e) = result {
            debug!("Session priming for '{}' failed: {}", self.config.name, e);
        }
        Ok(())
    }

    async fn fetch_window(&self, window: &FetchWindow) -> FetchResult<GuideFragment> {
        let url = self.grid_url(window)?;
        debug!("GET {} window {}", self.config.name, window);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(REFERER, &self.config.landing_url)
            .header(ORIGIN, self.origin())
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| FetchError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::network(e.to_string()))?;
        let grid: GridResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::invalid_response(format!("Invalid JSON response for window {window}: {e}"))
        })?;

        Ok(normalize_grid(grid, self.config.prefer_affiliate_names))
    }
}

/// JSON scalar that may arrive as a string, number or boolean
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn as_text(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0,
            Scalar::Text(s) => {
                let s = s.trim();
                !s.is_empty() && !s.eq_ignore_ascii_case("false") && s != "0"
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextOrList {
    One(String),
    Many(Vec<String>),
}

impl TextOrList {
    fn first(&self) -> Option<&str> {
        let value = match self {
            TextOrList::One(s) => Some(s.as_str()),
            TextOrList::Many(v) => v.first().map(String::as_str),
        };
        value.map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Genre {
    Name(String),
    Object { name: Option<String> },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GridResponse {
    pub channels: Option<Vec<GridChannel>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridChannel {
    pub station_id: Option<Scalar>,
    pub channel_id: Option<Scalar>,
    pub call_sign: Option<String>,
    pub name: Option<String>,
    pub channel_no: Option<Scalar>,
    pub channel: Option<Scalar>,
    pub affiliate_name: Option<String>,
    pub thumbnail: Option<String>,
    pub events: Option<Vec<GridEvent>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridEvent {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration: Option<Scalar>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub title: Option<TextOrList>,
    pub tms_id: Option<String>,
    pub filter: Option<Vec<String>>,
    pub flag: Option<Vec<String>>,
    pub flags: Option<Vec<String>>,
    pub ratings: Option<Vec<GridRating>>,
    pub program: Option<GridProgram>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridProgram {
    pub title: Option<TextOrList>,
    pub episode_title: Option<String>,
    pub short_desc: Option<String>,
    pub long_description: Option<String>,
    pub short_description: Option<String>,
    pub release_year: Option<Scalar>,
    pub genres: Option<Vec<Genre>>,
    pub duration: Option<Scalar>,
    pub preferred_image: Option<PreferredImage>,
    pub image: Option<String>,
    pub tms_id: Option<String>,
    pub series_id: Option<String>,
    pub root_id: Option<Scalar>,
    #[serde(alias = "seasonNumber")]
    pub season: Option<Scalar>,
    #[serde(alias = "episodeNumber")]
    pub episode: Option<Scalar>,
    pub entity_type: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub live: Option<Scalar>,
    pub new: Option<Scalar>,
    pub original_air_date: Option<String>,
    pub air_date: Option<String>,
    pub ratings: Option<Vec<GridRating>>,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreferredImage {
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GridRating {
    pub code: Option<String>,
    pub rating: Option<String>,
    pub system: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First character upper-case, the rest lower-case
fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Convert one grid response into a fragment
pub fn normalize_grid(grid: GridResponse, prefer_affiliate_names: bool) -> GuideFragment {
    let mut fragment = GuideFragment::new();

    for raw in grid.channels.unwrap_or_default() {
        let Some(channel) = normalize_channel(&raw, prefer_affiliate_names) else {
            continue;
        };
        let channel_id = channel.id.clone();
        fragment.insert_channel(channel);

        for event in raw.events.unwrap_or_default() {
            if let Some(program) = normalize_event(&channel_id, &event) {
                fragment.push_program(program);
            }
        }
    }

    fragment
}

fn normalize_channel(raw: &GridChannel, prefer_affiliate_names: bool) -> Option<Channel> {
    let id = raw
        .station_id
        .as_ref()
        .or(raw.channel_id.as_ref())
        .map(Scalar::as_text)
        .filter(|id| !id.is_empty())?;

    let call_sign = non_empty(raw.call_sign.as_deref()).or_else(|| non_empty(raw.name.as_deref()));
    let affiliate = non_empty(raw.affiliate_name.as_deref());
    let number = raw
        .channel_no
        .as_ref()
        .or(raw.channel.as_ref())
        .map(Scalar::as_text)
        .filter(|n| !n.is_empty());

    let mut channel = Channel::new(id);
    if prefer_affiliate_names {
        if let Some(affiliate) = &affiliate {
            channel = channel.with_display_name(affiliate.clone());
        }
        if let Some(call_sign) = &call_sign {
            channel = channel.with_display_name(call_sign.clone());
        }
        if let (Some(affiliate), Some(call_sign)) = (&affiliate, &call_sign) {
            channel = channel.with_display_name(format!("{affiliate} ({call_sign})"));
        }
        if let Some(number) = &number {
            channel = channel.with_display_name(number.clone());
        }
    } else {
        if let Some(call_sign) = &call_sign {
            channel = channel.with_display_name(call_sign.clone());
        }
        if let Some(affiliate) = &affiliate {
            channel = channel.with_display_name(affiliate.clone());
        }
        if let (Some(call_sign), Some(affiliate)) = (&call_sign, &affiliate) {
            channel = channel.with_display_name(format!("{call_sign} {affiliate}"));
        }
    }
    channel.number = number;
    channel.icon = non_empty(raw.thumbnail.as_deref()).map(|t| ensure_asset_url(&t));
    Some(channel)
}

fn normalize_event(channel_id: &str, event: &GridEvent) -> Option<ProgramEntry> {
    let start = event
        .start_time
        .as_deref()
        .or(event.start.as_deref())
        .and_then(parse_upstream_time)?;
    let stop = event
        .end_time
        .as_deref()
        .or(event.end.as_deref())
        .and_then(parse_upstream_time)?;

    let default_program = GridProgram::default();
    let program = event.program.as_ref().unwrap_or(&default_program);

    let title = program
        .title
        .as_ref()
        .and_then(TextOrList::first)
        .or_else(|| event.title.as_ref().and_then(TextOrList::first))?
        .to_string();

    let mut entry = ProgramEntry::new(channel_id, start, stop, title);
    entry.sub_title = non_empty(program.episode_title.as_deref());
    entry.description = non_empty(program.short_desc.as_deref())
        .or_else(|| non_empty(program.long_description.as_deref()))
        .or_else(|| non_empty(program.short_description.as_deref()))
        .or_else(|| non_empty(event.description.as_deref()));
    entry.date = program
        .release_year
        .as_ref()
        .map(Scalar::as_text)
        .filter(|y| !y.is_empty())
        .or_else(|| Some(start.format("%Y%m%d").to_string()));

    let genres = collect_genres(event, program);
    let movie_or_sports = is_movie_or_sports(program, &genres);
    entry.categories = genres.iter().map(|g| capitalize(g)).collect();
    if entry.categories.is_empty() && !movie_or_sports {
        entry.categories.push("Series".to_string());
    }

    entry.length_minutes = event
        .duration
        .as_ref()
        .or(program.duration.as_ref())
        .and_then(Scalar::as_i64);

    entry.icon = program
        .preferred_image
        .as_ref()
        .and_then(|img| non_empty(img.uri.as_deref()))
        .or_else(|| non_empty(program.image.as_deref()))
        .or_else(|| non_empty(event.thumbnail.as_deref()))
        .map(|icon| ensure_asset_url(&icon));

    apply_identifiers(&mut entry, event, program, &start);
    apply_flags(&mut entry, event, program);

    entry.audio = Some("stereo".to_string());
    entry.subtitles = Some("teletext".to_string());
    entry.rating = pick_rating(event, program);

    Some(entry)
}

/// Lower-cased genre names merged with `filter-*` tags, sorted and unique
fn collect_genres(event: &GridEvent, program: &GridProgram) -> BTreeSet<String> {
    let mut genres = BTreeSet::new();
    for genre in program.genres.iter().flatten() {
        let name = match genre {
            Genre::Name(name) => Some(name.as_str()),
            Genre::Object { name } => name.as_deref(),
        };
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            genres.insert(name.to_lowercase());
        }
    }
    for tag in event.filter.iter().flatten() {
        let tag = tag.trim();
        let stripped = if tag.len() >= 7 && tag[..7].eq_ignore_ascii_case("filter-") {
            &tag[7..]
        } else {
            tag
        };
        let stripped = stripped.trim().to_lowercase();
        if !stripped.is_empty() {
            genres.insert(stripped);
        }
    }
    genres
}

fn is_movie_or_sports(program: &GridProgram, genres: &BTreeSet<String>) -> bool {
    let kind = program
        .entity_type
        .as_deref()
        .or(program.kind.as_deref())
        .unwrap_or_default()
        .to_lowercase();
    genres.contains("movie") || genres.contains("sports") || kind == "movie" || kind == "sports"
}

fn trailing_digits(tms_id: &str) -> Option<&str> {
    if tms_id.len() < 4 || !tms_id.is_char_boundary(tms_id.len() - 4) {
        return None;
    }
    let tail = &tms_id[tms_id.len() - 4..];
    tail.bytes().all(|b| b.is_ascii_digit()).then_some(tail)
}

fn apply_identifiers(
    entry: &mut ProgramEntry,
    event: &GridEvent,
    program: &GridProgram,
    start: &DateTime<Utc>,
) {
    let tms_id = non_empty(program.tms_id.as_deref()).or_else(|| non_empty(event.tms_id.as_deref()));
    let series_id = non_empty(program.series_id.as_deref())
        .or_else(|| program.root_id.as_ref().map(Scalar::as_text).filter(|r| !r.is_empty()))
        .or_else(|| {
            tms_id.as_deref().and_then(|tms| {
                (tms.len() > 4 && trailing_digits(tms).is_some()).then(|| tms[..tms.len() - 4].to_string())
            })
        });

    if let (Some(series), Some(tms)) = (&series_id, &tms_id) {
        entry.url = Some(format!("{OVERVIEW_URL}?programSeriesId={series}&tmsId={tms}"));
    }

    if let Some(tms) = &tms_id {
        let value = match (&series_id, trailing_digits(tms)) {
            (Some(series), Some(tail)) => format!("{series}.{tail}"),
            (None, Some(tail)) if tms.len() >= 6 => format!("{}.{tail}", &tms[..tms.len() - 4]),
            _ => tms.clone(),
        };
        entry.episode_numbers.push(EpisodeNumber {
            system: "dd_progid".to_string(),
            value,
        });
    }

    let season = program.season.as_ref().and_then(Scalar::as_i64);
    let episode = program.episode.as_ref().and_then(Scalar::as_i64);
    let xmltv_ns = if season.is_some() || episode.is_some() {
        let season_ns = season.map(|s| s - 1).unwrap_or_else(|| i64::from(start.year()) - 1);
        let episode_ns = episode.map(|e| e - 1).unwrap_or(-1);
        format!("{season_ns}.{episode_ns}.")
    } else {
        xmltv_ns_from_date(start)
    };
    entry.episode_numbers.push(EpisodeNumber {
        system: "xmltv_ns".to_string(),
        value: xmltv_ns,
    });

    if let (Some(season), Some(episode)) = (season, episode) {
        let label = format!("S{season:02}E{episode:02}");
        for system in ["onscreen", "common"] {
            entry.episode_numbers.push(EpisodeNumber {
                system: system.to_string(),
                value: label.clone(),
            });
        }
    }
}

fn apply_flags(entry: &mut ProgramEntry, event: &GridEvent, program: &GridProgram) {
    let flags: Vec<String> = event
        .flag
        .iter()
        .chain(event.flags.iter())
        .flatten()
        .map(|f| f.trim().to_lowercase())
        .collect();

    let live = flags.iter().any(|f| f == "live") || program.live.as_ref().is_some_and(Scalar::is_truthy);
    let new = flags.iter().any(|f| f == "new" || f.contains("premiere"))
        || program.new.as_ref().is_some_and(Scalar::is_truthy);

    entry.flags.live = live;
    entry.flags.new = new;
    if !live && !new {
        entry.flags.previously_shown = true;
        entry.flags.original_air_date = program
            .original_air_date
            .as_deref()
            .or(program.air_date.as_deref())
            .and_then(parse_upstream_time)
            .map(|d| format!("{}000000", d.format("%Y%m%d")));
    }
}

fn pick_rating(event: &GridEvent, program: &GridProgram) -> Option<Rating> {
    let ratings = program
        .ratings
        .as_ref()
        .filter(|r| !r.is_empty())
        .or(event.ratings.as_ref().filter(|r| !r.is_empty()));

    if let Some(first) = ratings.and_then(|r| r.first()) {
        let code = non_empty(first.code.as_deref()).or_else(|| non_empty(first.rating.as_deref()))?;
        return Some(Rating {
            system: non_empty(first.system.as_deref()).unwrap_or_else(|| "MPAA".to_string()),
            value: code,
        });
    }

    non_empty(program.rating.as_deref()).map(|value| Rating {
        system: "MPAA".to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn source(lineup_id: &str, postal: Option<&str>) -> Zap2itSource {
        let config = Zap2itSourceConfig {
            name: "test".to_string(),
            required: true,
            lineup_id: lineup_id.to_string(),
            postal_code: postal.map(str::to_string),
            country: "US".to_string(),
            prefer_affiliate_names: false,
            user_id: Some("deadbeef".to_string()),
            grid_url: "https://tvlistings.gracenote.com/api/grid".to_string(),
            landing_url: "https://tvlistings.gracenote.com/".to_string(),
        };
        Zap2itSource::new(config, &FetchConfig::default()).unwrap()
    }

    fn window() -> FetchWindow {
        FetchWindow {
            index: 0,
            total: 12,
            start: Utc.with_ymd_and_hms(2024, 3, 1, 18, 30, 0).unwrap(),
            hours: 6,
        }
    }

    #[rstest]
    #[case("USA-OTA90210", true, false)]
    #[case("usa-localbroadcast-x", true, false)]
    #[case("USA-YTTV-DEFAULT", false, true)]
    #[case("usa-hulutv-default", false, true)]
    #[case("USA-DITV501-X", false, false)]
    #[case("CAN-0005993-X", false, false)]
    fn test_lineup_predicates(#[case] lineup: &str, #[case] ota: bool, #[case] streaming: bool) {
        assert_eq!(is_ota(lineup), ota);
        assert_eq!(is_streaming(lineup), streaming);
        assert_eq!(needs_postal_code(lineup), ota || streaming);
    }

    #[rstest]
    #[case("USA-DITV501-X", "DITV501", "X")]
    #[case("USA-YTTV-DEFAULT", "YTTV", "-")]
    #[case("USA-OTA90210", "lineupId", "-")]
    #[case("garbage", "lineup", "-")]
    fn test_headend_and_device(#[case] lineup: &str, #[case] headend: &str, #[case] device: &str) {
        assert_eq!(headend_for(lineup), headend);
        assert_eq!(device_for(lineup), device);
    }

    #[rstest]
    #[case("//zap2it.tmsimg.com/assets/s10035_h3_aa.png?w=55", "https://zap2it.tmsimg.com/assets/s10035_h3_aa.png")]
    #[case("p185554_b_v8_ab", "https://zap2it.tmsimg.com/assets/p185554_b_v8_ab.jpg")]
    #[case("/assets/p1.png", "https://zap2it.tmsimg.com/assets/assets/p1.png")]
    #[case("https://cdn.example.com/logo", "https://cdn.example.com/logo.jpg")]
    fn test_ensure_asset_url(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(ensure_asset_url(input), expected);
    }

    #[test]
    fn test_validate_requires_postal_for_ota() {
        let err = source("USA-OTA90210", None).validate().unwrap_err();
        assert!(matches!(err, FetchError::Configuration { ref field, .. } if field == "postal_code"));
        assert!(err.to_string().contains("OTA/LocalBroadcast"));

        let err = source("USA-YTTV-DEFAULT", Some("  ")).validate().unwrap_err();
        assert!(err.to_string().contains("streaming service"));

        assert!(source("USA-OTA90210", Some("90210")).validate().is_ok());
        assert!(source("USA-DITV501-X", None).validate().is_ok());
        assert!(source(" ", None).validate().is_err());
    }

    #[test]
    fn test_grid_url_for_ota_lineup() {
        let url = source("USA-OTA90210", Some("90210")).grid_url(&window()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "lineupId", "timespan", "headendId", "country", "device", "isOverride",
                "postalCode", "time", "pref", "userId", "aid", "languagecode"
            ]
        );
        let get = |key: &str| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("lineupId"), Some("USA-lineupId-DEFAULT"));
        assert_eq!(get("headendId"), Some("lineupId"));
        assert_eq!(get("country"), Some("USA"));
        assert_eq!(get("device"), Some("-"));
        assert_eq!(get("timespan"), Some("6"));
        assert_eq!(get("postalCode"), Some("90210"));
        assert_eq!(get("time"), Some("1709317800"));
        assert_eq!(get("pref"), Some("16,128"));
        assert_eq!(get("userId"), Some("deadbeef"));
    }

    #[test]
    fn test_grid_url_for_streaming_lineup_omits_override() {
        let url = source("USA-YTTV-DEFAULT", Some("10001")).grid_url(&window()).unwrap();
        let query = url.query().unwrap_or_default();
        assert!(query.contains("headendId=YTTV"));
        assert!(!query.contains("isOverride"));
        assert!(!query.contains("pref="));
    }

    const SAMPLE: &str = r#"{
      "channels": [
        {
          "callSign": "WABC",
          "affiliateName": "ABC",
          "channelId": "19629",
          "channelNo": "7.1",
          "stationId": "19629",
          "thumbnail": "//zap2it.tmsimg.com/assets/s10003_h3_aa.png?w=55",
          "events": [
            {
              "startTime": "2024-03-01T18:00:00Z",
              "endTime": "2024-03-01T18:30:00Z",
              "duration": "30",
              "thumbnail": "p1234_b_v8",
              "filter": ["filter-news", "filter-Local"],
              "flag": ["New"],
              "program": {
                "title": "Eyewitness News",
                "episodeTitle": "Evening",
                "shortDesc": "Local news.",
                "tmsId": "EP000191906789",
                "seriesId": "SH00019190",
                "season": "3",
                "episode": 12,
                "genres": [{"name": "News"}]
              }
            },
            {
              "startTime": "2024-03-01T18:30:00Z",
              "endTime": "2024-03-01T20:30:00Z",
              "program": {
                "title": ["The Movie"],
                "releaseYear": 1999,
                "entityType": "Movie",
                "tmsId": "MV000123450000",
                "originalAirDate": "1999-06-01"
              },
              "ratings": [{"code": "PG-13"}]
            },
            {
              "startTime": "garbage",
              "endTime": "2024-03-01T21:00:00Z",
              "program": {"title": "Broken"}
            }
          ]
        },
        {
          "callSign": "KNOID",
          "events": []
        }
      ]
    }"#;

    #[test]
    fn test_normalize_grid() {
        let grid: GridResponse = serde_json::from_str(SAMPLE).unwrap();
        let fragment = normalize_grid(grid, false);

        assert_eq!(fragment.channel_count(), 1);
        let channel = fragment.channel("19629").unwrap();
        assert_eq!(
            channel.display_names,
            vec!["WABC".to_string(), "ABC".to_string(), "WABC ABC".to_string()]
        );
        assert_eq!(channel.number.as_deref(), Some("7.1"));
        assert_eq!(
            channel.icon.as_deref(),
            Some("https://zap2it.tmsimg.com/assets/s10003_h3_aa.png")
        );

        let programs = fragment.programs_for("19629");
        assert_eq!(programs.len(), 2);

        let news = &programs[0];
        assert_eq!(news.title, "Eyewitness News");
        assert_eq!(news.sub_title.as_deref(), Some("Evening"));
        assert_eq!(news.categories, vec!["Local".to_string(), "News".to_string()]);
        assert_eq!(news.length_minutes, Some(30));
        assert_eq!(news.icon.as_deref(), Some("https://zap2it.tmsimg.com/assets/p1234_b_v8.jpg"));
        assert_eq!(news.date.as_deref(), Some("20240301"));
        assert!(news.flags.new);
        assert!(!news.flags.previously_shown);
        assert_eq!(
            news.url.as_deref(),
            Some("https://tvlistings.gracenote.com//overview.html?programSeriesId=SH00019190&tmsId=EP000191906789")
        );
        let systems: Vec<(&str, &str)> = news
            .episode_numbers
            .iter()
            .map(|e| (e.system.as_str(), e.value.as_str()))
            .collect();
        assert_eq!(
            systems,
            vec![
                ("dd_progid", "SH00019190.6789"),
                ("xmltv_ns", "2.11."),
                ("onscreen", "S03E12"),
                ("common", "S03E12"),
            ]
        );
        assert_eq!(news.audio.as_deref(), Some("stereo"));

        let movie = &programs[1];
        assert_eq!(movie.title, "The Movie");
        assert_eq!(movie.date.as_deref(), Some("1999"));
        assert!(movie.categories.is_empty());
        assert!(movie.flags.previously_shown);
        assert_eq!(movie.flags.original_air_date.as_deref(), Some("19990601000000"));
        assert_eq!(movie.episode_numbers[0].value, "MV00012345.0000");
        assert_eq!(movie.episode_numbers[1].value, "2023.0300.");
        let rating = movie.rating.as_ref().unwrap();
        assert_eq!((rating.system.as_str(), rating.value.as_str()), ("MPAA", "PG-13"));
    }

    #[test]
    fn test_prefer_affiliate_names() {
        let grid: GridResponse = serde_json::from_str(SAMPLE).unwrap();
        let fragment = normalize_grid(grid, true);
        let channel = fragment.channel("19629").unwrap();
        assert_eq!(
            channel.display_names,
            vec![
                "ABC".to_string(),
                "WABC".to_string(),
                "ABC (WABC)".to_string(),
                "7.1".to_string()
            ]
        );
    }

    #[test]
    fn test_series_default_category() {
        let event: GridEvent = serde_json::from_str(
            r#"{"startTime":"2024-03-01T18:00:00Z","endTime":"2024-03-01T19:00:00Z","program":{"title":"Show"}}"#,
        )
        .unwrap();
        let entry = normalize_event("1", &event).unwrap();
        assert_eq!(entry.categories, vec!["Series".to_string()]);
        assert!(entry.flags.previously_shown);
        assert_eq!(entry.flags.original_air_date, None);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("sports event"), "Sports event");
        assert_eq!(capitalize("NEWS"), "News");
        assert_eq!(capitalize(""), "");
    }
}
