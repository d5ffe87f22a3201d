//! Guide data model shared by sources, the merger and the publisher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A broadcast channel/station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    /// Ordered display names, the first one is preferred
    pub display_names: Vec<String>,
    pub number: Option<String>,
    pub icon: Option<String>,
}

impl Channel {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            display_names: Vec::new(),
            number: None,
            icon: None,
        }
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        if !name.trim().is_empty() && !self.display_names.contains(&name) {
            self.display_names.push(name);
        }
        self
    }

    /// Preferred display name, falling back to the channel id
    pub fn preferred_name(&self) -> &str {
        self.display_names
            .first()
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeNumber {
    pub system: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub system: String,
    pub value: String,
}

/// Broadcast flags attached to a program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramFlags {
    pub live: bool,
    pub new: bool,
    pub previously_shown: bool,
    /// Original air date (`YYYYMMDD...`) for reruns
    pub original_air_date: Option<String>,
}

/// One scheduled airing on one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub channel_id: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub title: String,
    pub sub_title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub categories: Vec<String>,
    pub length_minutes: Option<i64>,
    pub icon: Option<String>,
    pub url: Option<String>,
    pub episode_numbers: Vec<EpisodeNumber>,
    pub flags: ProgramFlags,
    /// Audio description, e.g. `stereo`
    pub audio: Option<String>,
    /// Subtitle type, e.g. `teletext`
    pub subtitles: Option<String>,
    pub rating: Option<Rating>,
}

impl ProgramEntry {
    pub fn new<C: Into<String>, T: Into<String>>(
        channel_id: C,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        title: T,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            start,
            stop,
            title: title.into(),
            sub_title: None,
            description: None,
            date: None,
            categories: Vec::new(),
            length_minutes: None,
            icon: None,
            url: None,
            episode_numbers: Vec::new(),
            flags: ProgramFlags::default(),
            audio: None,
            subtitles: None,
            rating: None,
        }
    }

    pub fn has_valid_times(&self) -> bool {
        self.stop > self.start
    }
}

/// Partial guide produced by one source (or one window of one source)
///
/// Channels keep insertion order and the first record per id wins. Programs
/// are only accepted for channels already present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuideFragment {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
    programs: HashMap<String, Vec<ProgramEntry>>,
}

impl GuideFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a channel unless one with the same id exists. Returns true when inserted.
    pub fn insert_channel(&mut self, channel: Channel) -> bool {
        if channel.id.is_empty() || self.index.contains_key(&channel.id) {
            return false;
        }
        self.index.insert(channel.id.clone(), self.channels.len());
        self.channels.push(channel);
        true
    }

    /// Append a program. Rejected when its channel is unknown or stop <= start.
    pub fn push_program(&mut self, program: ProgramEntry) -> bool {
        if !self.index.contains_key(&program.channel_id) || !program.has_valid_times() {
            return false;
        }
        self.programs
            .entry(program.channel_id.clone())
            .or_default()
            .push(program);
        true
    }

    /// Fold another fragment into this one: first channel wins, programs appended
    pub fn absorb(&mut self, other: GuideFragment) {
        let GuideFragment {
            channels,
            mut programs,
            ..
        } = other;
        for channel in channels {
            let id = channel.id.clone();
            self.insert_channel(channel);
            if let Some(list) = programs.remove(&id) {
                for program in list {
                    self.push_program(program);
                }
            }
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.index.get(id).map(|&i| &self.channels[i])
    }

    pub fn programs_for(&self, channel_id: &str) -> &[ProgramEntry] {
        self.programs
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All programs, grouped by channel in channel insertion order
    pub fn programs(&self) -> impl Iterator<Item = &ProgramEntry> + '_ {
        self.channels
            .iter()
            .flat_map(move |c| self.programs_for(&c.id).iter())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Counters describing one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub fragments: usize,
    pub channels: usize,
    pub programs: usize,
    /// Programs discarded because another entry had the same (channel, start)
    pub collisions: usize,
}

/// Canonical merged guide: sorted channels, time-ordered programs per channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedGuide {
    pub(crate) channels: Vec<Channel>,
    pub(crate) programs: HashMap<String, Vec<ProgramEntry>>,
    pub(crate) stats: MergeStats,
}

impl MergedGuide {
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn programs_for(&self, channel_id: &str) -> &[ProgramEntry] {
        self.programs
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn programs(&self) -> impl Iterator<Item = &ProgramEntry> + '_ {
        self.channels
            .iter()
            .flat_map(move |c| self.programs_for(&c.id).iter())
    }

    pub fn program_count(&self) -> usize {
        self.programs.values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    /// Same channels and programs, ignoring merge counters
    pub fn same_content(&self, other: &MergedGuide) -> bool {
        self.channels == other.channels && self.programs == other.programs
    }
}

impl From<MergedGuide> for GuideFragment {
    fn from(merged: MergedGuide) -> Self {
        let mut fragment = GuideFragment::new();
        let MergedGuide {
            channels,
            mut programs,
            ..
        } = merged;
        for channel in channels {
            let id = channel.id.clone();
            fragment.insert_channel(channel);
            for program in programs.remove(&id).unwrap_or_default() {
                fragment.push_program(program);
            }
        }
        fragment
    }
}

/// What caused a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    Scheduled,
    Manual,
    Startup,
    Cli,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Scheduled => "scheduled",
            RefreshTrigger::Manual => "manual",
            RefreshTrigger::Startup => "startup",
            RefreshTrigger::Cli => "cli",
        }
    }
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one source within a refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub name: String,
    pub required: bool,
    pub success: bool,
    pub channels: usize,
    pub programs: usize,
    pub message: Option<String>,
}

/// Summary of a finished refresh attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub trigger: RefreshTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub message: String,
    pub sources: Vec<SourceOutcome>,
    pub published: Vec<PathBuf>,
    pub merge: Option<MergeStats>,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub enabled: bool,
    #[serde(with = "crate::config::duration_serde::duration")]
    pub interval: Duration,
    pub interval_hours: f64,
    pub refreshing: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub next_refresh: Option<DateTime<Utc>>,
}
