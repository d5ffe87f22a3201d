//! Multi-source guide merge
//!
//! Pure and deterministic: the same fragments in the same order always give
//! the same [`MergedGuide`], and merging a merged guide again changes nothing.
//!
//! - The first fragment that declares a channel id supplies its record.
//! - Channels are ordered by case-insensitive preferred name, then id.
//! - Programs for a channel are concatenated in fragment order and stably
//!   sorted by start time.
//! - Programs sharing an exact `(channel, start)` collide; the collision
//!   policy decides which one survives and every drop is counted.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{Channel, GuideFragment, MergeStats, MergedGuide, ProgramEntry};

/// Which program survives when two share a channel and start time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Earliest fragment wins
    #[default]
    FirstWins,
    /// Latest fragment wins
    LastWins,
}

/// Merge with the default first-wins collision policy
pub fn merge_fragments(fragments: &[GuideFragment]) -> MergedGuide {
    merge(fragments, CollisionPolicy::FirstWins)
}

pub fn merge(fragments: &[GuideFragment], policy: CollisionPolicy) -> MergedGuide {
    let mut channels: Vec<Channel> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut programs: HashMap<String, Vec<ProgramEntry>> = HashMap::new();

    for fragment in fragments {
        for channel in fragment.channels() {
            if seen.insert(channel.id.as_str()) {
                channels.push(channel.clone());
            }
        }
    }

    for fragment in fragments {
        for channel in fragment.channels() {
            let list = fragment.programs_for(&channel.id);
            if !list.is_empty() {
                programs
                    .entry(channel.id.clone())
                    .or_default()
                    .extend(list.iter().cloned());
            }
        }
    }

    channels.sort_by(|a, b| {
        a.preferred_name()
            .to_lowercase()
            .cmp(&b.preferred_name().to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut collisions = 0;
    for list in programs.values_mut() {
        list.sort_by_key(|p| p.start);
        collisions += dedupe_sorted(list, policy);
    }

    let stats = MergeStats {
        fragments: fragments.len(),
        channels: channels.len(),
        programs: programs.values().map(Vec::len).sum(),
        collisions,
    };

    MergedGuide {
        channels,
        programs,
        stats,
    }
}

/// Collapse runs of equal start times in a start-sorted list, returning how many were dropped
fn dedupe_sorted(list: &mut Vec<ProgramEntry>, policy: CollisionPolicy) -> usize {
    let before = list.len();
    match policy {
        CollisionPolicy::FirstWins => list.dedup_by(|later, earlier| later.start == earlier.start),
        CollisionPolicy::LastWins => {
            list.reverse();
            list.dedup_by(|earlier, later| earlier.start == later.start);
            list.reverse();
        }
    }
    before - list.len()
}
