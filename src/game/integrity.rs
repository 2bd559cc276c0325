//! Timeline integrity checks
//!
//! A replay pass must never drop history that sits before a character's
//! next player-chosen action-set start. These helpers find such gaps and
//! restore them from a baseline copy of the timeline.

use crate::core::character::PublicCharacter;
use crate::core::types::UserId;
use crate::game::interactions::{CustomInteraction, InteractionKind};
use crate::game::timeline::{entry_for, sort_beat_entries, Beat, BeatEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    /// No entry at all
    Missing,
    /// Entry reverted to `E`/`F`
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBreak {
    #[serde(rename = "type")]
    pub issue: String,
    pub user_id: UserId,
    pub username: String,
    pub beat_index: usize,
    pub protected_start_index: usize,
    pub break_kind: BreakKind,
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRepair {
    pub user_id: UserId,
    pub username: String,
    pub beat_index: usize,
    pub restored_action: String,
    pub replaced_action: Option<String>,
}

const OPEN_BEFORE_PROTECTED_START: &str = "open-before-protected-start";

fn has_committed_rewind_return(interactions: &[CustomInteraction], user_id: &UserId, index: usize) -> bool {
    interactions.iter().any(|interaction| {
        interaction.kind == InteractionKind::RewindReturn
            && interaction.is_resolved()
            && interaction.returns_to_anchor()
            && &interaction.actor_user_id == user_id
            && interaction.beat_index == index
    })
}

/// First beat at or after `start` that a replay may not overwrite
fn earliest_protected_start(
    beats: &[Beat],
    character: &PublicCharacter,
    interactions: &[CustomInteraction],
    start: usize,
) -> Option<usize> {
    (start..beats.len()).find(|&index| {
        entry_for(&beats[index], character).is_some_and(BeatEntry::is_protected_start)
            || has_committed_rewind_return(interactions, &character.user_id, index)
    })
}

fn scan_start(resolved_index: Option<usize>) -> usize {
    resolved_index.map_or(0, |index| index + 1)
}

fn trimmed_action(entry: &BeatEntry) -> Option<String> {
    let action = entry.action.trim();
    if action.is_empty() {
        None
    } else {
        Some(action.to_string())
    }
}

/// Open or missing entries that sit before a protected start
///
/// With a baseline, only beats where the baseline held a committed entry
/// count as breaks.
pub fn find_timeline_breaks(
    beats: &[Beat],
    baseline: Option<&[Beat]>,
    characters: &[PublicCharacter],
    interactions: &[CustomInteraction],
    resolved_index: Option<usize>,
) -> Vec<TimelineBreak> {
    let start = scan_start(resolved_index);
    let mut issues = Vec::new();

    for character in characters {
        let Some(protected_start) = earliest_protected_start(beats, character, interactions, start) else {
            continue;
        };
        for index in start..protected_start {
            if let Some(baseline) = baseline {
                let committed = baseline
                    .get(index)
                    .and_then(|beat| entry_for(beat, character))
                    .is_some_and(|entry| !entry.is_open());
                if !committed {
                    continue;
                }
            }
            let (break_kind, action) = match entry_for(&beats[index], character) {
                None => (BreakKind::Missing, None),
                Some(entry) if entry.is_open() => (BreakKind::Open, trimmed_action(entry)),
                Some(_) => continue,
            };
            issues.push(TimelineBreak {
                issue: OPEN_BEFORE_PROTECTED_START.to_string(),
                user_id: character.user_id.clone(),
                username: character.username.clone(),
                beat_index: index,
                protected_start_index: protected_start,
                break_kind,
                action,
            });
        }
    }

    issues
}

/// Copy committed baseline entries back over breaks
pub fn repair_timeline_breaks_from_baseline(
    beats: &mut Vec<Beat>,
    baseline: &[Beat],
    characters: &[PublicCharacter],
    interactions: &[CustomInteraction],
    resolved_index: Option<usize>,
) -> Vec<TimelineRepair> {
    let start = scan_start(resolved_index);
    let mut repairs = Vec::new();

    for character in characters {
        let Some(protected_start) = earliest_protected_start(beats, character, interactions, start) else {
            continue;
        };
        for index in start..protected_start {
            let Some(restored) = baseline.get(index).and_then(|beat| entry_for(beat, character)) else {
                continue;
            };
            if restored.is_open() {
                continue;
            }
            if beats.len() <= index {
                beats.resize_with(index + 1, Vec::new);
            }
            let beat = &mut beats[index];
            let current = entry_for(beat, character);
            if current.is_some_and(|entry| !entry.is_open()) {
                continue;
            }
            let replaced_action = current.and_then(trimmed_action);

            beat.retain(|entry| !entry.is_for(character));
            beat.push(restored.clone());
            if beat.len() > 1 {
                sort_beat_entries(beat, characters);
            }

            repairs.push(TimelineRepair {
                user_id: character.user_id.clone(),
                username: character.username.clone(),
                beat_index: index,
                restored_action: restored.action.clone(),
                replaced_action,
            });
        }
    }

    repairs
}
